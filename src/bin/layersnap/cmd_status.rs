use serde_json::json;

use layersnap::StatusReport;

use crate::util::print_json;

/// Print config / snapshot summary, optionally as a single JSON object.
pub fn print(s: &StatusReport, json: bool) {
    let tracked: Vec<String> = s.config.tracked_dirs.iter().map(|t| t.to_string()).collect();
    let mounts: Vec<String> = s.active_mounts.iter().map(|p| p.display().to_string()).collect();

    if json {
        print_json(&json!({
            "root": s.config.root.display().to_string(),
            "tracked_dirs": tracked,
            "keep": s.config.keep,
            "capture": s.config.capture.to_string(),
            "package_cmd": s.config.package_cmd,
            "snapshots": s.snapshots,
            "newest": s.newest.as_ref().map(|n| json!({ "name": n.name, "created": n.created })),
            "active_mounts": mounts,
        }));
        return;
    }

    println!("root         = {}", s.config.root.display());
    println!("tracked_dirs = {}", tracked.join(", "));
    println!("keep         = {}", s.config.keep);
    println!("capture      = {}", s.config.capture);
    println!(
        "package_cmd  = {}",
        s.config.package_cmd.as_deref().unwrap_or("(disabled)")
    );
    println!("snapshots    = {}", s.snapshots);
    match &s.newest {
        Some(n) => println!("newest       = {} ({})", n.name, n.created),
        None => println!("newest       = (none)"),
    }
    if !mounts.is_empty() {
        println!("active mounts (left by an interrupted create):");
        for m in &mounts {
            println!("  - {}", m);
        }
    }
}
