use serde_json::json;

use layersnap::Snapshot;

use crate::util::{or_none, print_json};

/// Инспекция снапшота: метаданные + захваченные слои.
pub fn print(s: &Snapshot, json: bool) {
    if json {
        let layers: Vec<_> = s
            .layers
            .iter()
            .map(|l| {
                json!({
                    "component": l.component,
                    "tracked": l.tracked.display().to_string(),
                    "path": l.path.display().to_string(),
                })
            })
            .collect();
        print_json(&json!({
            "name": s.meta.name,
            "created": s.meta.created,
            "tracked_dirs": s.meta.tracked_dirs,
            "pacman_packages": s.meta.pacman_packages,
            "layers": layers,
        }));
        return;
    }

    println!("Snapshot {}", s.meta.name);
    println!("  created      = {}", s.meta.created);
    println!("  dir          = {}", s.dir.display());
    println!("  tracked_dirs = {}", or_none(&s.meta.tracked_dirs.join(", ")));
    println!("  packages     = {} line(s)", s.meta.pacman_packages.lines().count());
    println!("Layers: {}", s.layers.len());
    for l in &s.layers {
        println!("  - {:10} {} <- {}", l.component, l.tracked.display(), l.path.display());
    }
}
