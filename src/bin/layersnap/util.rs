use anyhow::Result;
use nix::unistd::geteuid;

use layersnap::SnapError;

fn env_bool(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_ascii_lowercase())
        .map(|s| s == "1" || s == "true" || s == "yes" || s == "on")
        .unwrap_or(false)
}

/// Mounts and ownership changes need root. LAYERSNAP_ALLOW_NONROOT=1 skips the
/// check (copy capture over directories the caller owns).
pub fn require_root() -> Result<()> {
    if geteuid().is_root() || env_bool("LAYERSNAP_ALLOW_NONROOT") {
        return Ok(());
    }
    Err(SnapError::PermissionDenied(
        "this command must be run as root (or set LAYERSNAP_ALLOW_NONROOT=1)".into(),
    )
    .into())
}

pub fn print_json(v: &serde_json::Value) {
    let s = serde_json::to_string_pretty(v).unwrap_or_else(|_| "{}".to_string());
    println!("{s}");
}

pub fn or_none(s: &str) -> &str {
    if s.is_empty() {
        "(none)"
    } else {
        s
    }
}
