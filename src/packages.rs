//! Package manifest probe: stdout of the configured listing command
//! (`pacman -Q` by default) stored verbatim in the snapshot metadata.

use log::{debug, warn};
use std::process::{Command, Stdio};

/// Run `cmd` (whitespace separated, no shell) and return its stdout.
/// Any failure degrades to an empty manifest with a warning; a missing
/// package manager must not block a configuration snapshot.
pub fn query_packages(cmd: Option<&str>) -> String {
    let Some(cmd) = cmd else {
        return String::new();
    };
    let mut parts = cmd.split_whitespace();
    let Some(program) = parts.next() else {
        return String::new();
    };

    let out = Command::new(program)
        .args(parts)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match out {
        Ok(o) if o.status.success() => {
            let s = String::from_utf8_lossy(&o.stdout).into_owned();
            debug!("packages: '{}' -> {} line(s)", cmd, s.lines().count());
            s
        }
        Ok(o) => {
            warn!("packages: '{}' exited with {}, manifest left empty", cmd, o.status);
            String::new()
        }
        Err(e) => {
            warn!("packages: cannot run '{}': {}, manifest left empty", cmd, e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_or_blank_is_empty() {
        assert_eq!(query_packages(None), "");
        assert_eq!(query_packages(Some("   ")), "");
    }

    #[test]
    fn missing_program_is_empty() {
        assert_eq!(query_packages(Some("/nonexistent/layersnap-pkg -Q")), "");
    }

    #[test]
    fn captures_stdout() {
        assert_eq!(query_packages(Some("echo acl 2.3.2-1")), "acl 2.3.2-1\n");
    }
}
