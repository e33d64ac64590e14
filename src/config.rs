//! Configuration for layersnap.
//!
//! One `SnapConfig` value is built once (from ENV, builder calls or CLI flags)
//! and passed by reference into every component. Nothing reads the
//! environment after that.
//!
//! ENV:
//! - LAYERSNAP_ROOT          storage root (default /var/lib/layersnap)
//! - LAYERSNAP_TRACKED_DIRS  "/etc:/boot/loader" (default /etc)
//! - LAYERSNAP_KEEP          default retention count for cleanup (default 5)
//! - LAYERSNAP_CAPTURE       overlay | copy (default overlay)
//! - LAYERSNAP_PACKAGE_CMD   package listing command (default "pacman -Q", empty disables)

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, SnapError};
use crate::tracked::{parse_tracked_list, TrackedDirectory};

pub const DEFAULT_ROOT: &str = "/var/lib/layersnap";
pub const DEFAULT_KEEP: usize = 5;
pub const DEFAULT_PACKAGE_CMD: &str = "pacman -Q";

/// How captured layers are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Kernel overlayfs union mount (Linux, needs CAP_SYS_ADMIN).
    Overlay,
    /// Plain directory mirror, no mount. Portable fallback.
    Copy,
}

impl FromStr for CaptureMode {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overlay" | "overlayfs" => Ok(CaptureMode::Overlay),
            "copy" => Ok(CaptureMode::Copy),
            other => Err(SnapError::InvalidConfig {
                reason: format!("unknown capture mode '{}' (overlay|copy)", other),
            }),
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::Overlay => f.write_str("overlay"),
            CaptureMode::Copy => f.write_str("copy"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SnapConfig {
    /// Storage root: <root>/{overlay,snapshots,work,LOCK}.
    pub root: PathBuf,

    /// Tracked directories, in capture/rollback order.
    pub tracked_dirs: Vec<TrackedDirectory>,

    /// Default retention count used by cleanup when none is given.
    pub keep: usize,

    pub capture: CaptureMode,

    /// Command whose stdout becomes the package manifest. None disables the probe.
    pub package_cmd: Option<String>,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            // "/etc" is absolute with a basename, construction cannot fail.
            tracked_dirs: parse_tracked_list("/etc").unwrap_or_default(),
            keep: DEFAULT_KEEP,
            capture: CaptureMode::Overlay,
            package_cmd: Some(DEFAULT_PACKAGE_CMD.to_string()),
        }
    }
}

impl SnapConfig {
    /// Defaults overridden by LAYERSNAP_* variables.
    /// Malformed values are errors rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("LAYERSNAP_ROOT") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.root = PathBuf::from(s);
            }
        }

        if let Ok(v) = std::env::var("LAYERSNAP_TRACKED_DIRS") {
            cfg.tracked_dirs = parse_tracked_list(&v)?;
        }

        if let Ok(v) = std::env::var("LAYERSNAP_KEEP") {
            cfg.keep = v.trim().parse::<usize>().map_err(|e| SnapError::InvalidConfig {
                reason: format!("LAYERSNAP_KEEP='{}': {}", v, e),
            })?;
        }

        if let Ok(v) = std::env::var("LAYERSNAP_CAPTURE") {
            cfg.capture = v.parse()?;
        }

        if let Ok(v) = std::env::var("LAYERSNAP_PACKAGE_CMD") {
            let s = v.trim();
            cfg.package_cmd = if s.is_empty() { None } else { Some(s.to_string()) };
        }

        Ok(cfg)
    }

    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_tracked_dirs(mut self, dirs: Vec<TrackedDirectory>) -> Self {
        self.tracked_dirs = dirs;
        self
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_capture(mut self, mode: CaptureMode) -> Self {
        self.capture = mode;
        self
    }

    pub fn with_package_cmd<S: Into<String>>(mut self, cmd: Option<S>) -> Self {
        self.package_cmd = cmd.map(Into::into);
        self
    }

    /// Finish the builder; validates the result.
    pub fn build(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Tracked list must be non-empty with unique basenames; root must be absolute
    /// or at least non-empty.
    pub fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(SnapError::InvalidConfig {
                reason: "storage root is empty".into(),
            });
        }
        if self.tracked_dirs.is_empty() {
            return Err(SnapError::InvalidConfig {
                reason: "no tracked directories configured".into(),
            });
        }
        let mut seen = HashSet::new();
        for t in &self.tracked_dirs {
            if !seen.insert(t.name()) {
                return Err(SnapError::InvalidConfig {
                    reason: format!("duplicate tracked basename '{}'", t.name()),
                });
            }
            if t.path().starts_with(&self.root) || self.root.starts_with(t.path()) {
                return Err(SnapError::InvalidConfig {
                    reason: format!(
                        "tracked directory {} overlaps storage root {}",
                        t,
                        self.root.display()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Look up a tracked directory by basename or full path.
    pub fn find_tracked(&self, component: &str) -> Option<&TrackedDirectory> {
        self.tracked_dirs.iter().find(|t| t.matches(component))
    }
}

impl fmt::Display for SnapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tracked: Vec<String> = self.tracked_dirs.iter().map(|t| t.to_string()).collect();
        write!(
            f,
            "SnapConfig {{ root: {}, tracked_dirs: [{}], keep: {}, capture: {}, package_cmd: {} }}",
            self.root.display(),
            tracked.join(", "),
            self.keep,
            self.capture,
            self.package_cmd.as_deref().unwrap_or("(disabled)"),
        )
    }
}
