//! Tracked directories: absolute paths captured by every snapshot.
//!
//! The short name (basename) is the storage key inside a snapshot, so two
//! tracked directories with the same basename cannot coexist in one config.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedDirectory {
    path: PathBuf,
    name: String,
}

impl TrackedDirectory {
    /// Build from an absolute path. `/` itself has no basename and is rejected.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        if !path.is_absolute() {
            return Err(SnapError::InvalidConfig {
                reason: format!("tracked directory must be absolute: {}", path.display()),
            });
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SnapError::InvalidConfig {
                reason: format!("tracked directory has no basename: {}", path.display()),
            })?;
        Ok(Self { path, name })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename, e.g. "etc" for "/etc".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Matches either the basename ("etc") or the full path ("/etc").
    pub fn matches(&self, component: &str) -> bool {
        let c = component.trim_end_matches('/');
        c == self.name || Path::new(c) == self.path
    }
}

impl fmt::Display for TrackedDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Parse a colon/comma separated list ("/etc:/boot/loader").
pub fn parse_tracked_list(s: &str) -> Result<Vec<TrackedDirectory>> {
    s.split(|c| c == ':' || c == ',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(TrackedDirectory::new)
        .collect()
}
