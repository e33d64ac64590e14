//! SnapshotStore: durable snapshot records under the storage root.
//!
//! Layout:
//! ```text
//! <root>/overlay/<basename>/<name>/   transient union-mount targets
//! <root>/work/<basename>/<name>/      overlay scratch areas
//! <root>/snapshots/<name>/
//!     <basename>/                     captured layer per tracked directory
//!     metadata.json
//! ```
//!
//! Listing is lenient: a snapshot directory without parseable metadata is
//! skipped silently, so half-written or corrupted snapshots never show up.
//! A snapshot is always listed under its directory name, the same key
//! `resolve` and `delete` take.

pub mod meta;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::fs::{self, ReadDir};
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapError};
use crate::tracked::TrackedDirectory;

pub use meta::{format_created, SnapshotMeta, METADATA_FILE};
use meta::{read_meta, write_meta};

/// Where one tracked directory's content lives inside one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLayer {
    /// Tracked directory path at capture time ("/etc").
    pub tracked: PathBuf,
    /// Basename / storage key ("etc").
    pub component: String,
    /// <root>/snapshots/<name>/<component>
    pub path: PathBuf,
}

/// Resolved snapshot: metadata plus the layers present on disk.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub dir: PathBuf,
    pub layers: Vec<CapturedLayer>,
}

impl Snapshot {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn layer(&self, component: &str) -> Option<&CapturedLayer> {
        self.layers.iter().find(|l| l.component == component)
    }
}

/// Row produced by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub name: String,
    pub created: String,
    pub created_at: Option<DateTime<Utc>>,
    /// mtime of metadata.json, fallback ordering key.
    pub modified: Option<DateTime<Utc>>,
}

/// Reject names that cannot be a single directory component.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("empty")
    } else if name == "." || name == ".." {
        Some("reserved")
    } else if name.contains('/') {
        Some("contains '/'")
    } else if name.contains('\0') {
        Some("contains NUL")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(SnapError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshots_root(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    pub fn snapshot_dir(&self, name: &str) -> PathBuf {
        self.snapshots_root().join(name)
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.snapshot_dir(name).join(METADATA_FILE)
    }

    pub fn layer_dir(&self, name: &str, component: &str) -> PathBuf {
        self.snapshot_dir(name).join(component)
    }

    pub fn overlay_dir(&self, component: &str, name: &str) -> PathBuf {
        self.root.join("overlay").join(component).join(name)
    }

    pub fn work_dir(&self, component: &str, name: &str) -> PathBuf {
        self.root.join("work").join(component).join(name)
    }

    /// Does a snapshot directory with this name exist (valid or not)?
    pub fn exists(&self, name: &str) -> bool {
        self.snapshot_dir(name).exists()
    }

    /// Write (or overwrite) metadata.json for `meta.name`.
    pub fn write(&self, meta: &SnapshotMeta) -> Result<()> {
        validate_name(&meta.name)?;
        let dir = self.snapshot_dir(&meta.name);
        fs::create_dir_all(&dir)
            .map_err(|e| SnapError::io(format!("create {}", dir.display()), e))?;
        let path = self.metadata_path(&meta.name);
        write_meta(&path, meta)?;
        debug!("store: wrote {}", path.display());
        Ok(())
    }

    /// Lazy iterator over valid snapshots. Calling it again restarts the scan.
    pub fn iter(&self) -> Result<SnapshotIter> {
        let dir = self.snapshots_root();
        let inner = match fs::read_dir(&dir) {
            Ok(rd) => Some(rd),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(SnapError::io(format!("read_dir {}", dir.display()), e)),
        };
        Ok(SnapshotIter { inner })
    }

    /// All valid snapshots, oldest first.
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let mut v: Vec<SnapshotSummary> = self.iter()?.collect();
        v.sort_by(|a, b| recency_key(a).cmp(&recency_key(b)).then_with(|| a.name.cmp(&b.name)));
        Ok(v)
    }

    /// Load a single snapshot. Absent directory or metadata → NotFound.
    pub fn resolve(&self, name: &str) -> Result<Snapshot> {
        validate_name(name)?;
        let dir = self.snapshot_dir(name);
        let path = self.metadata_path(name);
        if !dir.is_dir() || !path.is_file() {
            return Err(SnapError::NotFound {
                name: name.to_string(),
            });
        }
        let meta = read_meta(&path)?;
        if meta.name != name {
            warn!(
                "store: metadata name '{}' differs from directory '{}'",
                meta.name, name
            );
        }

        let mut layers = Vec::new();
        for p in &meta.tracked_dirs {
            let tracked = match TrackedDirectory::new(p) {
                Ok(t) => t,
                Err(e) => {
                    warn!("store: {}: skip tracked entry '{}': {}", name, p, e);
                    continue;
                }
            };
            let recorded = match &meta.captured {
                Some(c) => c.iter().any(|c| c == tracked.name()),
                None => true,
            };
            let layer = dir.join(tracked.name());
            if recorded && layer.is_dir() {
                layers.push(CapturedLayer {
                    tracked: tracked.path().to_path_buf(),
                    component: tracked.name().to_string(),
                    path: layer,
                });
            }
        }

        Ok(Snapshot { meta, dir, layers })
    }

    /// Recursively remove the snapshot tree plus its transient mount/work areas.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let dir = self.snapshot_dir(name);
        if !dir.exists() {
            return Err(SnapError::NotFound {
                name: name.to_string(),
            });
        }
        fs::remove_dir_all(&dir)
            .map_err(|e| SnapError::io(format!("remove {}", dir.display()), e))?;

        // Scratch areas are keyed <kind>/<component>/<name>; leftovers are best-effort.
        // Mount targets are only rmdir'ed: a still-mounted target fails with EBUSY
        // instead of having the merged view deleted through it.
        for (kind, recursive) in [("overlay", false), ("work", true)] {
            let base = self.root.join(kind);
            let Ok(components) = fs::read_dir(&base) else {
                continue;
            };
            for c in components.flatten() {
                let p = c.path().join(name);
                if !p.exists() {
                    continue;
                }
                let res = if recursive {
                    fs::remove_dir_all(&p)
                } else {
                    fs::remove_dir(&p)
                };
                if let Err(e) = res {
                    warn!("store: leave {} behind: {}", p.display(), e);
                }
            }
        }
        debug!("store: deleted {}", dir.display());
        Ok(())
    }
}

fn recency_key(s: &SnapshotSummary) -> Option<DateTime<Utc>> {
    s.created_at.or(s.modified)
}

/// Iterator returned by `SnapshotStore::iter`.
pub struct SnapshotIter {
    inner: Option<ReadDir>,
}

impl Iterator for SnapshotIter {
    type Item = SnapshotSummary;

    fn next(&mut self) -> Option<SnapshotSummary> {
        let rd = self.inner.as_mut()?;
        for entry in rd.by_ref() {
            let Ok(entry) = entry else { continue };
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            // The directory name is the key resolve/delete use.
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!("store: skip {} (non UTF-8 name)", dir.display());
                continue;
            };
            if validate_name(&name).is_err() {
                continue;
            }
            let path = dir.join(METADATA_FILE);
            let Ok(meta) = read_meta(&path) else {
                debug!("store: skip {} (no valid metadata)", dir.display());
                continue;
            };
            if meta.name != name {
                warn!(
                    "store: metadata name '{}' differs from directory '{}', listing as '{}'",
                    meta.name, name, name
                );
            }
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            return Some(SnapshotSummary {
                created_at: meta.created_at(),
                name,
                created: meta.created,
                modified,
            });
        }
        None
    }
}
