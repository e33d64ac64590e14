//! metadata.json: one write-once record per snapshot.
//!
//! Формат:
//! {
//!   "name": "snapshot_20240114_120000",
//!   "created": "2024-01-14T12:00:00.123456Z",
//!   "tracked_dirs": ["/etc"],
//!   "pacman_packages": "acl 2.3.2-1\n...",
//!   "captured": ["etc"]
//! }
//!
//! `captured` was added later; records without it treat every tracked
//! directory whose layer directory exists as captured.
//!
//! Запись атомарна: tmp + fsync + rename.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::{Result, SnapError};

pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub name: String,
    /// RFC 3339 / ISO-8601, UTC.
    pub created: String,
    pub tracked_dirs: Vec<String>,
    pub pacman_packages: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<Vec<String>>,
}

impl SnapshotMeta {
    pub fn new(name: &str, created: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            created: format_created(created),
            tracked_dirs: Vec::new(),
            pacman_packages: String::new(),
            captured: None,
        }
    }

    /// Parsed `created`, None when the stored string is not RFC 3339.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

pub fn format_created(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn read_meta(path: &Path) -> Result<SnapshotMeta> {
    let bytes = fs::read(path).map_err(|e| SnapError::io(format!("read {}", path.display()), e))?;
    serde_json::from_slice(&bytes).map_err(|source| SnapError::Metadata {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn write_meta(path: &Path, meta: &SnapshotMeta) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(meta).map_err(|source| SnapError::Metadata {
        path: path.to_path_buf(),
        source,
    })?;

    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&tmp)
        .map_err(|e| SnapError::io(format!("open {}", tmp.display()), e))?;
    f.write_all(&data)
        .and_then(|_| f.write_all(b"\n"))
        .map_err(|e| SnapError::io(format!("write {}", tmp.display()), e))?;
    f.sync_all()
        .map_err(|e| SnapError::io(format!("fsync {}", tmp.display()), e))?;
    drop(f);

    fs::rename(&tmp, path).map_err(|e| {
        SnapError::io(format!("rename {} -> {}", tmp.display(), path.display()), e)
    })?;
    Ok(())
}
