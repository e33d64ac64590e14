//! Error taxonomy for layersnap.
//!
//! Every core operation returns `Result<T>` with a `SnapError`. The binary wraps
//! these into `anyhow` with command context; the library never retries and
//! never swallows errors, except for the lenient metadata parsing in
//! `SnapshotStore::list`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, SnapError>;

#[derive(Debug, Error)]
pub enum SnapError {
    /// Caller lacks the privilege needed for mounts / ownership changes.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Union mount setup failed for a tracked directory.
    #[error("mount failed for {}: {source}", dir.display())]
    MountFailure {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Referenced snapshot does not exist (or has no readable metadata).
    #[error("snapshot not found: {name}")]
    NotFound { name: String },

    /// Snapshot name already used by another snapshot.
    #[error("snapshot already exists: {name}")]
    AlreadyExists { name: String },

    /// Snapshot name cannot be used as a storage key.
    #[error("invalid snapshot name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// Rollback scope names a directory that is not tracked.
    #[error("invalid component '{component}' (tracked: {})", tracked.join(", "))]
    InvalidComponent {
        component: String,
        tracked: Vec<String>,
    },

    /// Configuration rejected before any operation ran.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Metadata read/write, recursive delete or other plain I/O failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// metadata.json could not be (de)serialized.
    #[error("metadata {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Directory mirror failed partway.
    #[error("sync failed at {}: {source}", path.display())]
    SyncFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Store lock could not be taken.
    #[error("lock {}: {source}", path.display())]
    LockFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Multi-directory operation finished with some targets failing.
    /// Side effects on the targets that succeeded stay in place.
    #[error("{op} partially failed for: {}", failed.join(", "))]
    PartialFailure { op: &'static str, failed: Vec<String> },

    /// Command outside the closed operation set.
    #[error("unrecognized command: {command}")]
    Unrecognized { command: String },
}

impl SnapError {
    /// Shorthand for wrapping an `io::Error` with a context string.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        SnapError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn sync(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SnapError::SyncFailure {
            path: path.into(),
            source,
        }
    }

    /// True for NotFound (used by callers that treat "absent" as a soft case).
    pub fn is_not_found(&self) -> bool {
        matches!(self, SnapError::NotFound { .. })
    }
}
