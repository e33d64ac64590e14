//! RollbackEngine: mirror captured layers back onto live tracked directories.
//!
//! Destructive and one-way: live-only files are deleted, differing files are
//! overwritten, attributes follow the layer. Directories are processed in
//! snapshot order, independently; a failure on one does not undo the ones
//! already mirrored. Every check (snapshot exists, component is tracked, layer
//! exists) runs before the first byte is written.

use log::{error, info, warn};
use std::fmt;

use crate::config::SnapConfig;
use crate::error::{Result, SnapError};
use crate::mirror::{mirror, MirrorStats};
use crate::store::{CapturedLayer, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every captured layer of the snapshot.
    All,
    /// One tracked directory, by basename ("etc") or path ("/etc").
    Component(String),
}

impl Scope {
    pub fn from_component(c: Option<String>) -> Self {
        match c {
            Some(c) => Scope::Component(c),
            None => Scope::All,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all"),
            Scope::Component(c) => write!(f, "component={}", c),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    pub snapshot: String,
    /// (component, stats) for each directory mirrored successfully.
    pub restored: Vec<(String, MirrorStats)>,
}

pub struct RollbackEngine<'a> {
    cfg: &'a SnapConfig,
    store: &'a SnapshotStore,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(cfg: &'a SnapConfig, store: &'a SnapshotStore) -> Self {
        Self { cfg, store }
    }

    /// Resolve targets without touching the filesystem.
    pub fn plan(&self, name: &str, scope: &Scope) -> Result<Vec<CapturedLayer>> {
        let snap = self.store.resolve(name)?;
        match scope {
            Scope::All => {
                if snap.layers.is_empty() {
                    warn!("rollback: snapshot '{}' has no captured layers", name);
                }
                Ok(snap.layers)
            }
            Scope::Component(c) => {
                let tracked = self.cfg.find_tracked(c).ok_or_else(|| SnapError::InvalidComponent {
                    component: c.clone(),
                    tracked: self
                        .cfg
                        .tracked_dirs
                        .iter()
                        .map(|t| t.name().to_string())
                        .collect(),
                })?;
                let layer = snap.layer(tracked.name()).cloned().ok_or_else(|| SnapError::NotFound {
                    name: format!("{}/{}", name, tracked.name()),
                })?;
                Ok(vec![layer])
            }
        }
    }

    /// Mirror the planned layers back. Partial failure → `PartialFailure`.
    pub fn restore(&self, name: &str, scope: &Scope) -> Result<RollbackReport> {
        let targets = self.plan(name, scope)?;
        info!(
            "rollback: start snapshot='{}', scope={}, targets={}",
            name,
            scope,
            targets.len()
        );

        let mut report = RollbackReport {
            snapshot: name.to_string(),
            restored: Vec::new(),
        };
        let mut failed = Vec::new();

        for layer in &targets {
            match mirror(&layer.path, &layer.tracked) {
                Ok(stats) => {
                    info!(
                        "rollback: {} restored (copied={}, deleted={}, unchanged={})",
                        layer.tracked.display(),
                        stats.copied,
                        stats.deleted,
                        stats.unchanged
                    );
                    report.restored.push((layer.component.clone(), stats));
                }
                Err(e) => {
                    error!("rollback: {} failed: {}", layer.tracked.display(), e);
                    failed.push(layer.tracked.display().to_string());
                }
            }
        }

        if !failed.is_empty() {
            return Err(SnapError::PartialFailure {
                op: "rollback",
                failed,
            });
        }
        info!("rollback: done snapshot='{}'", name);
        Ok(report)
    }
}
