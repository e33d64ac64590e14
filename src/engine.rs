//! Snapshot lifecycle engine.
//!
//! `Engine` owns the configuration value, the store and the capture backend,
//! and exposes the closed operation set: create / list / show / delete /
//! rollback / cleanup / status. Store-mutating operations run under the
//! exclusive store lock, readers under the shared one.
//!
//! Partial failures:
//! - create: every directory is attempted; if at least one was captured the
//!   snapshot is recorded with those layers and `PartialFailure` is returned;
//!   if none was, nothing is recorded and the first error is returned.
//! - rollback / cleanup: see rollback.rs / retention.rs.

use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::capture::{capture_for, is_mount_point, SnapshotCapture, UnionMount};
use crate::config::SnapConfig;
use crate::error::{Result, SnapError};
use crate::lock::{acquire_lock, LockGuard, LockMode};
use crate::packages::query_packages;
use crate::retention::{order_by_recency, prune, PruneReport};
use crate::rollback::{RollbackEngine, RollbackReport, Scope};
use crate::store::{validate_name, CapturedLayer, Snapshot, SnapshotMeta, SnapshotStore, SnapshotSummary};

/// Closed set of operations the command surface can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create { name: Option<String> },
    List,
    Show { name: String },
    Delete { name: String },
    Rollback { name: String, component: Option<String> },
    /// `keep` None → configured default; negative → 0.
    Cleanup { keep: Option<i64> },
    Status,
    Unrecognized { command: String },
}

impl Operation {
    /// Operations that mount, mirror or delete.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Operation::Create { .. }
                | Operation::Delete { .. }
                | Operation::Rollback { .. }
                | Operation::Cleanup { .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create { name: Some(n) } => write!(f, "create '{}'", n),
            Operation::Create { name: None } => f.write_str("create"),
            Operation::List => f.write_str("list"),
            Operation::Show { name } => write!(f, "show '{}'", name),
            Operation::Delete { name } => write!(f, "delete '{}'", name),
            Operation::Rollback { name, component: Some(c) } => {
                write!(f, "rollback '{}' (component={})", name, c)
            }
            Operation::Rollback { name, component: None } => write!(f, "rollback '{}'", name),
            Operation::Cleanup { keep: Some(k) } => write!(f, "cleanup (keep={})", k),
            Operation::Cleanup { keep: None } => f.write_str("cleanup"),
            Operation::Status => f.write_str("status"),
            Operation::Unrecognized { command } => write!(f, "'{}'", command),
        }
    }
}

#[derive(Debug)]
pub enum Outcome {
    Created(CreateReport),
    Listed(Vec<SnapshotSummary>),
    Shown(Snapshot),
    Deleted(String),
    RolledBack(RollbackReport),
    Pruned(PruneReport),
    Status(StatusReport),
}

#[derive(Debug, Clone)]
pub struct CreateReport {
    pub name: String,
    pub created: String,
    pub layers: Vec<CapturedLayer>,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub config: SnapConfig,
    pub snapshots: usize,
    pub newest: Option<SnapshotSummary>,
    /// Mount targets under <root>/overlay still mounted (left by a killed run).
    pub active_mounts: Vec<PathBuf>,
}

pub struct Engine {
    cfg: SnapConfig,
    store: SnapshotStore,
    capture: Box<dyn SnapshotCapture>,
    wait_for_lock: bool,
}

impl Engine {
    /// Validates the configuration and picks the backend from `cfg.capture`.
    pub fn new(cfg: SnapConfig) -> Result<Self> {
        let capture = capture_for(cfg.capture);
        Self::with_capture(cfg, capture)
    }

    pub fn with_capture(cfg: SnapConfig, capture: Box<dyn SnapshotCapture>) -> Result<Self> {
        cfg.validate()?;
        let store = SnapshotStore::new(cfg.root.clone());
        Ok(Self {
            cfg,
            store,
            capture,
            wait_for_lock: true,
        })
    }

    /// false → fail with `LockFailed` instead of blocking on a busy store.
    pub fn wait_for_lock(mut self, wait: bool) -> Self {
        self.wait_for_lock = wait;
        self
    }

    pub fn config(&self) -> &SnapConfig {
        &self.cfg
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    fn lock(&self, mode: LockMode) -> Result<LockGuard> {
        acquire_lock(&self.cfg.root, mode, self.wait_for_lock)
    }

    /// Exhaustive dispatch over the operation set.
    pub fn dispatch(&self, op: Operation) -> Result<Outcome> {
        debug!("engine: dispatch {:?}", op);
        match op {
            Operation::Create { name } => self.create(name.as_deref()).map(Outcome::Created),
            Operation::List => self.list().map(Outcome::Listed),
            Operation::Show { name } => self.show(&name).map(Outcome::Shown),
            Operation::Delete { name } => self.delete(&name).map(|_| Outcome::Deleted(name)),
            Operation::Rollback { name, component } => self
                .rollback(&name, &Scope::from_component(component))
                .map(Outcome::RolledBack),
            Operation::Cleanup { keep } => self.cleanup(keep).map(Outcome::Pruned),
            Operation::Status => self.status().map(Outcome::Status),
            Operation::Unrecognized { command } => Err(SnapError::Unrecognized { command }),
        }
    }

    // ---------------- create ----------------

    pub fn create(&self, name: Option<&str>) -> Result<CreateReport> {
        let _guard = self.lock(LockMode::Exclusive)?;

        let name = match name {
            Some(n) => {
                validate_name(n)?;
                if self.store.exists(n) {
                    return Err(SnapError::AlreadyExists { name: n.to_string() });
                }
                n.to_string()
            }
            None => self.auto_name(),
        };

        let created = Utc::now();
        info!(
            "create: start '{}', capture={}, tracked={}",
            name,
            self.capture.mode(),
            self.cfg.tracked_dirs.len()
        );
        let packages = query_packages(self.cfg.package_cmd.as_deref());

        let mut layers = Vec::new();
        let mut mounts: Vec<UnionMount> = Vec::new();
        let mut failed = Vec::new();
        let mut first_err = None;
        for dir in &self.cfg.tracked_dirs {
            match self.capture.capture(&self.store, dir, &name) {
                Ok(c) => {
                    layers.push(c.layer);
                    mounts.extend(c.mount);
                }
                Err(e) => {
                    error!("create: capture {} failed: {}", dir, e);
                    failed.push(dir.to_string());
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        if layers.is_empty() {
            let dir = self.store.snapshot_dir(&name);
            if let Err(e) = fs::remove_dir_all(&dir) {
                debug!("create: nothing to clean at {}: {}", dir.display(), e);
            }
            return Err(first_err.unwrap_or(SnapError::PartialFailure {
                op: "create",
                failed,
            }));
        }

        let mut meta = SnapshotMeta::new(&name, created);
        meta.tracked_dirs = self
            .cfg
            .tracked_dirs
            .iter()
            .map(|t| t.path().display().to_string())
            .collect();
        meta.pacman_packages = packages;
        meta.captured = Some(layers.iter().map(|l| l.component.clone()).collect());
        self.store.write(&meta)?;

        // Recorded: the transient mounts can go now.
        for m in mounts {
            debug!(
                "create: release {} (lower={}, upper={}, work={})",
                m.target().display(),
                m.lower().display(),
                m.upper().display(),
                m.work().display()
            );
            let target = m.target().to_path_buf();
            if let Err(e) = m.release() {
                warn!("create: unmount {} failed: {}", target.display(), e);
            }
        }

        if !failed.is_empty() {
            warn!(
                "create: snapshot '{}' recorded with {} of {} layer(s)",
                name,
                layers.len(),
                self.cfg.tracked_dirs.len()
            );
            return Err(SnapError::PartialFailure {
                op: "create",
                failed,
            });
        }

        info!("create: done '{}' ({} layer(s))", name, layers.len());
        Ok(CreateReport {
            name,
            created: meta.created,
            layers,
        })
    }

    /// snapshot_%Y%m%d_%H%M%S, with _N appended while the name is taken.
    fn auto_name(&self) -> String {
        let base = format!("snapshot_{}", Local::now().format("%Y%m%d_%H%M%S"));
        if !self.store.exists(&base) {
            return base;
        }
        (1u32..)
            .map(|i| format!("{}_{}", base, i))
            .find(|n| !self.store.exists(n))
            .unwrap_or(base)
    }

    // ---------------- readers ----------------

    /// Valid snapshots, oldest first.
    pub fn list(&self) -> Result<Vec<SnapshotSummary>> {
        let _guard = self.lock(LockMode::Shared)?;
        self.store.list()
    }

    pub fn show(&self, name: &str) -> Result<Snapshot> {
        let _guard = self.lock(LockMode::Shared)?;
        self.store.resolve(name)
    }

    pub fn status(&self) -> Result<StatusReport> {
        let _guard = self.lock(LockMode::Shared)?;
        let all = self.store.list()?;
        let snapshots = all.len();
        let newest = order_by_recency(all).into_iter().next();

        let mut active_mounts = Vec::new();
        let overlay_root = self.cfg.root.join("overlay");
        if let Ok(components) = fs::read_dir(&overlay_root) {
            for c in components.flatten() {
                let Ok(targets) = fs::read_dir(c.path()) else { continue };
                for t in targets.flatten() {
                    let p = t.path();
                    if is_mount_point(&p).unwrap_or(false) {
                        active_mounts.push(p);
                    }
                }
            }
        }

        Ok(StatusReport {
            config: self.cfg.clone(),
            snapshots,
            newest,
            active_mounts,
        })
    }

    // ---------------- mutators ----------------

    pub fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.lock(LockMode::Exclusive)?;
        self.store.delete(name)?;
        info!("delete: '{}' removed", name);
        Ok(())
    }

    pub fn rollback(&self, name: &str, scope: &Scope) -> Result<RollbackReport> {
        let _guard = self.lock(LockMode::Exclusive)?;
        RollbackEngine::new(&self.cfg, &self.store).restore(name, scope)
    }

    pub fn cleanup(&self, keep: Option<i64>) -> Result<PruneReport> {
        let keep = match keep {
            None => self.cfg.keep,
            Some(k) if k < 0 => {
                warn!("cleanup: negative keep count {} treated as 0", k);
                0
            }
            Some(k) => usize::try_from(k).unwrap_or(usize::MAX),
        };
        let _guard = self.lock(LockMode::Exclusive)?;
        prune(&self.store, keep)
    }
}
