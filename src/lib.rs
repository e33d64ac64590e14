//! layersnap: overlay-based snapshots of tracked configuration directories.
//!
//! Each snapshot freezes every tracked directory (e.g. `/etc`) into a captured
//! layer under `<root>/snapshots/<name>/`, with a `metadata.json` record.
//! Rollback mirrors a layer back onto the live directory; cleanup keeps the N
//! newest snapshots.
//!
//! ```no_run
//! use layersnap::{Engine, Scope, SnapConfig};
//!
//! # fn main() -> layersnap::Result<()> {
//! let engine = Engine::new(SnapConfig::from_env()?)?;
//! let report = engine.create(Some("pre-upgrade"))?;
//! println!("captured {} layer(s)", report.layers.len());
//! engine.rollback("pre-upgrade", &Scope::Component("etc".into()))?;
//! # Ok(())
//! # }
//! ```

// Базовые модули
pub mod config;
pub mod error;
pub mod lock;
pub mod tracked;

// Хранилище и захват слоёв
pub mod capture;
pub mod mirror;
pub mod packages;
pub mod store;

// Операции жизненного цикла
pub mod engine;
pub mod retention;
pub mod rollback;

// Удобные реэкспорты
pub use capture::{CopyCapture, OverlayCapture, SnapshotCapture};
pub use config::{CaptureMode, SnapConfig};
pub use engine::{CreateReport, Engine, Operation, Outcome, StatusReport};
pub use error::{Result, SnapError};
pub use lock::{acquire_exclusive_lock, acquire_shared_lock, LockGuard};
pub use mirror::{mirror, MirrorStats};
pub use retention::PruneReport;
pub use rollback::{RollbackEngine, RollbackReport, Scope};
pub use store::{CapturedLayer, Snapshot, SnapshotMeta, SnapshotStore, SnapshotSummary};
pub use tracked::TrackedDirectory;
