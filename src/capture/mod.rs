//! Capture backends (the OverlayManager role).
//!
//! - overlay.rs: kernel overlayfs union mount, lower = live tracked directory,
//!   upper = the snapshot's captured layer (Linux, CAP_SYS_ADMIN).
//! - copy.rs: plain mirror into the captured layer, no mount. Portable and
//!   usable without privileges.
//!
//! Both produce a captured layer that is a full copy of the tracked directory at
//! capture time, so a later rollback is an exact mirror of that layer.

mod copy;
mod overlay;

pub use copy::CopyCapture;
pub use overlay::{escape_overlay_path, is_mount_point, OverlayCapture, UnionMount};

use crate::config::CaptureMode;
use crate::error::Result;
use crate::mirror::MirrorStats;
use crate::store::{CapturedLayer, SnapshotStore};
use crate::tracked::TrackedDirectory;

/// Outcome of capturing one tracked directory.
#[derive(Debug)]
pub struct Capture {
    pub layer: CapturedLayer,
    /// Active union mount, torn down once the snapshot is recorded.
    pub mount: Option<UnionMount>,
    pub stats: MirrorStats,
}

pub trait SnapshotCapture {
    fn mode(&self) -> CaptureMode;

    /// Capture `dir` into the layer of snapshot `name`.
    /// Directories created before a failure are left on disk.
    fn capture(&self, store: &SnapshotStore, dir: &TrackedDirectory, name: &str) -> Result<Capture>;
}

pub fn capture_for(mode: CaptureMode) -> Box<dyn SnapshotCapture> {
    match mode {
        CaptureMode::Overlay => Box::new(OverlayCapture),
        CaptureMode::Copy => Box::new(CopyCapture),
    }
}

/// Shared precondition: the tracked directory exists and is a directory.
pub(crate) fn check_tracked(dir: &TrackedDirectory) -> std::io::Result<()> {
    let m = std::fs::metadata(dir.path())?;
    if !m.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "tracked path is not a directory",
        ));
    }
    std::fs::read_dir(dir.path()).map(|_| ())
}
