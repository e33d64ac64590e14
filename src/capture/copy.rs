use log::info;
use std::fs;

use super::{check_tracked, Capture, SnapshotCapture};
use crate::config::CaptureMode;
use crate::error::{Result, SnapError};
use crate::mirror::mirror;
use crate::store::{CapturedLayer, SnapshotStore};
use crate::tracked::TrackedDirectory;

/// Copy-based capture: mirror the tracked directory into the layer directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyCapture;

impl SnapshotCapture for CopyCapture {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Copy
    }

    fn capture(&self, store: &SnapshotStore, dir: &TrackedDirectory, name: &str) -> Result<Capture> {
        check_tracked(dir).map_err(|e| SnapError::io(format!("tracked directory {}", dir), e))?;

        let layer = store.layer_dir(name, dir.name());
        fs::create_dir_all(&layer)
            .map_err(|e| SnapError::io(format!("create layer {}", layer.display()), e))?;

        let stats = mirror(dir.path(), &layer)?;
        info!(
            "capture(copy): {} -> {} ({} file(s))",
            dir,
            layer.display(),
            stats.copied + stats.unchanged
        );

        Ok(Capture {
            layer: CapturedLayer {
                tracked: dir.path().to_path_buf(),
                component: dir.name().to_string(),
                path: layer,
            },
            mount: None,
            stats,
        })
    }
}
