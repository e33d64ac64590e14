//! overlayfs capture.
//!
//! Per tracked directory D (basename B) and snapshot N:
//! - upper  = <root>/snapshots/N/B   (the captured layer)
//! - work   = <root>/work/B/N        (overlay scratch, same filesystem as upper)
//! - target = <root>/overlay/B/N      (transient mount point)
//!
//! The upper layer is seeded with a full mirror of D before mounting, then
//! `overlay` is mounted with lowerdir=D. The lower layer is never written.
//! The mount lives until the snapshot metadata is recorded; `UnionMount`
//! detaches it on `release()` or, failing that, on Drop.

use log::{debug, info, warn};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::{check_tracked, Capture, SnapshotCapture};
use crate::config::CaptureMode;
use crate::error::{Result, SnapError};
use crate::mirror::mirror;
use crate::store::{CapturedLayer, SnapshotStore};
use crate::tracked::TrackedDirectory;

#[derive(Debug, Clone, Copy, Default)]
pub struct OverlayCapture;

impl SnapshotCapture for OverlayCapture {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Overlay
    }

    fn capture(&self, store: &SnapshotStore, dir: &TrackedDirectory, name: &str) -> Result<Capture> {
        check_tracked(dir).map_err(|e| SnapError::MountFailure {
            dir: dir.path().to_path_buf(),
            source: e,
        })?;

        let upper = store.layer_dir(name, dir.name());
        let work = store.work_dir(dir.name(), name);
        let target = store.overlay_dir(dir.name(), name);
        for d in [&upper, &work, &target] {
            fs::create_dir_all(d)
                .map_err(|e| SnapError::io(format!("create {}", d.display()), e))?;
        }

        let stats = mirror(dir.path(), &upper)?;

        let mount = UnionMount::mount(dir.path(), &upper, &work, &target)?;
        info!(
            "capture(overlay): {} mounted at {} (upper={}, {} file(s))",
            dir,
            target.display(),
            upper.display(),
            stats.copied + stats.unchanged
        );

        Ok(Capture {
            layer: CapturedLayer {
                tracked: dir.path().to_path_buf(),
                component: dir.name().to_string(),
                path: upper,
            },
            mount: Some(mount),
            stats,
        })
    }
}

/// An active overlay mount owned by the capture that created it.
#[derive(Debug)]
pub struct UnionMount {
    lower: PathBuf,
    upper: PathBuf,
    work: PathBuf,
    target: PathBuf,
    mounted: bool,
}

impl UnionMount {
    fn mount(lower: &Path, upper: &Path, work: &Path, target: &Path) -> Result<Self> {
        let opts = format!(
            "lowerdir={},upperdir={},workdir={}",
            escape_overlay_path(lower),
            escape_overlay_path(upper),
            escape_overlay_path(work)
        );
        debug!("overlay: mount -t overlay overlay -o {} {}", opts, target.display());
        sys_mount(target, &opts).map_err(|e| SnapError::MountFailure {
            dir: lower.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            lower: lower.to_path_buf(),
            upper: upper.to_path_buf(),
            work: work.to_path_buf(),
            target: target.to_path_buf(),
            mounted: true,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn lower(&self) -> &Path {
        &self.lower
    }

    pub fn upper(&self) -> &Path {
        &self.upper
    }

    pub fn work(&self) -> &Path {
        &self.work
    }

    /// Detach the mount and remove the (now empty) mount point.
    pub fn release(mut self) -> Result<()> {
        self.unmount()
    }

    fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        sys_umount(&self.target).map_err(|e| SnapError::MountFailure {
            dir: self.lower.clone(),
            source: e,
        })?;
        self.mounted = false;
        if let Err(e) = fs::remove_dir(&self.target) {
            debug!("overlay: keep mount point {}: {}", self.target.display(), e);
        }
        debug!("overlay: released {}", self.target.display());
        Ok(())
    }
}

impl Drop for UnionMount {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            warn!("overlay: {}", e);
        }
    }
}

/// overlayfs option values use ',' and ':' as separators; escape them.
pub fn escape_overlay_path(p: &Path) -> String {
    let s = p.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | ',' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A directory is a mount point when its device differs from its parent's.
pub fn is_mount_point(p: &Path) -> io::Result<bool> {
    let me = fs::symlink_metadata(p)?;
    let parent = match p.parent() {
        Some(parent) => fs::metadata(parent)?,
        None => return Ok(true),
    };
    Ok(me.dev() != parent.dev() || me.ino() == parent.ino())
}

#[cfg(target_os = "linux")]
fn sys_mount(target: &Path, opts: &str) -> io::Result<()> {
    use nix::mount::{mount, MsFlags};
    mount(
        Some("overlay"),
        target,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts),
    )
    .map_err(io::Error::from)
}

#[cfg(target_os = "linux")]
fn sys_umount(target: &Path) -> io::Result<()> {
    use nix::mount::{umount2, MntFlags};
    umount2(target, MntFlags::MNT_DETACH).map_err(io::Error::from)
}

#[cfg(not(target_os = "linux"))]
fn sys_mount(_target: &Path, _opts: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "overlayfs is only available on Linux; use capture mode 'copy'",
    ))
}

#[cfg(not(target_os = "linux"))]
fn sys_umount(_target: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_separators() {
        assert_eq!(escape_overlay_path(Path::new("/etc")), "/etc");
        assert_eq!(escape_overlay_path(Path::new("/a,b:c")), "/a\\,b\\:c");
    }

    #[test]
    fn temp_dir_child_is_not_a_mount_point() {
        let d = std::env::temp_dir().join(format!("ls-mp-{}", std::process::id()));
        fs::create_dir_all(&d).unwrap();
        assert!(!is_mount_point(&d).unwrap());
        fs::remove_dir(&d).unwrap();
    }
}
