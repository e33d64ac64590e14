//! Advisory lock on the snapshot store.
//!
//! Overlay mounts and tracked directories are host-global, so every
//! store-mutating operation (create / rollback / cleanup / delete) holds the
//! exclusive lock for its whole duration. Readers (list / show / status) take
//! the shared lock so they never observe a half-written snapshot directory.
//!
//! Lock file path: <root>/LOCK
//! Lock is released on Drop.

use fs2::FileExt;
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{Result, SnapError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // unlock errors on drop are ignored; closing the fd releases it anyway.
        let _ = FileExt::unlock(&self.file);
        debug!("lock: released {:?} {}", self.mode, self.path.display());
    }
}

pub fn lock_file_path(root: &Path) -> PathBuf {
    root.join("LOCK")
}

fn open_lock_file(root: &Path) -> Result<File> {
    fs::create_dir_all(root)
        .map_err(|e| SnapError::io(format!("create store root {}", root.display()), e))?;
    let path = lock_file_path(root);
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .map_err(|source| SnapError::LockFailed { path, source })
}

/// Acquire the store lock. `wait=false` fails immediately when contended.
pub fn acquire_lock(root: &Path, mode: LockMode, wait: bool) -> Result<LockGuard> {
    let file = open_lock_file(root)?;
    let path = lock_file_path(root);
    let res = match (mode, wait) {
        (LockMode::Shared, true) => FileExt::lock_shared(&file),
        (LockMode::Shared, false) => FileExt::try_lock_shared(&file),
        (LockMode::Exclusive, true) => FileExt::lock_exclusive(&file),
        (LockMode::Exclusive, false) => FileExt::try_lock_exclusive(&file),
    };
    res.map_err(|source| SnapError::LockFailed {
        path: path.clone(),
        source,
    })?;
    debug!("lock: acquired {:?} {}", mode, path.display());
    Ok(LockGuard { file, path, mode })
}

pub fn acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    acquire_lock(root, LockMode::Exclusive, true)
}

pub fn acquire_shared_lock(root: &Path) -> Result<LockGuard> {
    acquire_lock(root, LockMode::Shared, true)
}
