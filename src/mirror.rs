//! One-way mirror sync: make `dst` match `src` exactly.
//!
//! Semantics (rsync -aAX --delete style):
//! - directories, regular files, symlinks and FIFOs in `src` are created or
//!   updated in `dst`; an entry whose type differs is replaced;
//! - a regular file is rewritten when its length or bytes differ, via
//!   tmp + rename so a hard link in `dst` never writes through to another inode;
//! - mode, ownership, mtime and extended attributes follow `src`;
//! - entries present only in `dst` are deleted;
//! - sockets and device nodes are skipped with a warning.
//!
//! Not atomic: an error leaves `dst` partially mirrored.

use log::{debug, warn};
use nix::sys::stat::Mode;
use nix::unistd;
use std::fs::{self, File, Metadata, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{lchown, symlink, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use walkdir::WalkDir;

use crate::error::{Result, SnapError};

const CMP_CHUNK: usize = 64 * 1024;
const TMP_SUFFIX: &str = ".layersnap-tmp";
const TMP_ATTEMPTS: u32 = 64;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    /// Regular files (re)written.
    pub copied: u64,
    /// Regular files already identical.
    pub unchanged: u64,
    /// Symlinks and FIFOs (re)created.
    pub special: u64,
    pub dirs_created: u64,
    /// Destination-only entries removed (a removed directory counts once).
    pub deleted: u64,
}

/// Mirror `src` onto `dst`. `dst` is created if missing, but must be a directory
/// when it exists.
pub fn mirror(src: &Path, dst: &Path) -> Result<MirrorStats> {
    let src_meta = fs::symlink_metadata(src).map_err(|e| SnapError::sync(src, e))?;
    if !src_meta.is_dir() {
        return Err(SnapError::sync(
            src,
            io::Error::new(io::ErrorKind::InvalidInput, "mirror source is not a directory"),
        ));
    }
    match fs::symlink_metadata(dst) {
        Ok(m) if !m.is_dir() => {
            return Err(SnapError::sync(
                dst,
                io::Error::new(io::ErrorKind::InvalidInput, "mirror target is not a directory"),
            ));
        }
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dst).map_err(|e| SnapError::sync(dst, e))?;
        }
        Err(e) => return Err(SnapError::sync(dst, e)),
    }

    debug!("mirror: {} -> {}", src.display(), dst.display());
    let mut stats = MirrorStats::default();

    // 1) copy/update pass; directory attributes are applied afterwards, deepest
    //    first, so read-only modes and mtimes survive writes into them.
    let mut dirs: Vec<(PathBuf, Metadata)> = vec![(dst.to_path_buf(), src_meta)];
    for entry in WalkDir::new(src).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| walk_error(src, e))?;
        let rel = relative(src, entry.path())?;
        let target = dst.join(rel);
        let meta = entry.metadata().map_err(|e| walk_error(entry.path(), e))?;
        let ft = meta.file_type();

        if ft.is_dir() {
            if sync_dir(&target)? {
                stats.dirs_created += 1;
            }
            dirs.push((target, meta));
        } else if ft.is_file() {
            if sync_file(entry.path(), &target, &meta)? {
                stats.copied += 1;
            } else {
                stats.unchanged += 1;
            }
            apply_attrs(entry.path(), &target, &meta)?;
            set_mtime(&target, &meta)?;
        } else if ft.is_symlink() {
            if sync_symlink(entry.path(), &target)? {
                stats.special += 1;
            }
            apply_owner(&target, &meta)?;
        } else if ft.is_fifo() {
            if sync_fifo(&target, &meta)? {
                stats.special += 1;
            }
            apply_attrs(entry.path(), &target, &meta)?;
        } else {
            warn!("mirror: skip special file {}", entry.path().display());
        }
    }

    // 2) delete pass.
    stats.deleted = delete_extraneous(src, dst)?;

    // 3) directory attributes.
    for (dir, meta) in dirs.iter().rev() {
        let src_dir = src.join(relative(dst, dir)?);
        apply_attrs(&src_dir, dir, meta)?;
        set_mtime(dir, meta)?;
    }

    debug!(
        "mirror: done {} -> {}: copied={}, unchanged={}, special={}, dirs_created={}, deleted={}",
        src.display(),
        dst.display(),
        stats.copied,
        stats.unchanged,
        stats.special,
        stats.dirs_created,
        stats.deleted
    );
    Ok(stats)
}

fn relative<'a>(base: &Path, p: &'a Path) -> Result<&'a Path> {
    p.strip_prefix(base).map_err(|_| {
        SnapError::sync(
            p,
            io::Error::new(io::ErrorKind::Other, "walked outside mirror root"),
        )
    })
}

fn walk_error(p: &Path, e: walkdir::Error) -> SnapError {
    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| p.to_path_buf());
    let source = e
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
    SnapError::sync(path, source)
}

/// Remove whatever sits at `p` (file, symlink or whole tree). Missing is fine.
fn remove_any(p: &Path) -> io::Result<()> {
    match fs::symlink_metadata(p) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(p),
        Ok(_) => fs::remove_file(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Returns true when the directory had to be created.
fn sync_dir(target: &Path) -> Result<bool> {
    match fs::symlink_metadata(target) {
        Ok(m) if m.is_dir() => return Ok(false),
        Ok(_) => remove_any(target).map_err(|e| SnapError::sync(target, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SnapError::sync(target, e)),
    }
    fs::create_dir(target).map_err(|e| SnapError::sync(target, e))?;
    Ok(true)
}

/// Returns true when the file was (re)written.
fn sync_file(src: &Path, target: &Path, meta: &Metadata) -> Result<bool> {
    match fs::symlink_metadata(target) {
        Ok(t) if t.is_file() => {
            if t.len() == meta.len() && same_content(src, target)? {
                return Ok(false);
            }
        }
        Ok(_) => remove_any(target).map_err(|e| SnapError::sync(target, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SnapError::sync(target, e)),
    }

    let (tmp, mut out) = create_tmp(target).map_err(|e| SnapError::sync(target, e))?;
    let copied = File::open(src)
        .and_then(|mut input| io::copy(&mut input, &mut out))
        .map_err(|e| SnapError::sync(src, e));
    drop(out);
    // tmp is ours (create_new), so removing it on failure is safe.
    if let Err(e) = copied {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        SnapError::sync(target, e)
    })?;
    Ok(true)
}

/// Exclusively create a hidden sibling of `target`. A path that already exists
/// (possibly a mirrored entry with the same name) is skipped, never reused.
fn create_tmp(target: &Path) -> io::Result<(PathBuf, File)> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pid = std::process::id();
    for _ in 0..TMP_ATTEMPTS {
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = target.with_file_name(format!(".{}{}.{}.{}", name, TMP_SUFFIX, pid, seq));
        match OpenOptions::new().write(true).create_new(true).mode(0o600).open(&tmp) {
            Ok(f) => return Ok((tmp, f)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "no free temporary name next to target",
    ))
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let mut fa = File::open(a).map_err(|e| SnapError::sync(a, e))?;
    let mut fb = File::open(b).map_err(|e| SnapError::sync(b, e))?;
    let mut ba = vec![0u8; CMP_CHUNK];
    let mut bb = vec![0u8; CMP_CHUNK];
    loop {
        let na = read_full(&mut fa, &mut ba).map_err(|e| SnapError::sync(a, e))?;
        let nb = read_full(&mut fb, &mut bb).map_err(|e| SnapError::sync(b, e))?;
        if na != nb || ba[..na] != bb[..nb] {
            return Ok(false);
        }
        if na == 0 {
            return Ok(true);
        }
    }
}

fn read_full(f: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match f.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

fn sync_symlink(src: &Path, target: &Path) -> Result<bool> {
    let link = fs::read_link(src).map_err(|e| SnapError::sync(src, e))?;
    match fs::symlink_metadata(target) {
        Ok(m) if m.file_type().is_symlink() => {
            if fs::read_link(target).map_err(|e| SnapError::sync(target, e))? == link {
                return Ok(false);
            }
            fs::remove_file(target).map_err(|e| SnapError::sync(target, e))?;
        }
        Ok(_) => remove_any(target).map_err(|e| SnapError::sync(target, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SnapError::sync(target, e)),
    }
    symlink(&link, target).map_err(|e| SnapError::sync(target, e))?;
    Ok(true)
}

fn sync_fifo(target: &Path, meta: &Metadata) -> Result<bool> {
    match fs::symlink_metadata(target) {
        Ok(m) if m.file_type().is_fifo() => return Ok(false),
        Ok(_) => remove_any(target).map_err(|e| SnapError::sync(target, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(SnapError::sync(target, e)),
    }
    let mode = Mode::from_bits_truncate((meta.mode() & 0o777) as _);
    unistd::mkfifo(target, mode).map_err(|e| SnapError::sync(target, io::Error::from(e)))?;
    Ok(true)
}

/// Walk `dst` and remove entries with no counterpart in `src`.
fn delete_extraneous(src: &Path, dst: &Path) -> Result<u64> {
    let mut doomed = Vec::new();
    let mut it = WalkDir::new(dst).min_depth(1).follow_links(false).into_iter();
    while let Some(entry) = it.next() {
        let entry = entry.map_err(|e| walk_error(dst, e))?;
        let rel = relative(dst, entry.path())?;
        match fs::symlink_metadata(src.join(rel)) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if entry.file_type().is_dir() {
                    it.skip_current_dir();
                }
                doomed.push(entry.into_path());
            }
            Err(e) => return Err(SnapError::sync(src.join(rel), e)),
        }
    }
    for p in &doomed {
        debug!("mirror: delete {}", p.display());
        remove_any(p).map_err(|e| SnapError::sync(p, e))?;
    }
    Ok(doomed.len() as u64)
}

/// Mode, ownership and xattrs (not for symlinks).
fn apply_attrs(src: &Path, target: &Path, meta: &Metadata) -> Result<()> {
    apply_owner(target, meta)?;

    let cur = fs::symlink_metadata(target).map_err(|e| SnapError::sync(target, e))?;
    let mode = meta.mode() & 0o7777;
    if cur.mode() & 0o7777 != mode {
        fs::set_permissions(target, Permissions::from_mode(mode))
            .map_err(|e| SnapError::sync(target, e))?;
    }

    sync_xattrs(src, target)
}

/// lchown only when uid/gid differ, so unprivileged runs over own files work.
fn apply_owner(target: &Path, meta: &Metadata) -> Result<()> {
    let cur = fs::symlink_metadata(target).map_err(|e| SnapError::sync(target, e))?;
    if cur.uid() != meta.uid() || cur.gid() != meta.gid() {
        lchown(target, Some(meta.uid()), Some(meta.gid()))
            .map_err(|e| SnapError::sync(target, e))?;
    }
    Ok(())
}

fn set_mtime(target: &Path, meta: &Metadata) -> Result<()> {
    let Ok(mtime) = meta.modified() else {
        return Ok(());
    };
    let cur = fs::symlink_metadata(target).map_err(|e| SnapError::sync(target, e))?;
    if cur.modified().ok() == Some(mtime) {
        return Ok(());
    }
    // futimens with explicit times needs ownership, not a writable fd.
    File::open(target)
        .and_then(|f| f.set_modified(mtime))
        .map_err(|e| SnapError::sync(target, e))
}

fn xattr_unsupported(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(code) if code == nix::errno::Errno::ENOTSUP as i32
            || code == nix::errno::Errno::EOPNOTSUPP as i32
    )
}

fn sync_xattrs(src: &Path, target: &Path) -> Result<()> {
    if !xattr::SUPPORTED_PLATFORM {
        return Ok(());
    }
    let wanted: Vec<_> = match xattr::list(src) {
        Ok(names) => names.collect(),
        Err(e) if xattr_unsupported(&e) => return Ok(()),
        Err(e) => return Err(SnapError::sync(src, e)),
    };
    let present: Vec<_> = match xattr::list(target) {
        Ok(names) => names.collect(),
        Err(e) if xattr_unsupported(&e) => return Ok(()),
        Err(e) => return Err(SnapError::sync(target, e)),
    };

    for name in &wanted {
        let value = xattr::get(src, name).map_err(|e| SnapError::sync(src, e))?;
        let Some(value) = value else { continue };
        let cur = xattr::get(target, name).map_err(|e| SnapError::sync(target, e))?;
        if cur.as_deref() != Some(value.as_slice()) {
            match xattr::set(target, name, &value) {
                Ok(()) => {}
                Err(e) if xattr_unsupported(&e) => {
                    warn!("mirror: xattr {:?} unsupported on {}", name, target.display());
                }
                Err(e) => return Err(SnapError::sync(target, e)),
            }
        }
    }
    for name in present.iter().filter(|n| !wanted.contains(n)) {
        match xattr::remove(target, name) {
            Ok(()) => {}
            Err(e) if xattr_unsupported(&e) => {}
            Err(e) => return Err(SnapError::sync(target, e)),
        }
    }
    Ok(())
}
