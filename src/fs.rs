//! Host filesystem helpers.
//!
//! Every handle opened here is scoped to the function that opens it, so it is
//! released on all exit paths, including errors.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::entry::{EntryKind, EntryMeta};
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Reads the target of a symbolic link as a string.
pub(crate) fn read_link_target(path: &Path) -> Result<String> {
    let target = std::fs::read_link(path).map_err(|e| Error::from_io_at(e, path))?;
    Ok(target.to_string_lossy().into_owned())
}

/// Copies `src` to `dest` in fixed-size chunks and carries over its permissions.
///
/// A symbolic link at `src` is recreated as a link at `dest` pointing at the
/// same target instead of being followed. Returns the number of bytes copied.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `src` does not exist, or [`Error::Io`] if
/// reading, writing or changing permissions fails.
pub fn copy_with_permissions(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<u64> {
    let src = src.as_ref();
    let dest = dest.as_ref();

    let metadata = std::fs::symlink_metadata(src).map_err(|e| Error::from_io_at(e, src))?;
    if metadata.file_type().is_symlink() {
        let target = read_link_target(src)?;
        create_symlink(&target, dest)?;
        return Ok(0);
    }

    let mut reader = File::open(src).map_err(|e| Error::from_io_at(e, src))?;
    remove_existing_link(dest)?;
    let mut writer = File::create(dest)?;
    let copied = copy_chunked(&mut reader, &mut writer)?;
    writer.flush()?;
    drop(writer);

    std::fs::set_permissions(dest, metadata.permissions())?;
    Ok(copied)
}

/// Copies everything from `reader` into `writer` through a fixed buffer.
pub(crate) fn copy_chunked<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }

    Ok(total)
}

/// Creates a symbolic link at `link` pointing at `target`, replacing any existing file.
pub fn create_symlink(target: &str, link: impl AsRef<Path>) -> Result<()> {
    let link = link.as_ref();
    remove_existing_link(link)?;
    symlink(target, link)?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &str, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

/// Removes a file or link at `path` so that it can be recreated.
///
/// Existing directories are left alone.
fn remove_existing_link(path: &Path) -> Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.is_dir() => std::fs::remove_file(path)?,
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Creates the parent directory of `path` (and its ancestors) if missing.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Applies the modification time and permission bits of `meta` to a materialized path.
///
/// Failures are logged, not returned. Symbolic links are skipped.
pub(crate) fn apply_metadata(path: &Path, meta: &EntryMeta) {
    use filetime::FileTime;

    if meta.kind == EntryKind::Symlink {
        return;
    }

    let mtime = FileTime::from_unix_time(meta.modified as i64, 0);
    if let Err(e) = filetime::set_file_mtime(path, mtime) {
        log::warn!(
            "Failed to set modification time on '{}': {}",
            path.display(),
            e
        );
    }

    apply_permissions(path, meta.mode);
}

#[cfg(unix)]
fn apply_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777)) {
        log::warn!("Failed to set permissions on '{}': {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn apply_permissions(path: &Path, mode: u32) {
    if mode & 0o200 != 0 {
        return;
    }
    match std::fs::metadata(path) {
        Ok(metadata) => {
            let mut perms = metadata.permissions();
            perms.set_readonly(true);
            if let Err(e) = std::fs::set_permissions(path, perms) {
                log::warn!(
                    "Failed to set read-only attribute on '{}': {}",
                    path.display(),
                    e
                );
            }
        }
        Err(e) => log::warn!("Failed to stat '{}': {}", path.display(), e),
    }
}
