//! Directory packer.
//!
//! Encodes host paths into a new container. [`pack_to`] walks a directory
//! tree; the session reconciler reuses [`write_container`] and
//! [`append_host`] to rebuild a container from its scratch directory.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::codec::{Codec, EntryEncoder, Format};
use crate::entry::{EntryKind, EntryMeta};
use crate::options::SessionOptions;
use crate::{ArchivePath, Error, Result};

/// Statistics from [`pack_to`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "pack results should be checked to verify what was written"]
pub struct PackResult {
    /// Regular files written.
    pub files: usize,
    /// Directories written.
    pub directories: usize,
    /// Symbolic links written.
    pub symlinks: usize,
    /// Uncompressed content bytes written.
    pub bytes: u64,
}

impl PackResult {
    /// Returns the number of members written.
    pub fn total_entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }

    fn record(&mut self, kind: EntryKind, bytes: u64) {
        match kind {
            EntryKind::File => self.files += 1,
            EntryKind::Directory => self.directories += 1,
            EntryKind::Symlink => self.symlinks += 1,
        }
        self.bytes += bytes;
    }
}

/// Packs `source` into a new container at `destination`.
///
/// A directory source is walked recursively in file-name order without
/// following symbolic links. With `include_root` every member is prefixed
/// with the source directory's name and the directory itself is stored
/// first; without it, the directory's children sit at the container root.
/// A file source is stored under its own name.
///
/// The format comes from `options` or from the destination's extension.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if `source` does not exist and
/// [`Error::UnknownFormat`] if the format cannot be inferred.
///
/// # Example
///
/// ```rust,no_run
/// use mutarc::{SessionOptions, pack_to};
///
/// let result = pack_to("site", "site.tar.gz", true, &SessionOptions::default())?;
/// println!("packed {} entries", result.total_entries());
/// # Ok::<(), mutarc::Error>(())
/// ```
pub fn pack_to(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    include_root: bool,
    options: &SessionOptions,
) -> Result<PackResult> {
    let source = source.as_ref();
    let destination = destination.as_ref();
    let format = options
        .forced_format()
        .or_else(|| Format::from_path(destination))
        .ok_or_else(|| Error::UnknownFormat {
            path: destination.to_path_buf(),
        })?;
    let root_meta = EntryMeta::from_path(source)?;
    let root_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let members = if root_meta.is_dir() {
        collect_tree(source, include_root.then_some(root_name.as_str()), options)?
    } else {
        let path = ArchivePath::file(&root_name)?;
        vec![(path, root_meta, source.to_path_buf())]
    };

    let mut result = PackResult::default();
    write_container(destination, format.codec(), options, None, |encoder| {
        for (path, meta, host) in &members {
            let bytes = append_host(encoder, path, meta, host)?;
            log::debug!("Packed {} ({} bytes)", path, bytes);
            result.record(meta.kind, bytes);
        }
        Ok(())
    })?;
    log::info!(
        "Packed {} into {} ({} entries, {} bytes)",
        source.display(),
        destination.display(),
        result.total_entries(),
        result.bytes
    );
    Ok(result)
}

fn collect_tree(
    source: &Path,
    prefix: Option<&str>,
    options: &SessionOptions,
) -> Result<Vec<(ArchivePath, EntryMeta, PathBuf)>> {
    let walker = WalkDir::new(source)
        .follow_links(false)
        .min_depth(if prefix.is_some() { 0 } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let excluded = entry.depth() > 0 && options.is_excluded(entry.path());
            if excluded {
                log::debug!("Excluded {}", entry.path().display());
            }
            !excluded
        });

    let mut members = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let mut name = prefix.map(str::to_string).unwrap_or_default();
        for component in relative.components() {
            if !name.is_empty() {
                name.push('/');
            }
            name.push_str(&component.as_os_str().to_string_lossy());
        }
        let meta = EntryMeta::from_path(entry.path())?;
        let path = ArchivePath::for_kind(&name, meta.is_dir())?;
        members.push((path, meta, entry.into_path()));
    }
    Ok(members)
}

/// Appends one host path with the given header metadata.
///
/// Regular files are read from `host`; directories and symlinks carry no data.
pub(crate) fn append_host(
    encoder: &mut dyn EntryEncoder,
    path: &ArchivePath,
    meta: &EntryMeta,
    host: &Path,
) -> Result<u64> {
    match meta.kind {
        EntryKind::File => {
            let mut file = File::open(host).map_err(|e| Error::from_io_at(e, host))?;
            encoder.append(path, meta, &mut file)
        }
        EntryKind::Directory | EntryKind::Symlink => encoder.append(path, meta, &mut io::empty()),
    }
}

/// Encodes a container at `destination` with members produced by `fill`.
///
/// With atomic flush enabled the container is written to a sibling
/// temporary file that replaces `destination` only after the encoder
/// finished; the replaced file's permissions are kept.
pub(crate) fn write_container<T>(
    destination: &Path,
    codec: &dyn Codec,
    options: &SessionOptions,
    comment: Option<&str>,
    fill: impl FnOnce(&mut dyn EntryEncoder) -> Result<T>,
) -> Result<T> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    if !options.atomic_flush {
        let mut file = File::create(destination)?;
        let value = encode_into(&mut file, codec, options.level, comment, fill)?;
        file.sync_all()?;
        return Ok(value);
    }

    let mut tmp = tempfile::Builder::new()
        .prefix(".mutarc-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    let value = encode_into(tmp.as_file_mut(), codec, options.level, comment, fill)?;
    tmp.as_file().sync_all()?;
    match std::fs::metadata(destination) {
        Ok(existing) => std::fs::set_permissions(tmp.path(), existing.permissions())?,
        Err(_) => set_default_permissions(tmp.path())?,
    }
    tmp.persist(destination).map_err(|e| Error::Io(e.error))?;
    Ok(value)
}

fn encode_into<T>(
    file: &mut File,
    codec: &dyn Codec,
    level: u32,
    comment: Option<&str>,
    fill: impl FnOnce(&mut dyn EntryEncoder) -> Result<T>,
) -> Result<T> {
    let mut encoder = codec.encoder(Box::new(file), level, comment);
    let value = fill(encoder.as_mut())?;
    encoder.finish()?;
    Ok(value)
}

#[cfg(unix)]
fn set_default_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
