//! Entry model: one member of a container.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::{ArchivePath, Error, Result};

/// Default permission bits for regular files without host metadata.
pub(crate) const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default permission bits for directories without host metadata.
pub(crate) const DEFAULT_DIR_MODE: u32 = 0o755;
/// Default permission bits for symbolic links.
pub(crate) const DEFAULT_LINK_MODE: u32 = 0o777;

/// The kind of a container member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory. Its path always ends with `/`.
    Directory,
    /// A symbolic link. The target is stored in [`EntryMeta::link_target`].
    Symlink,
}

/// Header metadata of a member, independent of where its bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Member kind.
    pub kind: EntryKind,
    /// Uncompressed size in bytes (0 for directories and symlinks).
    pub size: u64,
    /// Unix permission bits (`0o7777` mask).
    pub mode: u32,
    /// Modification time in seconds since the Unix epoch.
    pub modified: u64,
    /// Link target, present only for [`EntryKind::Symlink`].
    pub link_target: Option<String>,
}

impl EntryMeta {
    /// Creates metadata for a regular file of `size` bytes, modified now.
    pub fn file(size: u64) -> Self {
        Self {
            kind: EntryKind::File,
            size,
            mode: DEFAULT_FILE_MODE,
            modified: unix_now(),
            link_target: None,
        }
    }

    /// Creates metadata for a directory, modified now.
    pub fn directory() -> Self {
        Self {
            kind: EntryKind::Directory,
            size: 0,
            mode: DEFAULT_DIR_MODE,
            modified: unix_now(),
            link_target: None,
        }
    }

    /// Creates metadata for a symbolic link pointing at `target`.
    pub fn symlink(target: impl Into<String>) -> Self {
        Self {
            kind: EntryKind::Symlink,
            size: 0,
            mode: DEFAULT_LINK_MODE,
            modified: unix_now(),
            link_target: Some(target.into()),
        }
    }

    /// Sets the permission bits.
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o7777;
        self
    }

    /// Sets the modification time (seconds since the Unix epoch).
    pub fn with_modified(mut self, modified: u64) -> Self {
        self.modified = modified;
        self
    }

    /// Reads metadata for a host path without following symbolic links.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path does not exist, or
    /// [`Error::Io`] if it cannot be inspected.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::symlink_metadata(path).map_err(|e| Error::from_io_at(e, path))?;
        let link_target = if metadata.file_type().is_symlink() {
            Some(crate::fs::read_link_target(path)?)
        } else {
            None
        };
        Ok(Self::from_metadata(&metadata, link_target))
    }

    /// Creates metadata from `std::fs::Metadata` obtained with a non-following stat.
    pub fn from_metadata(metadata: &Metadata, link_target: Option<String>) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let size = match kind {
            EntryKind::File => metadata.len(),
            _ => 0,
        };
        Self {
            kind,
            size,
            mode: host_mode(metadata, kind),
            modified: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0),
            link_target: if kind == EntryKind::Symlink {
                link_target
            } else {
                None
            },
        }
    }

    /// Returns true for directory metadata.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns true for symbolic link metadata.
    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

#[cfg(unix)]
fn host_mode(metadata: &Metadata, _kind: EntryKind) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn host_mode(metadata: &Metadata, kind: EntryKind) -> u32 {
    let base = match kind {
        EntryKind::File => DEFAULT_FILE_MODE,
        EntryKind::Directory => DEFAULT_DIR_MODE,
        EntryKind::Symlink => DEFAULT_LINK_MODE,
    };
    if metadata.permissions().readonly() {
        base & !0o222
    } else {
        base
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Where the bytes of an entry come from at flush time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Stored unchanged in the opened container under this member path.
    ///
    /// The member path stays fixed when the entry is renamed.
    Container(ArchivePath),
    /// Read from this host path when the session is flushed.
    Host(PathBuf),
    /// No backing bytes; used for directories created in memory.
    Synthetic,
}

/// An entry in an archive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The normalized path within the container.
    pub path: ArchivePath,
    /// Header metadata.
    pub meta: EntryMeta,
    pub(crate) source: EntrySource,
}

impl Entry {
    pub(crate) fn new(path: ArchivePath, meta: EntryMeta, source: EntrySource) -> Self {
        Self { path, meta, source }
    }

    /// Returns the path as a string slice.
    pub fn name(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the entry kind.
    pub fn kind(&self) -> EntryKind {
        self.meta.kind
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.meta.is_dir()
    }

    /// Returns where the entry's bytes will be read from on flush.
    pub fn source(&self) -> &EntrySource {
        &self.source
    }

    /// Returns the host path for entries added from the filesystem.
    pub fn source_location(&self) -> Option<&Path> {
        match &self.source {
            EntrySource::Host(path) => Some(path),
            _ => None,
        }
    }

    /// Returns true if the entry is carried over unchanged from the opened container.
    pub fn is_archived(&self) -> bool {
        matches!(self.source, EntrySource::Container(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let file = EntryMeta::file(42);
        assert_eq!(file.kind, EntryKind::File);
        assert_eq!(file.size, 42);
        assert_eq!(file.mode, 0o644);

        let dir = EntryMeta::directory();
        assert!(dir.is_dir());
        assert_eq!(dir.size, 0);

        let link = EntryMeta::symlink("../target");
        assert!(link.is_symlink());
        assert_eq!(link.link_target.as_deref(), Some("../target"));
    }

    #[test]
    fn test_with_mode_masks_type_bits() {
        let meta = EntryMeta::file(0).with_mode(0o100755);
        assert_eq!(meta.mode, 0o755);
    }

    #[test]
    fn test_from_path_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"12345").unwrap();

        let meta = EntryMeta::from_path(&path).unwrap();
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 5);
        assert!(meta.modified > 0);
        assert!(meta.link_target.is_none());
    }

    #[test]
    fn test_from_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        let meta = EntryMeta::from_path(dir.path()).unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.size, 0);
    }

    #[test]
    fn test_from_path_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = EntryMeta::from_path(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_path_symlink_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target.txt"), b"hello").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("target.txt", &link).unwrap();

        let meta = EntryMeta::from_path(&link).unwrap();
        assert_eq!(meta.kind, EntryKind::Symlink);
        assert_eq!(meta.size, 0);
        assert_eq!(meta.link_target.as_deref(), Some("target.txt"));
    }

    #[test]
    fn test_entry_accessors() {
        let entry = Entry::new(
            ArchivePath::new("dir/a.txt").unwrap(),
            EntryMeta::file(3),
            EntrySource::Host(PathBuf::from("/tmp/a.txt")),
        );
        assert_eq!(entry.name(), "dir/a.txt");
        assert_eq!(entry.kind(), EntryKind::File);
        assert_eq!(entry.source_location(), Some(Path::new("/tmp/a.txt")));
        assert!(!entry.is_archived());
    }
}
