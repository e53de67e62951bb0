//! Mutable archive sessions.
//!
//! An [`ArchiveSession`] holds the entry list of one container in memory.
//! Adds, deletes and renames only touch that list and mark the session
//! dirty; nothing is written until [`flush`](ArchiveSession::flush)
//! rebuilds the container in a single pass.
//!
//! # Example
//!
//! ```rust,no_run
//! use mutarc::ArchiveSession;
//!
//! let mut session = ArchiveSession::open("release.tar.gz")?;
//! session.delete_by_path("debug.log")?;
//! session.add_file("docs/CHANGELOG.md", "CHANGELOG.md")?;
//! session.rename("bin/tool", "bin/tool-1.2")?;
//!
//! let result = session.flush()?;
//! println!("wrote {} entries", result.total_entries());
//! # Ok::<(), mutarc::Error>(())
//! ```

mod extract;
mod flush;

pub use extract::ExtractResult;
pub use flush::FlushResult;

use std::fmt;
use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::codec::{Codec, Format, MAX_COMMENT_LEN, WriteSeek};
use crate::entry::{Entry, EntryMeta, EntrySource};
use crate::options::{OpenMode, SessionOptions};
use crate::{ArchivePath, Error, Result};

/// Where a session's container lives.
enum Backing {
    /// A container file on the host.
    Container(PathBuf),
    /// A caller-supplied sink; `None` once it has been finalized.
    Writer(Option<Box<dyn WriteSeek + Send>>),
}

/// An editable, in-memory view of a tar.gz or zip container.
///
/// Paths passed to the session use `/` separators; directory paths end with
/// `/`. Paths in the entry list are unique and kept in insertion order, with
/// auto-inserted parent directories placed before their children.
pub struct ArchiveSession {
    backing: Backing,
    entries: Vec<Entry>,
    comment: Option<String>,
    dirty: bool,
    mode: OpenMode,
    codec: &'static dyn Codec,
    options: SessionOptions,
}

impl fmt::Debug for ArchiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match &self.backing {
            Backing::Container(path) => path.display().to_string(),
            Backing::Writer(Some(_)) => "<writer>".to_string(),
            Backing::Writer(None) => "<finalized writer>".to_string(),
        };
        f.debug_struct("ArchiveSession")
            .field("backing", &backing)
            .field("format", &self.codec.format())
            .field("mode", &self.mode)
            .field("entries", &self.entries.len())
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

impl ArchiveSession {
    /// Opens an existing container for editing.
    ///
    /// Only regular files, directories and symbolic links are listed. Other
    /// tar members (hard links, FIFOs, devices) are skipped with a warning
    /// and are dropped from the container by the next flush.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist and
    /// [`Error::InvalidFormat`] if it is not a readable tar.gz or zip
    /// container.
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(location, OpenMode::ReadWrite, SessionOptions::default())
    }

    /// Opens an existing container for inspection and extraction only.
    pub fn open_read_only(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(location, OpenMode::ReadOnly, SessionOptions::default())
    }

    /// Creates an empty container, replacing any existing file, and opens it.
    ///
    /// Missing parent directories are created. The format comes from the
    /// file extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFormat`] if the extension is not `.tar.gz`,
    /// `.tgz` or `.zip`.
    pub fn create(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(location, OpenMode::ReadWriteTruncate, SessionOptions::default())
    }

    /// Opens a container with an explicit mode and options.
    ///
    /// | Mode | Missing file | Existing file |
    /// |------|--------------|---------------|
    /// | `ReadOnly` | `NotFound` | opened |
    /// | `ReadWrite` | `NotFound` | opened |
    /// | `ReadWriteCreate` | created empty | opened |
    /// | `ReadWriteTruncate` | created empty | replaced with an empty container |
    pub fn open_with(
        location: impl AsRef<Path>,
        mode: OpenMode,
        options: SessionOptions,
    ) -> Result<Self> {
        let location = location.as_ref().to_path_buf();
        let create = match mode {
            OpenMode::ReadWriteTruncate => true,
            OpenMode::ReadWriteCreate => !location.exists(),
            OpenMode::ReadOnly | OpenMode::ReadWrite => false,
        };

        let format = if create {
            let format = options
                .forced_format()
                .or_else(|| Format::from_path(&location))
                .ok_or_else(|| Error::UnknownFormat {
                    path: location.clone(),
                })?;
            write_empty_container(&location, format)?;
            format
        } else {
            detect_format(&location, &options)?
        };

        let codec = format.codec();
        let entries = load_entries(codec, &location)?;
        let comment = codec.read_comment(&location)?;
        log::info!(
            "Opened {} ({}, {} entries, {:?})",
            location.display(),
            format,
            entries.len(),
            mode
        );
        Ok(Self {
            backing: Backing::Container(location),
            entries,
            comment,
            dirty: false,
            mode,
            codec,
            options,
        })
    }

    /// Creates a session that flushes into `sink` instead of a file.
    ///
    /// The session starts empty. Its first flush encodes every entry into
    /// the sink and finalizes it; after that, further changes can no longer
    /// be flushed.
    pub fn for_writer<W>(sink: W, format: Format) -> Self
    where
        W: Write + Seek + Send + 'static,
    {
        Self::for_writer_with(sink, format, SessionOptions::default())
    }

    /// Like [`for_writer`](Self::for_writer) with explicit options.
    pub fn for_writer_with<W>(sink: W, format: Format, options: SessionOptions) -> Self
    where
        W: Write + Seek + Send + 'static,
    {
        Self {
            backing: Backing::Writer(Some(Box::new(sink))),
            entries: Vec::new(),
            comment: None,
            dirty: false,
            mode: OpenMode::ReadWriteTruncate,
            codec: format.codec(),
            options,
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Adds a directory entry with no backing files.
    ///
    /// Missing parent directories are inserted first. Returns `Ok(false)` if
    /// the directory already exists.
    pub fn add_empty_dir(&mut self, path: &str) -> Result<bool> {
        self.ensure_writable()?;
        let path = ArchivePath::directory(path)?;
        self.insert_dir(path, None)
    }

    /// Adds (or replaces) the entry at `path` with the host file `source`.
    ///
    /// Symbolic links are stored as links; a directory source registers only
    /// the directory itself. Sources matched by the exclusion filter are
    /// skipped silently. The source's bytes are read at flush time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `source` does not exist.
    pub fn add_file(&mut self, path: &str, source: impl AsRef<Path>) -> Result<()> {
        self.ensure_writable()?;
        let source = source.as_ref();
        if self.options.is_excluded(source) {
            log::debug!("Excluded {}", source.display());
            return Ok(());
        }

        let meta = EntryMeta::from_path(source)?;
        if meta.is_dir() {
            self.insert_dir(ArchivePath::directory(path)?, Some(meta))?;
            return Ok(());
        }

        let path = ArchivePath::file(path)?;
        if let Some(parent) = path.parent() {
            self.insert_dir(parent, None)?;
        }
        let entry = Entry::new(path, meta, EntrySource::Host(source.to_path_buf()));
        match self.index_of(&entry.path) {
            Some(index) => {
                log::debug!("Replacing {} with {}", entry.path, source.display());
                self.entries[index] = entry;
            }
            None => {
                log::debug!("Adding {} from {}", entry.path, source.display());
                self.entries.push(entry);
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Adds the directory `source` and everything below it under `path`.
    ///
    /// Children are visited in file-name order. Excluded children, including
    /// whole excluded subtrees, are skipped. The first error aborts the walk
    /// and leaves already added entries in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `source` is not a readable directory.
    pub fn add_dir(&mut self, path: &str, source: impl AsRef<Path>) -> Result<()> {
        self.ensure_writable()?;
        let source = source.as_ref();
        let metadata = std::fs::metadata(source)
            .ok()
            .filter(|m| m.is_dir())
            .ok_or_else(|| Error::NotFound {
                path: source.to_path_buf(),
            })?;
        if self.options.is_excluded(source) {
            log::debug!("Excluded {}", source.display());
            return Ok(());
        }

        let dir = ArchivePath::directory(path)?;
        self.insert_dir(dir.clone(), Some(EntryMeta::from_metadata(&metadata, None)))?;

        let children = WalkDir::new(source)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        for child in children {
            let child = child.map_err(std::io::Error::from)?;
            if self.options.is_excluded(child.path()) {
                log::debug!("Excluded {}", child.path().display());
                continue;
            }
            let name = child.file_name().to_string_lossy();
            let is_dir = child.file_type().is_dir();
            let target = dir.join(&name, is_dir)?;
            if is_dir {
                self.add_dir(target.as_str(), child.path())?;
            } else {
                self.add_file(target.as_str(), child.path())?;
            }
        }
        Ok(())
    }

    /// Removes the entry at `index` and returns it.
    ///
    /// Only that entry is removed; children of a directory stay listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `index >= len()`.
    pub fn delete_by_index(&mut self, index: usize) -> Result<Entry> {
        self.ensure_writable()?;
        if index >= self.entries.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        let entry = self.entries.remove(index);
        log::debug!("Deleted {}", entry.path);
        self.dirty = true;
        Ok(entry)
    }

    /// Removes the entry whose path equals `path` and returns it.
    pub fn delete_by_path(&mut self, path: &str) -> Result<Entry> {
        self.ensure_writable()?;
        let index = self.position(path).ok_or_else(|| Error::EntryNotFound {
            path: path.to_string(),
        })?;
        self.delete_by_index(index)
    }

    /// Renames the entry at `from` to `to`.
    ///
    /// Renaming a directory moves every entry below it. Missing parents of
    /// `to` are inserted. The moved entries stay in their old position unless
    /// the new parent comes later in the list; then they move right behind
    /// it. The entry keeps its content source, so a renamed container member
    /// is still copied from its original location on flush.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if `from` does not exist,
    /// [`Error::EntryExists`] if `to` (or a moved descendant's new path) is
    /// taken, and [`Error::InvalidArchivePath`] when moving a directory
    /// into itself.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.ensure_writable()?;
        let index = self.position(from).ok_or_else(|| Error::EntryNotFound {
            path: from.to_string(),
        })?;
        let from = self.entries[index].path.clone();
        let to = ArchivePath::for_kind(to, from.is_dir())?;
        if from == to {
            return Ok(());
        }
        if from.is_ancestor_of(&to) {
            return Err(Error::InvalidArchivePath(format!(
                "cannot move '{}' into itself",
                from
            )));
        }

        let moves: Vec<(usize, ArchivePath)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.path.rebase(&from, &to).map(|new| (i, new)))
            .collect();
        for (_, new) in &moves {
            let taken = self
                .entries
                .iter()
                .enumerate()
                .any(|(i, entry)| &entry.path == new && !moves.iter().any(|(m, _)| *m == i));
            if taken {
                return Err(Error::EntryExists {
                    path: new.to_string(),
                });
            }
        }

        // The moved entries leave as one block and go back in at their old
        // slot, or right after the target's nearest existing ancestor when
        // that sits further down.
        let first = moves.first().map_or(index, |(i, _)| *i);
        let mut block = Vec::with_capacity(moves.len());
        for (i, new) in moves.into_iter().rev() {
            let mut entry = self.entries.remove(i);
            entry.path = new;
            block.push(entry);
        }
        block.reverse();

        let missing = self.missing_ancestors(&to);
        let anchor = missing
            .first()
            .unwrap_or(&to)
            .parent()
            .and_then(|dir| self.index_of(&dir));
        let at = anchor.map_or(first, |a| first.max(a + 1));
        let inserted = missing
            .into_iter()
            .map(|dir| {
                log::debug!("Adding directory {}", dir);
                Entry::new(dir, EntryMeta::directory(), EntrySource::Synthetic)
            })
            .chain(block);
        for (offset, entry) in inserted.enumerate() {
            self.entries.insert(at + offset, entry);
        }
        log::debug!("Renamed {} to {}", from, to);
        self.dirty = true;
        Ok(())
    }

    /// Replaces the container comment; an empty string removes it.
    ///
    /// Zip stores the comment in the end of central directory record and
    /// tar.gz in the gzip header. A gzip comment ends at the first NUL
    /// character.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommentTooLong`] for comments over
    /// [`MAX_COMMENT_LEN`] bytes.
    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        self.ensure_writable()?;
        if comment.len() > MAX_COMMENT_LEN {
            return Err(Error::CommentTooLong {
                len: comment.len(),
            });
        }
        let comment = (!comment.is_empty()).then(|| comment.to_string());
        if comment != self.comment {
            log::debug!("Setting container comment to {:?}", comment);
            self.comment = comment;
            self.dirty = true;
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the container comment.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Returns every entry path in order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(Entry::name).collect()
    }

    /// Returns the entry paths that start with any of `prefixes`, in order.
    ///
    /// An empty prefix slice selects every entry.
    pub fn list_with_prefix<S: AsRef<str>>(&self, prefixes: &[S]) -> Vec<&str> {
        self.entries
            .iter()
            .map(Entry::name)
            .filter(|name| {
                prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p.as_ref()))
            })
            .collect()
    }

    /// Returns the entries in order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Returns the entry with exactly this path.
    pub fn entry(&self, path: &str) -> Option<&Entry> {
        self.position(path).map(|i| &self.entries[i])
    }

    /// Returns the index of the entry with exactly this path.
    pub fn position(&self, path: &str) -> Option<usize> {
        let path = ArchivePath::new(path).ok()?;
        self.index_of(&path)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the session has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if there are changes that have not been flushed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the container path, or `None` for writer-backed sessions.
    pub fn location(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Container(path) => Some(path),
            Backing::Writer(_) => None,
        }
    }

    /// Returns the container format.
    pub fn format(&self) -> Format {
        self.codec.format()
    }

    /// Returns the mode the session was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Returns the session options.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Flushes pending changes and consumes the session.
    ///
    /// Read-only sessions are closed without writing.
    pub fn close(mut self) -> Result<FlushResult> {
        if !self.mode.is_writable() {
            return Ok(FlushResult::default());
        }
        self.flush()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    fn index_of(&self, path: &ArchivePath) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.path == path)
    }

    /// Returns the ancestors of `path` that have no entry, outermost first.
    fn missing_ancestors(&self, path: &ArchivePath) -> Vec<ArchivePath> {
        let mut missing = Vec::new();
        let mut current = path.parent();
        while let Some(dir) = current {
            if self.index_of(&dir).is_some() {
                break;
            }
            current = dir.parent();
            missing.push(dir);
        }
        missing.reverse();
        missing
    }

    /// Inserts a directory and its missing ancestors.
    ///
    /// With `meta`, an existing entry at `path` takes the new metadata.
    fn insert_dir(&mut self, path: ArchivePath, meta: Option<EntryMeta>) -> Result<bool> {
        if let Some(index) = self.index_of(&path) {
            if let Some(meta) = meta {
                self.entries[index].meta = meta;
                self.dirty = true;
            }
            return Ok(false);
        }

        for dir in self.missing_ancestors(&path) {
            log::debug!("Adding directory {}", dir);
            self.entries
                .push(Entry::new(dir, EntryMeta::directory(), EntrySource::Synthetic));
        }
        log::debug!("Adding directory {}", path);
        let meta = meta.unwrap_or_else(EntryMeta::directory);
        self.entries
            .push(Entry::new(path, meta, EntrySource::Synthetic));
        self.dirty = true;
        Ok(true)
    }
}

impl Drop for ArchiveSession {
    fn drop(&mut self) {
        let pending_writer = matches!(self.backing, Backing::Writer(Some(_)));
        if self.dirty || pending_writer {
            log::warn!(
                "Archive session for {} dropped with unflushed changes",
                self.location()
                    .map_or_else(|| "<writer>".to_string(), |p| p.display().to_string())
            );
        }
    }
}

fn detect_format(location: &Path, options: &SessionOptions) -> Result<Format> {
    if let Some(format) = options.forced_format().or_else(|| Format::from_path(location)) {
        return Ok(format);
    }
    Format::detect(location)?.ok_or_else(|| {
        Error::InvalidFormat(format!(
            "{} is neither a tar.gz nor a zip container",
            location.display()
        ))
    })
}

fn write_empty_container(location: &Path, format: Format) -> Result<()> {
    if let Some(parent) = location.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(location)?;
    format.codec().write_empty(Box::new(&mut file))?;
    file.sync_all()?;
    log::info!("Created empty {} container at {}", format, location.display());
    Ok(())
}

/// Decodes the member list of a container into session entries.
///
/// A path stored twice keeps its first slot and its last header.
fn load_entries(codec: &dyn Codec, location: &Path) -> Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = Vec::new();
    for (path, meta) in codec.decode_headers(location)? {
        let entry = Entry::new(path.clone(), meta, EntrySource::Container(path));
        match entries.iter().position(|e| e.path == entry.path) {
            Some(index) => {
                log::debug!("Duplicate member {}; keeping the later one", entry.path);
                entries[index] = entry;
            }
            None => entries.push(entry),
        }
    }
    Ok(entries)
}
