//! Reconciliation of a session's entry list with its container.

use std::io;

use super::{ArchiveSession, Backing, load_entries};
use crate::codec::WriteSeek;
use crate::entry::{Entry, EntryKind, EntrySource};
use crate::{Error, Result, pack};

/// Statistics from a flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "flush results should be checked to verify what was written"]
pub struct FlushResult {
    /// Regular files written.
    pub files: usize,
    /// Directories written.
    pub directories: usize,
    /// Symbolic links written.
    pub symlinks: usize,
    /// Entries copied over from the previous container.
    pub carried_over: usize,
    /// Entries read from host paths.
    pub copied_from_host: usize,
    /// Uncompressed content bytes written.
    pub bytes: u64,
}

impl FlushResult {
    /// Returns the number of members in the written container.
    pub fn total_entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }

    fn record(&mut self, entry: &Entry, bytes: u64) {
        match entry.kind() {
            EntryKind::File => self.files += 1,
            EntryKind::Directory => self.directories += 1,
            EntryKind::Symlink => self.symlinks += 1,
        }
        match entry.source() {
            EntrySource::Container(_) => self.carried_over += 1,
            EntrySource::Host(_) => self.copied_from_host += 1,
            EntrySource::Synthetic => {}
        }
        self.bytes += bytes;
    }
}

impl ArchiveSession {
    /// Writes all pending changes.
    ///
    /// The container is rebuilt from scratch: every entry is materialized in
    /// a temporary directory (host files copied, container members extracted
    /// in one pass), then re-encoded in entry order. Afterwards the entry
    /// list is reloaded from the new container and the session is clean.
    ///
    /// A flush without pending changes does nothing. Writer-backed sessions
    /// encode their entries straight into the sink and finalize it on the
    /// first flush.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for read-only sessions,
    /// [`Error::WriterFinished`] when a finalized writer session has new
    /// changes, and any I/O or codec error hit while rebuilding. With atomic
    /// flush enabled (the default) a failed flush leaves the container file
    /// untouched.
    pub fn flush(&mut self) -> Result<FlushResult> {
        self.ensure_writable()?;
        let location = match &mut self.backing {
            Backing::Container(path) => path.clone(),
            Backing::Writer(sink) => {
                let sink = sink.take();
                return match sink {
                    Some(sink) => self.flush_to_writer(sink),
                    None if self.dirty => Err(Error::WriterFinished),
                    None => Ok(FlushResult::default()),
                };
            }
        };
        if !self.dirty {
            return Ok(FlushResult::default());
        }

        let scratch_root = self.options.scratch_root();
        std::fs::create_dir_all(&scratch_root)?;
        let base = location
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive".to_string());
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", base))
            .tempdir_in(&scratch_root)?;
        log::debug!(
            "Materializing {} entries in {}",
            self.entries.len(),
            scratch.path().display()
        );

        let all: Vec<&Entry> = self.entries.iter().collect();
        self.materialize(scratch.path(), &all)?;

        let mut result = FlushResult::default();
        let entries = &self.entries;
        let comment = self.comment.as_deref();
        pack::write_container(&location, self.codec, &self.options, comment, |encoder| {
            for entry in entries {
                let host = scratch.path().join(entry.path.trimmed());
                let mut meta = entry.meta.clone();
                if meta.kind == EntryKind::File {
                    meta.size = std::fs::metadata(&host)?.len();
                }
                let bytes = pack::append_host(encoder, &entry.path, &meta, &host)?;
                result.record(entry, bytes);
            }
            Ok(())
        })?;

        self.entries = load_entries(self.codec, &location)?;
        self.comment = self.codec.read_comment(&location)?;
        self.dirty = false;
        log::info!(
            "Flushed {} ({} entries, {} carried over, {} from host, {} bytes)",
            location.display(),
            result.total_entries(),
            result.carried_over,
            result.copied_from_host,
            result.bytes
        );
        Ok(result)
    }

    fn flush_to_writer(&mut self, sink: Box<dyn WriteSeek + Send>) -> Result<FlushResult> {
        let mut result = FlushResult::default();
        let mut encoder = self.codec.encoder(sink, self.options.level, self.comment.as_deref());
        for entry in &self.entries {
            let bytes = match &entry.source {
                EntrySource::Host(host) => {
                    let mut meta = entry.meta.clone();
                    if meta.kind == EntryKind::File {
                        meta.size = std::fs::metadata(host)
                            .map_err(|e| Error::from_io_at(e, host))?
                            .len();
                    }
                    pack::append_host(encoder.as_mut(), &entry.path, &meta, host)?
                }
                EntrySource::Synthetic => {
                    encoder.append(&entry.path, &entry.meta, &mut io::empty())?
                }
                EntrySource::Container(member) => {
                    return Err(Error::EntryNotFound {
                        path: member.to_string(),
                    });
                }
            };
            result.record(entry, bytes);
        }
        encoder.finish()?;
        self.dirty = false;
        log::info!(
            "Flushed {} entries to writer ({} bytes)",
            result.total_entries(),
            result.bytes
        );
        Ok(result)
    }
}
