//! Forward-only container writer.
//!
//! [`StreamWriter`] encodes entries straight into a sink without an
//! in-memory entry list or a scratch directory. Entries are written in call
//! order; nothing can be renamed or removed once written.
//!
//! # Example
//!
//! ```rust
//! use mutarc::{ArchivePath, EntryMeta, StreamWriter};
//!
//! let mut out = Vec::new();
//! let mut writer = StreamWriter::tar_gz(&mut out);
//! writer.write_entry(ArchivePath::new("logs/")?, &EntryMeta::directory(), &[])?;
//! writer.write_entry(ArchivePath::new("logs/today.txt")?, &EntryMeta::file(2), b"ok")?;
//! let result = writer.end()?;
//! assert_eq!(result.entries_written, 2);
//! assert!(!out.is_empty());
//! # Ok::<(), mutarc::Error>(())
//! ```

use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::codec::{DEFAULT_LEVEL, EntryEncoder, Format, TarGzEncoder, ZipEncoder};
use crate::entry::{EntryKind, EntryMeta};
use crate::{ArchivePath, Error, Result, pack};

/// Statistics from [`StreamWriter::end`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "stream results should be checked to verify what was written"]
pub struct StreamResult {
    /// Number of members written.
    pub entries_written: usize,
    /// Directories among them.
    pub directories: usize,
    /// Uncompressed content bytes written.
    pub bytes: u64,
}

/// Writes a container entry by entry into a sink.
pub struct StreamWriter<'a> {
    format: Format,
    encoder: Box<dyn EntryEncoder + 'a>,
    result: StreamResult,
}

impl fmt::Debug for StreamWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamWriter")
            .field("format", &self.format)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

impl<'a> StreamWriter<'a> {
    /// Starts a tar.gz stream at the default compression level.
    ///
    /// tar.gz output never seeks, so any `Write` sink works.
    pub fn tar_gz<W: Write + 'a>(sink: W) -> Self {
        Self::tar_gz_with_level(sink, DEFAULT_LEVEL)
    }

    /// Starts a tar.gz stream at compression `level` (0-9, clamped).
    pub fn tar_gz_with_level<W: Write + 'a>(sink: W, level: u32) -> Self {
        Self::from_encoder(Format::TarGz, Box::new(TarGzEncoder::new(sink, level)))
    }

    /// Starts a zip stream at the default compression level.
    pub fn zip<W: Write + Seek + 'a>(sink: W) -> Self {
        Self::zip_with_level(sink, DEFAULT_LEVEL)
    }

    /// Starts a zip stream at compression `level` (0 stores, 1-9 deflates).
    pub fn zip_with_level<W: Write + Seek + 'a>(sink: W, level: u32) -> Self {
        Self::from_encoder(Format::Zip, Box::new(ZipEncoder::new(sink, level)))
    }

    /// Starts a stream of the given format.
    pub fn begin<W: Write + Seek + 'a>(format: Format, sink: W) -> Self {
        Self::begin_with_level(format, sink, DEFAULT_LEVEL)
    }

    /// Starts a stream of the given format at compression `level`.
    pub fn begin_with_level<W: Write + Seek + 'a>(format: Format, sink: W, level: u32) -> Self {
        Self::from_encoder(format, format.codec().encoder(Box::new(sink), level, None))
    }

    fn from_encoder(format: Format, encoder: Box<dyn EntryEncoder + 'a>) -> Self {
        Self {
            format,
            encoder,
            result: StreamResult::default(),
        }
    }

    /// Returns the container format being written.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Writes one entry from an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if a file's `data` length differs from
    /// `meta.size`.
    pub fn write_entry(&mut self, path: ArchivePath, meta: &EntryMeta, data: &[u8]) -> Result<()> {
        if meta.kind == EntryKind::File && data.len() as u64 != meta.size {
            return Err(Error::SizeMismatch {
                path: path.to_string(),
                expected: meta.size,
                actual: data.len() as u64,
            });
        }
        let mut data = data;
        self.write_entry_from_reader(path, meta, &mut data)
    }

    /// Writes one entry whose content comes from `reader`.
    ///
    /// For files the reader must yield exactly `meta.size` bytes.
    pub fn write_entry_from_reader<R: Read>(
        &mut self,
        path: ArchivePath,
        meta: &EntryMeta,
        mut reader: R,
    ) -> Result<()> {
        let path = conform(path, meta)?;
        let bytes = self.encoder.append(&path, meta, &mut reader)?;
        self.record(meta.kind, bytes);
        Ok(())
    }

    /// Writes the host file, directory or symlink at `host` (not recursive).
    pub fn write_path(&mut self, path: ArchivePath, host: impl AsRef<Path>) -> Result<()> {
        let host = host.as_ref();
        let meta = EntryMeta::from_path(host)?;
        let path = conform(path, &meta)?;
        let bytes = pack::append_host(self.encoder.as_mut(), &path, &meta, host)?;
        self.record(meta.kind, bytes);
        Ok(())
    }

    /// Finalizes the container, then the compression layer.
    pub fn end(self) -> Result<StreamResult> {
        self.encoder.finish()?;
        log::debug!(
            "Finished {} stream ({} entries, {} bytes)",
            self.format,
            self.result.entries_written,
            self.result.bytes
        );
        Ok(self.result)
    }

    fn record(&mut self, kind: EntryKind, bytes: u64) {
        self.result.entries_written += 1;
        if kind == EntryKind::Directory {
            self.result.directories += 1;
        }
        self.result.bytes += bytes;
    }
}

/// Gives `path` the directory marker exactly when `meta` is a directory.
fn conform(path: ArchivePath, meta: &EntryMeta) -> Result<ArchivePath> {
    if path.is_dir() == meta.is_dir() {
        Ok(path)
    } else {
        ArchivePath::for_kind(path.trimmed(), meta.is_dir())
    }
}
