//! Gzip-compressed tar containers.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::{Compression, GzBuilder};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};

use super::{Codec, CountingReader, EntryEncoder, Format, MemberVisitor, WriteSeek, check_size};
use crate::entry::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DEFAULT_LINK_MODE, EntryKind, EntryMeta};
use crate::{ArchivePath, Error, Result};

/// Codec for `.tar.gz` / `.tgz` containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGz;

impl Codec for TarGz {
    fn format(&self) -> Format {
        Format::TarGz
    }

    fn read_members(&self, container: &Path, visit: &mut MemberVisitor<'_>) -> Result<()> {
        let file = File::open(container).map_err(|e| Error::from_io_at(e, container))?;
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));

        for entry in archive.entries().map_err(Error::format)? {
            let mut entry = entry.map_err(Error::format)?;
            let Some((path, meta)) = member_header(&entry)? else {
                continue;
            };
            if visit(&path, &meta, &mut entry)?.is_break() {
                return Ok(());
            }
        }

        // Reading the rest of the stream validates the gzip trailer.
        let mut decoder = archive.into_inner();
        io::copy(&mut decoder, &mut io::sink()).map_err(Error::format)?;
        Ok(())
    }

    fn read_comment(&self, container: &Path) -> Result<Option<String>> {
        let file = File::open(container).map_err(|e| Error::from_io_at(e, container))?;
        let decoder = GzDecoder::new(BufReader::new(file));
        let header = decoder
            .header()
            .ok_or_else(|| Error::format("missing or corrupt gzip header"))?;
        Ok(header
            .comment()
            .filter(|comment| !comment.is_empty())
            .map(|comment| String::from_utf8_lossy(comment).into_owned()))
    }

    fn encoder<'a>(
        &self,
        sink: Box<dyn WriteSeek + 'a>,
        level: u32,
        comment: Option<&str>,
    ) -> Box<dyn EntryEncoder + 'a> {
        Box::new(TarGzEncoder::with_comment(sink, level, comment))
    }
}

fn member_header<R: Read>(entry: &tar::Entry<'_, R>) -> Result<Option<(ArchivePath, EntryMeta)>> {
    let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
    let header = entry.header();
    let kind = match header.entry_type() {
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink,
        EntryType::Regular | EntryType::Continuous if raw.ends_with('/') => EntryKind::Directory,
        EntryType::Regular | EntryType::Continuous => EntryKind::File,
        other => {
            log::warn!(
                "Skipping tar member '{}' of type {:?}; it will not survive a flush",
                raw,
                other
            );
            return Ok(None);
        }
    };
    if matches!(raw.trim_end_matches('/'), "" | ".") {
        return Ok(None);
    }

    let path = ArchivePath::for_kind(&raw, kind == EntryKind::Directory)
        .map_err(|e| Error::format(format!("tar member '{}': {}", raw, e)))?;

    let default_mode = match kind {
        EntryKind::File => DEFAULT_FILE_MODE,
        EntryKind::Directory => DEFAULT_DIR_MODE,
        EntryKind::Symlink => DEFAULT_LINK_MODE,
    };
    let link_target = match kind {
        EntryKind::Symlink => {
            let target = entry
                .link_name_bytes()
                .ok_or_else(|| Error::format(format!("symlink '{}' has no target", raw)))?;
            Some(String::from_utf8_lossy(&target).into_owned())
        }
        _ => None,
    };

    let meta = EntryMeta {
        kind,
        size: if kind == EntryKind::File { entry.size() } else { 0 },
        mode: header.mode().unwrap_or(default_mode) & 0o7777,
        modified: header.mtime().unwrap_or(0),
        link_target,
    };
    Ok(Some((path, meta)))
}

/// Writes members into a gzip-compressed tar stream.
pub struct TarGzEncoder<W: Write> {
    builder: Builder<GzEncoder<W>>,
}

impl<W: Write> TarGzEncoder<W> {
    /// Creates an encoder at compression `level` (0-9).
    pub fn new(sink: W, level: u32) -> Self {
        Self::with_comment(sink, level, None)
    }

    /// Creates an encoder whose gzip header carries `comment`.
    ///
    /// The gzip comment field is NUL-terminated, so the text is cut at the
    /// first NUL character.
    pub fn with_comment(sink: W, level: u32, comment: Option<&str>) -> Self {
        let mut gz = GzBuilder::new();
        if let Some(text) = comment.and_then(|c| c.split('\0').next()) {
            gz = gz.comment(text);
        }
        Self {
            builder: Builder::new(gz.write(sink, Compression::new(level.min(9)))),
        }
    }
}

impl<W: Write> fmt::Debug for TarGzEncoder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarGzEncoder").finish_non_exhaustive()
    }
}

impl<W: Write> EntryEncoder for TarGzEncoder<W> {
    fn append(&mut self, path: &ArchivePath, meta: &EntryMeta, data: &mut dyn Read) -> Result<u64> {
        let mut header = Header::new_gnu();
        header.set_mode(meta.mode & 0o7777);
        header.set_mtime(meta.modified);

        match meta.kind {
            EntryKind::Directory => {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                self.builder
                    .append_data(&mut header, path.as_str(), io::empty())?;
                Ok(0)
            }
            EntryKind::Symlink => {
                let target = meta.link_target.as_deref().unwrap_or_default();
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
                self.builder
                    .append_link(&mut header, path.as_str(), target)?;
                Ok(0)
            }
            EntryKind::File => {
                header.set_entry_type(EntryType::Regular);
                header.set_size(meta.size);
                let mut limited = CountingReader::new(Read::take(&mut *data, meta.size));
                self.builder
                    .append_data(&mut header, path.as_str(), &mut limited)?;
                check_size(path, meta.size, limited.count())?;
                Ok(meta.size)
            }
        }
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let gz = self.builder.into_inner()?;
        let mut sink = gz.finish()?;
        sink.flush()?;
        Ok(())
    }
}
