//! Zip containers.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::Path;

use ::zip::result::ZipError;
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};
use time::OffsetDateTime;

use super::{
    Codec, CountingReader, EntryEncoder, Format, MAX_COMMENT_LEN, MemberVisitor, WriteSeek,
    check_size,
};
use crate::entry::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, DEFAULT_LINK_MODE, EntryKind, EntryMeta};
use crate::{ArchivePath, Error, Result};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Info-ZIP extended timestamp ("UT") extra field.
const EXTENDED_TIMESTAMP: u16 = 0x5455;

/// Codec for `.zip` containers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip;

impl Codec for Zip {
    fn format(&self) -> Format {
        Format::Zip
    }

    fn read_members(&self, container: &Path, visit: &mut MemberVisitor<'_>) -> Result<()> {
        let file = File::open(container).map_err(|e| Error::from_io_at(e, container))?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;

        for index in 0..archive.len() {
            let mut member = archive.by_index(index).map_err(zip_error)?;
            let raw = member.name().to_string();
            // Directories are recognized by a trailing `/` or by their mode bits.
            let kind = match member.unix_mode().map(|mode| mode & S_IFMT) {
                _ if member.is_dir() => EntryKind::Directory,
                Some(S_IFDIR) => EntryKind::Directory,
                Some(S_IFLNK) => EntryKind::Symlink,
                _ => EntryKind::File,
            };

            let path = ArchivePath::for_kind(&raw, kind == EntryKind::Directory)
                .map_err(|e| Error::format(format!("zip member '{}': {}", raw, e)))?;
            let default_mode = match kind {
                EntryKind::File => DEFAULT_FILE_MODE,
                EntryKind::Directory => DEFAULT_DIR_MODE,
                EntryKind::Symlink => DEFAULT_LINK_MODE,
            };
            let modified = extended_mtime(member.extra_data()).unwrap_or_else(|| {
                member
                    .last_modified()
                    .to_time()
                    .map(|t| t.unix_timestamp().max(0) as u64)
                    .unwrap_or(0)
            });
            let mode = member.unix_mode().map_or(default_mode, |m| m & 0o7777);

            let flow = if kind == EntryKind::Symlink {
                let mut target = String::new();
                member.read_to_string(&mut target).map_err(Error::format)?;
                let meta = EntryMeta {
                    kind,
                    size: 0,
                    mode,
                    modified,
                    link_target: Some(target),
                };
                visit(&path, &meta, &mut io::empty())?
            } else {
                let meta = EntryMeta {
                    kind,
                    size: if kind == EntryKind::File { member.size() } else { 0 },
                    mode,
                    modified,
                    link_target: None,
                };
                visit(&path, &meta, &mut member)?
            };
            if flow.is_break() {
                break;
            }
        }
        Ok(())
    }

    fn read_comment(&self, container: &Path) -> Result<Option<String>> {
        let file = File::open(container).map_err(|e| Error::from_io_at(e, container))?;
        let archive = ZipArchive::new(BufReader::new(file)).map_err(zip_error)?;
        let comment = archive.comment();
        Ok((!comment.is_empty()).then(|| String::from_utf8_lossy(comment).into_owned()))
    }

    fn encoder<'a>(
        &self,
        sink: Box<dyn WriteSeek + 'a>,
        level: u32,
        comment: Option<&str>,
    ) -> Box<dyn EntryEncoder + 'a> {
        let encoder = ZipEncoder::new(sink, level);
        Box::new(match comment {
            Some(comment) => encoder.with_comment(comment),
            None => encoder,
        })
    }
}

fn zip_error(err: ZipError) -> Error {
    match err {
        ZipError::Io(e) if e.kind() != io::ErrorKind::UnexpectedEof => Error::Io(e),
        other => Error::format(other),
    }
}

/// Reads the modification time from an extended timestamp field.
fn extended_mtime(mut extra: &[u8]) -> Option<u64> {
    while extra.len() >= 4 {
        let id = u16::from_le_bytes([extra[0], extra[1]]);
        let len = usize::from(u16::from_le_bytes([extra[2], extra[3]]));
        let body = extra.get(4..4 + len)?;
        if id == EXTENDED_TIMESTAMP {
            // Flag bit 0 marks a modification time, stored first.
            return match body {
                [flags, a, b, c, d, ..] if flags & 1 != 0 => {
                    u64::try_from(i32::from_le_bytes([*a, *b, *c, *d])).ok()
                }
                _ => None,
            };
        }
        extra = &extra[4 + len..];
    }
    None
}

/// Encodes an extended timestamp field carrying only the modification time.
fn extended_timestamp(modified: u64) -> Option<[u8; 9]> {
    let secs = i32::try_from(modified).ok()?;
    let mut field = [0u8; 9];
    field[..2].copy_from_slice(&EXTENDED_TIMESTAMP.to_le_bytes());
    field[2..4].copy_from_slice(&5u16.to_le_bytes());
    field[4] = 1;
    field[5..].copy_from_slice(&secs.to_le_bytes());
    Some(field)
}

fn dos_time(modified: u64) -> Option<DateTime> {
    let secs = i64::try_from(modified).ok()?;
    let time = OffsetDateTime::from_unix_timestamp(secs).ok()?;
    DateTime::try_from(time).ok()
}

/// Writes members into a zip container.
pub struct ZipEncoder<W: Write + Seek> {
    writer: ZipWriter<W>,
    level: u32,
}

impl<W: Write + Seek> ZipEncoder<W> {
    /// Creates an encoder at compression `level` (0 stores, 1-9 deflates).
    pub fn new(sink: W, level: u32) -> Self {
        Self {
            writer: ZipWriter::new(sink),
            level: level.min(9),
        }
    }

    /// Sets the archive comment written into the end of central directory.
    ///
    /// Comments longer than the format allows are cut at a character boundary.
    pub fn with_comment(mut self, comment: &str) -> Self {
        let mut end = comment.len().min(MAX_COMMENT_LEN);
        while !comment.is_char_boundary(end) {
            end -= 1;
        }
        self.writer.set_comment(&comment[..end]);
        self
    }

    fn options(&self, meta: &EntryMeta) -> FileOptions {
        let options = if self.level == 0 {
            FileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(self.level as i32))
        };
        let options = options
            .unix_permissions(meta.mode & 0o777)
            .large_file(meta.size >= u32::MAX as u64);
        match dos_time(meta.modified) {
            Some(time) => options.last_modified_time(time),
            None => options,
        }
    }

    /// Starts a member whose header carries an extended timestamp next to the DOS time.
    fn start_member(&mut self, name: &str, meta: &EntryMeta, options: FileOptions) -> Result<()> {
        match extended_timestamp(meta.modified) {
            Some(field) => {
                self.writer
                    .start_file_with_extra_data(name, options)
                    .map_err(zip_error)?;
                self.writer.write_all(&field)?;
                self.writer.end_extra_data().map_err(zip_error)?;
            }
            None => self.writer.start_file(name, options).map_err(zip_error)?,
        }
        Ok(())
    }
}

impl<W: Write + Seek> fmt::Debug for ZipEncoder<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipEncoder")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl<W: Write + Seek> EntryEncoder for ZipEncoder<W> {
    fn append(&mut self, path: &ArchivePath, meta: &EntryMeta, data: &mut dyn Read) -> Result<u64> {
        let options = self.options(meta);
        match meta.kind {
            EntryKind::Directory if extended_timestamp(meta.modified).is_none() => {
                self.writer
                    .add_directory(path.as_str(), options)
                    .map_err(zip_error)?;
                Ok(0)
            }
            EntryKind::Directory => {
                // Started like a file so the header can carry the extended
                // timestamp; the trailing `/` marks the member as a directory.
                let options = options
                    .compression_method(CompressionMethod::Stored)
                    .compression_level(None);
                self.start_member(path.as_str(), meta, options)?;
                Ok(0)
            }
            EntryKind::Symlink => {
                let target = meta.link_target.as_deref().unwrap_or_default();
                self.writer
                    .add_symlink(path.as_str(), target, options)
                    .map_err(zip_error)?;
                Ok(0)
            }
            EntryKind::File => {
                self.start_member(path.as_str(), meta, options)?;
                let mut limited = CountingReader::new(Read::take(&mut *data, meta.size));
                crate::fs::copy_chunked(&mut limited, &mut self.writer)?;
                check_size(path, meta.size, limited.count())?;
                Ok(meta.size)
            }
        }
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        let mut sink = self.writer.finish().map_err(zip_error)?;
        sink.flush()?;
        Ok(())
    }
}
