//! Container codecs.
//!
//! A [`Codec`] knows how to decode the member headers of one container
//! format, stream member bytes out in a single forward pass, and build an
//! [`EntryEncoder`] that writes members into a new container. Two variants
//! exist, [`TarGz`] and [`Zip`]; an archive session picks one when it is
//! constructed and never branches on the format afterwards.

mod tar_gz;
mod zip_archive;

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::ops::ControlFlow;
use std::path::Path;

use crate::entry::EntryMeta;
use crate::{ArchivePath, Error, Result};

pub use tar_gz::{TarGz, TarGzEncoder};
pub use zip_archive::{Zip, ZipEncoder};

/// Default compression level (0-9).
pub const DEFAULT_LEVEL: u32 = 6;

/// Longest container comment in bytes (the zip comment length field is 16 bits).
pub const MAX_COMMENT_LEN: usize = u16::MAX as usize;

static TAR_GZ: TarGz = TarGz;
static ZIP: Zip = Zip;

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// A tar stream wrapped in gzip (`.tar.gz`, `.tgz`).
    TarGz,
    /// A zip file (`.zip`).
    Zip,
}

impl Format {
    /// Infers the format from a file name extension.
    ///
    /// ```
    /// use mutarc::codec::Format;
    ///
    /// assert_eq!(Format::from_path("backup.TGZ"), Some(Format::TarGz));
    /// assert_eq!(Format::from_path("dist/app.zip"), Some(Format::Zip));
    /// assert_eq!(Format::from_path("notes.txt"), None);
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let name = path.as_ref().file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Recognizes a format from the first bytes of a container.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        match header {
            [0x1f, 0x8b, ..] => Some(Self::TarGz),
            [b'P', b'K', 3, 4, ..] | [b'P', b'K', 5, 6, ..] | [b'P', b'K', 7, 8, ..] => {
                Some(Self::Zip)
            }
            _ => None,
        }
    }

    /// Reads the first bytes of a host file and recognizes its format.
    pub fn detect(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| Error::from_io_at(e, path))?;
        let mut header = [0u8; 4];
        let mut filled = 0;
        while filled < header.len() {
            match file.read(&mut header[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(Self::sniff(&header[..filled]))
    }

    /// Returns the codec implementing this format.
    pub fn codec(self) -> &'static dyn Codec {
        match self {
            Self::TarGz => &TAR_GZ,
            Self::Zip => &ZIP,
        }
    }

    /// Returns the canonical file extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TarGz => write!(f, "tar.gz"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

/// An output sink that supports seeking (required by zip).
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// Callback invoked for each member during [`Codec::read_members`].
///
/// The reader yields the member's bytes; it may be left unread.
pub type MemberVisitor<'v> =
    dyn FnMut(&ArchivePath, &EntryMeta, &mut dyn Read) -> Result<ControlFlow<()>> + 'v;

/// Writes members into a container being built.
pub trait EntryEncoder {
    /// Appends one member.
    ///
    /// For regular files exactly `meta.size` bytes are read from `data`;
    /// directories and symlinks ignore it. Returns the number of content
    /// bytes written.
    fn append(&mut self, path: &ArchivePath, meta: &EntryMeta, data: &mut dyn Read) -> Result<u64>;

    /// Finalizes every format layer (container footer, then compression trailer).
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Decoding and encoding capability set of one container format.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Returns the format this codec implements.
    fn format(&self) -> Format;

    /// Walks every member of `container` in stored order, in one forward pass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the container is missing and
    /// [`Error::InvalidFormat`] if it cannot be decoded. Errors returned by
    /// `visit` are propagated unchanged.
    fn read_members(&self, container: &Path, visit: &mut MemberVisitor<'_>) -> Result<()>;

    /// Reads the container comment, if one is stored.
    ///
    /// For zip this is the archive comment; for tar.gz the gzip header comment.
    fn read_comment(&self, container: &Path) -> Result<Option<String>>;

    /// Creates an encoder writing a new container into `sink`.
    fn encoder<'a>(
        &self,
        sink: Box<dyn WriteSeek + 'a>,
        level: u32,
        comment: Option<&str>,
    ) -> Box<dyn EntryEncoder + 'a>;

    /// Decodes the header of every member.
    fn decode_headers(&self, container: &Path) -> Result<Vec<(ArchivePath, EntryMeta)>> {
        let mut headers = Vec::new();
        self.read_members(container, &mut |path, meta, _| {
            headers.push((path.clone(), meta.clone()));
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(headers)
    }

    /// Copies the bytes of a single member into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no member has that path.
    fn extract_one(&self, container: &Path, path: &ArchivePath, out: &mut dyn Write) -> Result<u64> {
        let mut copied = None;
        self.read_members(container, &mut |member, _, data| {
            if member != path {
                return Ok(ControlFlow::Continue(()));
            }
            copied = Some(crate::fs::copy_chunked(data, &mut *out)?);
            Ok(ControlFlow::Break(()))
        })?;
        copied.ok_or_else(|| Error::EntryNotFound {
            path: path.to_string(),
        })
    }

    /// Writes a container with no members.
    fn write_empty(&self, sink: Box<dyn WriteSeek + '_>) -> Result<()> {
        self.encoder(sink, DEFAULT_LEVEL, None).finish()
    }
}

/// Reader adapter that counts the bytes it yields.
pub(crate) struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Checks that a file member received exactly the declared number of bytes.
pub(crate) fn check_size(path: &ArchivePath, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(Error::SizeMismatch {
            path: path.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build(format: Format, members: &[(&str, EntryMeta, &[u8])]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = format
                .codec()
                .encoder(Box::new(Cursor::new(&mut bytes)), DEFAULT_LEVEL, None);
            for (path, meta, data) in members {
                let path = ArchivePath::new(path).unwrap();
                encoder.append(&path, meta, &mut &data[..]).unwrap();
            }
            encoder.finish().unwrap();
        }
        bytes
    }

    fn write_container(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(Format::from_path("a.tar.gz"), Some(Format::TarGz));
        assert_eq!(Format::from_path("a.tgz"), Some(Format::TarGz));
        assert_eq!(Format::from_path("A.ZIP"), Some(Format::Zip));
        assert_eq!(Format::from_path("a.tar"), None);
        assert_eq!(Format::from_path(""), None);
    }

    #[test]
    fn test_format_sniff() {
        assert_eq!(Format::sniff(&[0x1f, 0x8b, 8, 0]), Some(Format::TarGz));
        assert_eq!(Format::sniff(b"PK\x03\x04"), Some(Format::Zip));
        assert_eq!(Format::sniff(b"PK\x05\x06"), Some(Format::Zip));
        assert_eq!(Format::sniff(b"7z\xbc\xaf"), None);
        assert_eq!(Format::sniff(&[]), None);
    }

    #[test]
    fn test_detect_reads_magic() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = build(Format::Zip, &[]);
        let path = write_container(dir.path(), "archive.bin", &bytes);
        assert_eq!(Format::detect(&path).unwrap(), Some(Format::Zip));

        let text = write_container(dir.path(), "notes.txt", b"hi");
        assert_eq!(Format::detect(&text).unwrap(), None);
    }

    #[test]
    fn test_headers_round_trip_both_formats() {
        for format in [Format::TarGz, Format::Zip] {
            let dir = tempfile::tempdir().unwrap();
            let bytes = build(
                format,
                &[
                    (
                        "docs/",
                        EntryMeta::directory().with_mode(0o750).with_modified(1_600_000_003),
                        b"",
                    ),
                    (
                        "docs/readme.txt",
                        EntryMeta::file(5).with_mode(0o640).with_modified(1_600_000_001),
                        b"hello",
                    ),
                    ("docs/link", EntryMeta::symlink("readme.txt"), b""),
                ],
            );
            let path = write_container(dir.path(), &format!("c.{}", format.extension()), &bytes);

            let headers = format.codec().decode_headers(&path).unwrap();
            let names: Vec<_> = headers.iter().map(|(p, _)| p.as_str()).collect();
            assert_eq!(names, ["docs/", "docs/readme.txt", "docs/link"], "{}", format);

            let (_, dir_meta) = &headers[0];
            assert!(dir_meta.is_dir());
            assert_eq!(dir_meta.mode, 0o750);
            assert_eq!(dir_meta.modified, 1_600_000_003);

            let (_, file_meta) = &headers[1];
            assert_eq!(file_meta.size, 5);
            assert_eq!(file_meta.mode, 0o640);
            assert_eq!(file_meta.modified, 1_600_000_001);

            let (_, link_meta) = &headers[2];
            assert!(link_meta.is_symlink());
            assert_eq!(link_meta.link_target.as_deref(), Some("readme.txt"));
        }
    }

    #[test]
    fn test_extract_one() {
        for format in [Format::TarGz, Format::Zip] {
            let dir = tempfile::tempdir().unwrap();
            let bytes = build(
                format,
                &[
                    ("a.txt", EntryMeta::file(3), b"aaa"),
                    ("b.txt", EntryMeta::file(4), b"bbbb"),
                ],
            );
            let path = write_container(dir.path(), "c", &bytes);

            let mut out = Vec::new();
            let target = ArchivePath::new("b.txt").unwrap();
            let n = format.codec().extract_one(&path, &target, &mut out).unwrap();
            assert_eq!(n, 4);
            assert_eq!(out, b"bbbb");

            let missing = ArchivePath::new("c.txt").unwrap();
            let err = format
                .codec()
                .extract_one(&path, &missing, &mut Vec::new())
                .unwrap_err();
            assert!(matches!(err, Error::EntryNotFound { .. }));
        }
    }

    #[test]
    fn test_empty_container_decodes() {
        for format in [Format::TarGz, Format::Zip] {
            let dir = tempfile::tempdir().unwrap();
            let mut bytes = Vec::new();
            format
                .codec()
                .write_empty(Box::new(Cursor::new(&mut bytes)))
                .unwrap();
            let path = write_container(dir.path(), "empty", &bytes);
            assert!(format.codec().decode_headers(&path).unwrap().is_empty());
        }
    }

    #[test]
    fn test_comment_round_trip() {
        for format in [Format::TarGz, Format::Zip] {
            let dir = tempfile::tempdir().unwrap();
            let mut bytes = Vec::new();
            {
                let mut encoder = format.codec().encoder(
                    Box::new(Cursor::new(&mut bytes)),
                    DEFAULT_LEVEL,
                    Some("nightly build"),
                );
                let path = ArchivePath::new("a.txt").unwrap();
                encoder.append(&path, &EntryMeta::file(1), &mut &b"a"[..]).unwrap();
                encoder.finish().unwrap();
            }
            let path = write_container(dir.path(), "c", &bytes);
            assert_eq!(
                format.codec().read_comment(&path).unwrap().as_deref(),
                Some("nightly build"),
                "{}",
                format
            );

            let plain = write_container(dir.path(), "plain", &build(format, &[]));
            assert_eq!(format.codec().read_comment(&plain).unwrap(), None);
        }
    }

    #[test]
    fn test_garbage_is_format_error() {
        for format in [Format::TarGz, Format::Zip] {
            let dir = tempfile::tempdir().unwrap();
            let path = write_container(dir.path(), "junk", b"this is not a container at all");
            let err = format.codec().decode_headers(&path).unwrap_err();
            assert!(err.is_format_error(), "{}: {:?}", format, err);
        }
    }

    #[test]
    fn test_truncated_tar_gz_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![7u8; 64 * 1024];
        let bytes = build(Format::TarGz, &[("big.bin", EntryMeta::file(data.len() as u64), &data)]);
        let path = write_container(dir.path(), "cut.tar.gz", &bytes[..bytes.len() / 2]);
        let err = TarGz.decode_headers(&path).unwrap_err();
        assert!(err.is_format_error(), "{:?}", err);
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Zip.decode_headers(&dir.path().join("nope.zip")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_size_mismatch_reported() {
        for format in [Format::TarGz, Format::Zip] {
            let mut bytes = Vec::new();
            let mut encoder = format
                .codec()
                .encoder(Box::new(Cursor::new(&mut bytes)), DEFAULT_LEVEL, None);
            let path = ArchivePath::new("short.txt").unwrap();
            let err = encoder
                .append(&path, &EntryMeta::file(10), &mut &b"abc"[..])
                .unwrap_err();
            assert!(matches!(err, Error::SizeMismatch { expected: 10, actual: 3, .. }));
        }
    }
}
