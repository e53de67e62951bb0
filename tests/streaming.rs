//! Integration tests for the forward-only stream writer.

mod common;

use std::fs::File;
use std::io::Cursor;

use mutarc::{ArchivePath, ArchiveSession, EntryMeta, Error, Format, StreamWriter};

use common::{FORMATS, archive_path, member_bytes, member_names};

#[test]
fn test_stream_output_opens_as_session() {
    for format in FORMATS {
        let dir = tempfile::tempdir().unwrap();
        let path = archive_path(dir.path(), "stream", format);

        let mut writer = StreamWriter::begin(format, File::create(&path).unwrap());
        assert_eq!(writer.format(), format);
        writer
            .write_entry(ArchivePath::new("a/").unwrap(), &EntryMeta::directory(), &[])
            .unwrap();
        writer
            .write_entry(ArchivePath::new("a/one.txt").unwrap(), &EntryMeta::file(3), b"one")
            .unwrap();
        writer
            .write_entry_from_reader(
                ArchivePath::new("a/two.txt").unwrap(),
                &EntryMeta::file(3),
                Cursor::new(b"two".to_vec()),
            )
            .unwrap();
        let result = writer.end().unwrap();
        assert_eq!(result.entries_written, 3);
        assert_eq!(result.bytes, 6);

        let session = ArchiveSession::open_read_only(&path).unwrap();
        assert_eq!(session.list(), ["a/", "a/one.txt", "a/two.txt"]);
        assert_eq!(member_bytes(&path, format, "a/two.txt"), b"two");
    }
}

#[test]
fn test_tar_gz_stream_to_plain_writer() {
    let dir = tempfile::tempdir().unwrap();
    let mut out = Vec::new();
    let mut writer = StreamWriter::tar_gz_with_level(&mut out, 9);
    writer
        .write_entry(ArchivePath::new("big.txt").unwrap(), &EntryMeta::file(10_000), &[b'a'; 10_000])
        .unwrap();
    writer.end().unwrap();
    assert!(out.len() < 1_000);

    let path = dir.path().join("plain.tar.gz");
    std::fs::write(&path, &out).unwrap();
    assert_eq!(member_names(&path, Format::TarGz), ["big.txt"]);
}

#[test]
fn test_zip_stream_stored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stored.zip");
    let mut writer = StreamWriter::zip_with_level(File::create(&path).unwrap(), 0);
    writer
        .write_entry(ArchivePath::new("x").unwrap(), &EntryMeta::file(1), b"x")
        .unwrap();
    writer.end().unwrap();
    assert_eq!(member_bytes(&path, Format::Zip, "x"), b"x");
}

#[test]
fn test_write_path_host_entries() {
    for format in FORMATS {
        let dir = tempfile::tempdir().unwrap();
        let host_dir = dir.path().join("assets");
        std::fs::create_dir(&host_dir).unwrap();
        std::fs::write(host_dir.join("logo.svg"), b"<svg/>").unwrap();
        let path = archive_path(dir.path(), "paths", format);

        let mut writer = StreamWriter::begin(format, File::create(&path).unwrap());
        writer
            .write_path(ArchivePath::new("assets").unwrap(), &host_dir)
            .unwrap();
        writer
            .write_path(ArchivePath::new("assets/logo.svg").unwrap(), host_dir.join("logo.svg"))
            .unwrap();
        let result = writer.end().unwrap();
        assert_eq!(result.directories, 1);

        assert_eq!(member_names(&path, format), ["assets/", "assets/logo.svg"]);
    }
}

#[test]
fn test_reader_shorter_than_declared() {
    let mut out = Vec::new();
    let mut writer = StreamWriter::tar_gz(&mut out);
    let err = writer
        .write_entry_from_reader(
            ArchivePath::new("short").unwrap(),
            &EntryMeta::file(100),
            &b"only a few"[..],
        )
        .unwrap_err();
    match err {
        Error::SizeMismatch {
            path,
            expected,
            actual,
        } => {
            assert_eq!(path, "short");
            assert_eq!(expected, 100);
            assert_eq!(actual, 10);
        }
        e => panic!("Expected SizeMismatch, got: {:?}", e),
    }
}

#[test]
fn test_write_path_missing_host() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = StreamWriter::zip(Cursor::new(Vec::new()));
    let err = writer
        .write_path(ArchivePath::new("x").unwrap(), dir.path().join("missing"))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
