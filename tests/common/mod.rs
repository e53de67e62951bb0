//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};

use mutarc::{ArchivePath, EntryMeta, Format, StreamWriter};

/// Both supported container formats.
pub const FORMATS: [Format; 2] = [Format::TarGz, Format::Zip];

/// Fixed modification time used by fixtures (2020-09-13T12:26:41Z).
///
/// The odd second catches codecs that fall back to 2-second DOS time.
pub const FIXTURE_MTIME: u64 = 1_600_000_001;

/// The member list of [`write_fixture`], in stored order.
pub const FIXTURE_LISTING: [&str; 5] = ["dir/", "dir/bar", "dir/empty/", "hello", "readonly"];

/// Returns a container path with the extension matching `format`.
pub fn archive_path(dir: &Path, stem: &str, format: Format) -> PathBuf {
    dir.join(format!("{}.{}", stem, format.extension()))
}

/// Writes the standard five-entry fixture container and returns its path.
///
/// | Member | Content |
/// |--------|---------|
/// | `dir/` | directory |
/// | `dir/bar` | `"bar\n"` |
/// | `dir/empty/` | directory |
/// | `hello` | `"hello world\n"` |
/// | `readonly` | `"can't touch this\n"`, mode 0444 |
pub fn write_fixture(dir: &Path, format: Format) -> PathBuf {
    let path = archive_path(dir, "fixture", format);
    write_container(
        &path,
        format,
        &[
            ("dir/", EntryMeta::directory().with_mode(0o755), b""),
            ("dir/bar", EntryMeta::file(4).with_mode(0o644), b"bar\n"),
            ("dir/empty/", EntryMeta::directory().with_mode(0o755), b""),
            ("hello", EntryMeta::file(12).with_mode(0o644), b"hello world\n"),
            (
                "readonly",
                EntryMeta::file(17).with_mode(0o444),
                b"can't touch this\n",
            ),
        ],
    );
    path
}

/// Writes a container with the given members.
pub fn write_container(path: &Path, format: Format, members: &[(&str, EntryMeta, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut writer = StreamWriter::begin(format, file);
    for (name, meta, data) in members {
        let meta = meta.clone().with_modified(FIXTURE_MTIME);
        writer
            .write_entry(ArchivePath::new(name).unwrap(), &meta, data)
            .unwrap();
    }
    writer.end().unwrap();
}

/// Decodes a container's member names without going through a session.
pub fn member_names(path: &Path, format: Format) -> Vec<String> {
    format
        .codec()
        .decode_headers(path)
        .unwrap()
        .into_iter()
        .map(|(p, _)| p.to_string())
        .collect()
}

/// Reads one member's bytes.
pub fn member_bytes(path: &Path, format: Format, member: &str) -> Vec<u8> {
    let mut out = Vec::new();
    format
        .codec()
        .extract_one(path, &ArchivePath::new(member).unwrap(), &mut out)
        .unwrap();
    out
}

/// Creates a host tree used by `add_dir` tests:
///
/// ```text
/// testdata/
///   testdir/
///     a.txt       "alpha"
///     nested/
///       b.txt     "beta"
///     .DS_Store   "junk"
///   top.txt       "top"
/// ```
pub fn write_host_tree(dir: &Path) -> PathBuf {
    let root = dir.join("testdata");
    std::fs::create_dir_all(root.join("testdir/nested")).unwrap();
    std::fs::write(root.join("testdir/a.txt"), b"alpha").unwrap();
    std::fs::write(root.join("testdir/nested/b.txt"), b"beta").unwrap();
    std::fs::write(root.join("testdir/.DS_Store"), b"junk").unwrap();
    std::fs::write(root.join("top.txt"), b"top").unwrap();
    root
}

/// Collects every path below `root` as `/`-separated relative strings,
/// directories with a trailing `/`, sorted.
pub fn host_listing(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for entry in walkdir_like(root) {
        let relative = entry.strip_prefix(root).unwrap();
        let mut name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let meta = std::fs::symlink_metadata(&entry).unwrap();
        if meta.is_dir() {
            name.push('/');
        }
        out.push(name);
    }
    out.sort();
    out
}

fn walkdir_like(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            let meta = std::fs::symlink_metadata(&path).unwrap();
            if meta.is_dir() {
                stack.push(path.clone());
            }
            out.push(path);
        }
    }
    out
}
