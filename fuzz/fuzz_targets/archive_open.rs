//! Fuzz target for opening arbitrary bytes as a container.
//!
//! Run with: cargo +nightly fuzz run archive_open
//!
//! The bytes are written to a temporary file and opened as both tar.gz and
//! zip. Decoding must fail with an error, never panic; when it succeeds,
//! extracting every entry must not panic either.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mutarc::{ArchiveSession, Format, OpenMode, SessionOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let path = dir.path().join("input");
    if std::fs::write(&path, data).is_err() {
        return;
    }

    for format in [Format::TarGz, Format::Zip] {
        let options = SessionOptions::new().format(format);
        let Ok(session) = ArchiveSession::open_with(&path, OpenMode::ReadOnly, options) else {
            continue;
        };
        for entry in session.entries() {
            assert!(!entry.path.as_str().starts_with('/'));
        }
        let _ = session.extract_to(dir.path().join(format.extension()), &[] as &[&str]);
    }
});
