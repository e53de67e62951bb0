//! Fuzz target for ArchivePath::new with arbitrary string input.
//!
//! Run with: cargo +nightly fuzz run archive_path
//!
//! Properties checked on every accepted path:
//! - no `..` or `.` segment and no empty segment
//! - not absolute, no backslash, no NUL byte
//! - normalizing again yields the same path

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = mutarc::ArchivePath::new(raw) else {
        return;
    };
    let normalized = path.as_str();

    assert!(!normalized.starts_with('/'), "absolute path accepted: {:?}", normalized);
    assert!(!normalized.contains('\\'), "backslash kept: {:?}", normalized);
    assert!(!normalized.contains('\0'), "NUL byte kept: {:?}", normalized);
    for segment in path.trimmed().split('/') {
        assert!(
            !segment.is_empty() && segment != "." && segment != "..",
            "bad segment {:?} in {:?}",
            segment,
            normalized
        );
    }

    let again = mutarc::ArchivePath::new(normalized).expect("normalized path must re-parse");
    assert_eq!(again, path);

    if let Some(parent) = path.parent() {
        assert!(parent.is_ancestor_of(&path));
    }
});
