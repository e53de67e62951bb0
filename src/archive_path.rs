//! Archive path type with normalization and validation.

use crate::{Error, Result};
use std::fmt;

/// Maximum length for archive paths (in bytes).
///
/// 32KB is well above any reasonable file system path limit
/// (Linux PATH_MAX is 4KB, Windows MAX_PATH is ~260).
const MAX_PATH_LENGTH: usize = 32768;

/// A normalized entry path inside a container.
///
/// `ArchivePath` converts backslashes to forward slashes, drops `.` segments
/// and validates that:
/// - No NUL bytes are present
/// - The path is not absolute (no leading `/`, no drive letter)
/// - No empty segments exist (no `a//b`)
/// - No `..` segments are present
///
/// Directory paths always end with `/`; file and symlink paths never do.
///
/// # Examples
///
/// ```
/// use mutarc::ArchivePath;
///
/// let dir = ArchivePath::directory("docs").unwrap();
/// assert_eq!(dir.as_str(), "docs/");
///
/// let file = ArchivePath::new("docs\\readme.txt").unwrap();
/// assert_eq!(file.as_str(), "docs/readme.txt");
/// assert_eq!(file.parent().unwrap(), dir);
///
/// assert!(ArchivePath::new("../secret").is_err());
/// assert!(ArchivePath::new("/absolute/path").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchivePath(String);

impl ArchivePath {
    /// Parses a path, treating a trailing `/` as a directory marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArchivePath`] if the path is empty, absolute,
    /// contains NUL bytes, empty segments or `..` segments.
    pub fn new(s: &str) -> Result<Self> {
        let s = s.replace('\\', "/");
        let is_dir = s.ends_with('/');
        Self::normalize(&s, is_dir)
    }

    /// Parses a directory path, appending a trailing `/` if missing.
    pub fn directory(s: &str) -> Result<Self> {
        Self::normalize(&s.replace('\\', "/"), true)
    }

    /// Parses a file or symlink path.
    ///
    /// A trailing `/` is rejected, since it would denote a directory.
    pub fn file(s: &str) -> Result<Self> {
        let s = s.replace('\\', "/");
        if s.ends_with('/') {
            return Err(Error::InvalidArchivePath(format!(
                "'{}' has a trailing slash but is not a directory",
                s
            )));
        }
        Self::normalize(&s, false)
    }

    /// Parses a path in the form required by an entry kind.
    pub fn for_kind(s: &str, is_dir: bool) -> Result<Self> {
        if is_dir {
            Self::directory(s)
        } else {
            Self::file(s)
        }
    }

    fn normalize(s: &str, is_dir: bool) -> Result<Self> {
        if s.contains('\0') {
            return Err(Error::InvalidArchivePath("contains NUL byte".into()));
        }
        if s.len() > MAX_PATH_LENGTH {
            return Err(Error::InvalidArchivePath(format!(
                "path exceeds maximum length of {} bytes",
                MAX_PATH_LENGTH
            )));
        }
        if s.starts_with('/') || has_drive_prefix(s) {
            return Err(Error::InvalidArchivePath(
                "absolute path not allowed".into(),
            ));
        }

        let body = s.strip_suffix('/').unwrap_or(s);
        let mut segments = Vec::new();
        for segment in body.split('/') {
            match segment {
                "." => continue,
                "" if body.is_empty() => continue,
                "" => {
                    return Err(Error::InvalidArchivePath(
                        "empty segment (consecutive slashes)".into(),
                    ));
                }
                ".." => {
                    return Err(Error::InvalidArchivePath(
                        "'..' segment not allowed (path traversal)".into(),
                    ));
                }
                _ => segments.push(segment),
            }
        }

        if segments.is_empty() {
            return Err(Error::InvalidArchivePath("empty path".into()));
        }

        let mut normalized = segments.join("/");
        if is_dir {
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    /// Returns the path as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is a directory path (ends with `/`).
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns the path without the directory marker.
    pub fn trimmed(&self) -> &str {
        self.0.strip_suffix('/').unwrap_or(&self.0)
    }

    /// Returns the file name (last segment) of this path, without any trailing `/`.
    pub fn file_name(&self) -> &str {
        let trimmed = self.trimmed();
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Returns the parent directory, if any.
    pub fn parent(&self) -> Option<Self> {
        let trimmed = self.trimmed();
        trimmed
            .rfind('/')
            .map(|idx| Self(trimmed[..=idx].to_string()))
    }

    /// Joins a child segment onto this path.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting path would be invalid.
    pub fn join(&self, child: &str, is_dir: bool) -> Result<Self> {
        Self::for_kind(&format!("{}/{}", self.trimmed(), child), is_dir)
    }

    /// Returns true if this is a directory that contains `other` at any depth.
    pub fn is_ancestor_of(&self, other: &ArchivePath) -> bool {
        self.is_dir() && other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }

    /// Moves this path from under `from` to under `to`.
    ///
    /// Returns `None` when `from` is neither this path nor one of its ancestors.
    pub fn rebase(&self, from: &ArchivePath, to: &ArchivePath) -> Option<Self> {
        if self == from {
            return Some(to.clone());
        }
        if !from.is_ancestor_of(self) {
            return None;
        }
        let rest = &self.0[from.0.len()..];
        Some(Self(format!("{}/{}", to.trimmed(), rest)))
    }
}

fn has_drive_prefix(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl AsRef<str> for ArchivePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for ArchivePath {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ArchivePath {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_valid_simple_file() {
        let path = ArchivePath::new("file.txt").unwrap();
        assert_eq!(path.as_str(), "file.txt");
        assert!(!path.is_dir());
    }

    #[test]
    fn test_valid_nested_path() {
        let path = ArchivePath::new("a/b/c/d.txt").unwrap();
        assert_eq!(path.as_str(), "a/b/c/d.txt");
    }

    #[test]
    fn test_valid_unicode() {
        let path = ArchivePath::new("日本語/файл.txt").unwrap();
        assert_eq!(path.as_str(), "日本語/файл.txt");
    }

    #[test]
    fn test_backslashes_normalized() {
        let path = ArchivePath::new("dir\\sub\\file.txt").unwrap();
        assert_eq!(path.as_str(), "dir/sub/file.txt");
    }

    #[test]
    fn test_dot_segments_dropped() {
        assert_eq!(ArchivePath::new("./file").unwrap().as_str(), "file");
        assert_eq!(ArchivePath::new("a/./b").unwrap().as_str(), "a/b");
        assert_eq!(ArchivePath::new("./dir/").unwrap().as_str(), "dir/");
    }

    #[test]
    fn test_trailing_slash_marks_directory() {
        let path = ArchivePath::new("dir/").unwrap();
        assert!(path.is_dir());
        assert_eq!(path.trimmed(), "dir");
    }

    #[test]
    fn test_directory_appends_slash() {
        assert_eq!(ArchivePath::directory("a/b").unwrap().as_str(), "a/b/");
        assert_eq!(ArchivePath::directory("a/b/").unwrap().as_str(), "a/b/");
    }

    #[test]
    fn test_file_rejects_trailing_slash() {
        let err = ArchivePath::file("dir/").unwrap_err();
        assert!(matches!(err, Error::InvalidArchivePath(_)));
    }

    #[test]
    fn test_invalid_empty() {
        assert!(matches!(
            ArchivePath::new("").unwrap_err(),
            Error::InvalidArchivePath(_)
        ));
        assert!(ArchivePath::new("./").is_err());
        assert!(ArchivePath::directory("").is_err());
    }

    #[test]
    fn test_invalid_nul_byte() {
        let err = ArchivePath::new("file\0.txt").unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn test_invalid_absolute_path() {
        let err = ArchivePath::new("/etc/passwd").unwrap_err();
        assert!(err.to_string().contains("absolute"));
        assert!(ArchivePath::new("C:\\Windows").is_err());
    }

    #[test]
    fn test_invalid_empty_segment() {
        let err = ArchivePath::new("a//b").unwrap_err();
        assert!(err.to_string().contains("empty segment"));
        assert!(ArchivePath::new("dir//").is_err());
    }

    #[test]
    fn test_invalid_dotdot_traversal() {
        let err = ArchivePath::new("../secret").unwrap_err();
        assert!(err.to_string().contains(".."));
        assert!(ArchivePath::new("a/../b").is_err());
    }

    #[test]
    fn test_invalid_too_long() {
        let long_path = "a".repeat(MAX_PATH_LENGTH + 1);
        let err = ArchivePath::new(&long_path).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(ArchivePath::new("dir/sub/file.txt").unwrap().file_name(), "file.txt");
        assert_eq!(ArchivePath::new("dir/sub/").unwrap().file_name(), "sub");
    }

    #[test]
    fn test_parent() {
        let path = ArchivePath::new("a/b/c").unwrap();
        assert_eq!(path.parent().unwrap().as_str(), "a/b/");

        let dir = ArchivePath::new("a/b/").unwrap();
        assert_eq!(dir.parent().unwrap().as_str(), "a/");

        assert!(ArchivePath::new("top/").unwrap().parent().is_none());
        assert!(ArchivePath::new("file.txt").unwrap().parent().is_none());
    }

    #[test]
    fn test_join() {
        let dir = ArchivePath::directory("dir").unwrap();
        assert_eq!(dir.join("file.txt", false).unwrap().as_str(), "dir/file.txt");
        assert_eq!(dir.join("sub", true).unwrap().as_str(), "dir/sub/");
        assert!(dir.join("..", false).is_err());
    }

    #[test]
    fn test_is_ancestor_of() {
        let dir = ArchivePath::new("a/").unwrap();
        assert!(dir.is_ancestor_of(&ArchivePath::new("a/b/c").unwrap()));
        assert!(!dir.is_ancestor_of(&dir));
        assert!(!dir.is_ancestor_of(&ArchivePath::new("ab/c").unwrap()));

        let file = ArchivePath::new("a").unwrap();
        assert!(!file.is_ancestor_of(&ArchivePath::new("a/b").unwrap()));
    }

    #[test]
    fn test_rebase() {
        let from = ArchivePath::new("old/").unwrap();
        let to = ArchivePath::new("new/deep/").unwrap();

        let child = ArchivePath::new("old/sub/file.txt").unwrap();
        assert_eq!(
            child.rebase(&from, &to).unwrap().as_str(),
            "new/deep/sub/file.txt"
        );
        assert_eq!(from.rebase(&from, &to).unwrap(), to);
        assert!(
            ArchivePath::new("other.txt")
                .unwrap()
                .rebase(&from, &to)
                .is_none()
        );
    }

    #[test]
    fn test_hash_consistency() {
        let path1 = ArchivePath::new("dir/file.txt").unwrap();
        let path2 = ArchivePath::new("dir\\file.txt").unwrap();

        let mut set = HashSet::new();
        set.insert(path1.clone());

        assert!(set.contains(&path2));
        assert_eq!(path1, path2);
    }

    #[test]
    fn test_display_and_try_from() {
        let path: ArchivePath = "dir/file.txt".try_into().unwrap();
        assert_eq!(format!("{}", path), "dir/file.txt");

        let owned: ArchivePath = String::from("dir/").try_into().unwrap();
        assert!(owned.is_dir());
    }

    #[test]
    fn test_valid_dotfile_and_dots_in_name() {
        assert_eq!(ArchivePath::new(".gitignore").unwrap().as_str(), ".gitignore");
        assert_eq!(ArchivePath::new("file..txt").unwrap().as_str(), "file..txt");
        assert_eq!(ArchivePath::new("...").unwrap().as_str(), "...");
    }
}
