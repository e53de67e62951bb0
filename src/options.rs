//! Session configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::{DEFAULT_LEVEL, Format};
use crate::{Error, Result};

/// How an archive session is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Inspect and extract only; mutations and flush fail with [`Error::ReadOnly`].
    ReadOnly,
    /// Edit an existing container.
    #[default]
    ReadWrite,
    /// Edit the container, creating an empty one if it does not exist.
    ReadWriteCreate,
    /// Replace any existing container with an empty one, then edit it.
    ReadWriteTruncate,
}

impl OpenMode {
    /// Returns true if the mode permits mutations and flush.
    pub fn is_writable(self) -> bool {
        self != Self::ReadOnly
    }
}

/// Predicate deciding whether a host path is skipped when adding or packing.
pub type ExclusionFilter = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// File names skipped by [`default_exclusion`].
pub const DEFAULT_EXCLUDED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

/// Skips desktop metadata files such as `.DS_Store`.
///
/// ```
/// use std::path::Path;
/// use mutarc::default_exclusion;
///
/// assert!(default_exclusion(Path::new("photos/.DS_Store")));
/// assert!(!default_exclusion(Path::new("photos/cat.jpg")));
/// ```
pub fn default_exclusion(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| DEFAULT_EXCLUDED_NAMES.contains(&name))
}

/// Options for opening, creating and flushing an archive session.
///
/// # Example
///
/// ```rust
/// use mutarc::{Format, SessionOptions};
///
/// let options = SessionOptions::new()
///     .format(Format::Zip)
///     .level(9)?
///     .exclude(|path| path.extension().is_some_and(|ext| ext == "tmp"))
///     .atomic_flush(true);
/// assert_eq!(options.compression_level(), 9);
/// # Ok::<(), mutarc::Error>(())
/// ```
#[derive(Clone)]
pub struct SessionOptions {
    pub(crate) format: Option<Format>,
    pub(crate) level: u32,
    pub(crate) exclude: Option<ExclusionFilter>,
    pub(crate) scratch_dir: Option<PathBuf>,
    pub(crate) atomic_flush: bool,
    pub(crate) preserve_metadata: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            format: None,
            level: DEFAULT_LEVEL,
            exclude: Some(Arc::new(default_exclusion)),
            scratch_dir: None,
            atomic_flush: true,
            preserve_metadata: true,
        }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("exclude", &self.exclude.as_ref().map(|_| "<filter>"))
            .field("scratch_dir", &self.scratch_dir)
            .field("atomic_flush", &self.atomic_flush)
            .field("preserve_metadata", &self.preserve_metadata)
            .finish()
    }
}

impl SessionOptions {
    /// Creates options with defaults: inferred format, level 6, the default
    /// exclusion filter, atomic flush and metadata preservation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the container format instead of inferring it.
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets the compression level (0-9).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] if level is greater than 9.
    pub fn level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel { level });
        }
        self.level = level;
        Ok(self)
    }

    /// Sets the compression level, clamping values above 9.
    pub fn level_clamped(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Replaces the exclusion filter.
    ///
    /// The filter sees every host path visited by `add_file`, `add_dir` and
    /// `pack_to`; returning `true` skips the path (and, for directories, the
    /// whole subtree).
    pub fn exclude<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Path) -> bool + Send + Sync + 'static,
    {
        self.exclude = Some(Arc::new(filter));
        self
    }

    /// Disables path exclusion entirely.
    pub fn no_exclusion(mut self) -> Self {
        self.exclude = None;
        self
    }

    /// Sets the directory under which flush scratch directories are created.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Chooses between atomic (temp file + rename) and in-place flush.
    pub fn atomic_flush(mut self, atomic: bool) -> Self {
        self.atomic_flush = atomic;
        self
    }

    /// Chooses whether extraction applies stored permissions and mtimes.
    pub fn preserve_metadata(mut self, preserve: bool) -> Self {
        self.preserve_metadata = preserve;
        self
    }

    /// Returns the forced format, if any.
    pub fn forced_format(&self) -> Option<Format> {
        self.format
    }

    /// Returns the compression level.
    pub fn compression_level(&self) -> u32 {
        self.level
    }

    /// Returns true if `path` is skipped by the exclusion filter.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude.as_ref().is_some_and(|filter| filter(path))
    }

    pub(crate) fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
