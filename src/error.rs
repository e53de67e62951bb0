//! Error types for archive session operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when opening, editing, flushing or extracting containers,
//! along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! Every mutating or I/O-bound operation is fallible. Operations surface the
//! first error they hit and never retry. After an error the session's entry
//! list may be partially updated (a failed [`add_dir`] can leave some children
//! added); deciding whether to retry, roll back or abandon the session is up
//! to the caller.
//!
//! ```rust,no_run
//! use mutarc::{ArchiveSession, Error};
//!
//! fn open_or_report(path: &str) -> mutarc::Result<ArchiveSession> {
//!     match ArchiveSession::open(path) {
//!         Ok(session) => Ok(session),
//!         Err(Error::NotFound { path }) => {
//!             eprintln!("No archive at {}", path.display());
//!             Err(Error::NotFound { path })
//!         }
//!         Err(Error::InvalidFormat(msg)) => {
//!             eprintln!("Not a tar.gz or zip container: {}", msg);
//!             Err(Error::InvalidFormat(msg))
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```
//!
//! [`add_dir`]: crate::ArchiveSession::add_dir

use std::io;
use std::path::PathBuf;

/// The main error type for archive session operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io], [`NotFound`][Self::NotFound] | File system operations |
/// | Format | [`InvalidFormat`][Self::InvalidFormat], [`UnknownFormat`][Self::UnknownFormat] | Undecodable containers |
/// | Lookup | [`IndexOutOfRange`][Self::IndexOutOfRange], [`EntryNotFound`][Self::EntryNotFound], [`EntryExists`][Self::EntryExists] | Bad entry references |
/// | State | [`ReadOnly`][Self::ReadOnly], [`WriterFinished`][Self::WriterFinished] | Session misuse |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading, writing or copying.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A host path (container on open, or an add source) does not exist.
    ///
    /// Also returned by [`add_dir`](crate::ArchiveSession::add_dir) when the
    /// source is not a readable directory.
    #[error("Path not found: {}", path.display())]
    NotFound {
        /// The missing host path.
        path: PathBuf,
    },

    /// The container could not be decoded.
    ///
    /// Returned for wrong magic bytes, truncated streams, and failures of
    /// either the compression layer or the container layer.
    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    /// The container format could not be inferred for a path that is being created.
    #[error("Cannot infer container format from {}", path.display())]
    UnknownFormat {
        /// The path whose extension was not recognized.
        path: PathBuf,
    },

    /// An entry index is outside the current entry list.
    #[error("Index {index} out of range for {len} entries")]
    IndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of entries in the session.
        len: usize,
    },

    /// No entry has the requested path.
    #[error("Entry not found: {path}")]
    EntryNotFound {
        /// The path that was not found.
        path: String,
    },

    /// An entry already exists at a rename target.
    #[error("Entry already exists: {path}")]
    EntryExists {
        /// The path that already exists.
        path: String,
    },

    /// The archive path is invalid (absolute, traversal, empty segment, ...).
    #[error("Invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// A mutation or flush was attempted on a read-only session.
    #[error("Archive session is read-only")]
    ReadOnly,

    /// A writer-backed session was flushed again after its sink was finalized.
    #[error("Output sink was already finalized")]
    WriterFinished,

    /// An invalid compression level was provided.
    #[error("invalid compression level {level}: must be 0-9")]
    InvalidCompressionLevel {
        /// The invalid level that was provided.
        level: u32,
    },

    /// A container comment does not fit the format's comment field.
    #[error("Comment of {len} bytes exceeds the {max} byte limit", max = crate::codec::MAX_COMMENT_LEN)]
    CommentTooLong {
        /// Length of the rejected comment in bytes.
        len: usize,
    },

    /// A reader yielded a different number of bytes than the entry header declared.
    #[error("Entry {path} declared {expected} bytes but {actual} were read")]
    SizeMismatch {
        /// The entry being written.
        path: String,
        /// Size recorded in the header.
        expected: u64,
        /// Bytes actually read from the source.
        actual: u64,
    },
}

impl Error {
    /// Returns true if the error reports a missing host path or entry.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::EntryNotFound { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Returns true if the error means the container could not be decoded.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::InvalidFormat(_) | Self::UnknownFormat { .. })
    }

    /// Converts an I/O error on `path` into [`Error::NotFound`] when it reports a missing file.
    pub(crate) fn from_io_at(err: io::Error, path: impl Into<PathBuf>) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path: path.into() }
        } else {
            Self::Io(err)
        }
    }

    /// Creates an [`Error::InvalidFormat`] from any displayable decoder failure.
    pub(crate) fn format(reason: impl std::fmt::Display) -> Self {
        Self::InvalidFormat(reason.to_string())
    }
}

/// A specialized Result type for archive session operations.
///
/// ```rust
/// use mutarc::Result;
///
/// fn my_function() -> Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;
