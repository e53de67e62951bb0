//! # mutarc
//!
//! Mutable tar.gz and zip archives.
//!
//! Compressed containers cannot be edited in place, so this crate keeps an
//! in-memory model of a container's entries, lets you add, rename and
//! delete entries freely, and commits every pending change in one rebuild
//! when the session is flushed.
//!
//! ## Quick Start
//!
//! ### Editing an Archive
//!
//! ```rust,no_run
//! use mutarc::{ArchiveSession, Result};
//!
//! fn main() -> Result<()> {
//!     let mut session = ArchiveSession::open("backup.tar.gz")?;
//!
//!     for path in session.list_with_prefix(&["logs/"]) {
//!         println!("{}", path);
//!     }
//!
//!     session.add_dir("config/", "./config")?;
//!     session.delete_by_path("logs/old.log")?;
//!     session.rename("README", "README.md")?;
//!
//!     let result = session.flush()?;
//!     println!("{} entries, {} bytes", result.total_entries(), result.bytes);
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use mutarc::{ArchiveSession, Result};
//!
//! fn main() -> Result<()> {
//!     let mut session = ArchiveSession::create("site.zip")?;
//!     session.add_empty_dir("assets/images/")?;
//!     session.add_file("index.html", "build/index.html")?;
//!     session.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Extracting Entries
//!
//! ```rust,no_run
//! use mutarc::{ArchiveSession, Result};
//!
//! fn main() -> Result<()> {
//!     let session = ArchiveSession::open_read_only("bundle.tgz")?;
//!     // Everything
//!     session.extract_to("out", &[] as &[&str])?;
//!     // A single file, with the directories above it
//!     session.extract_to("out", &["bin/tool"])?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`session`]: the editable [`ArchiveSession`] and its flush/extract results
//! - [`codec`]: the tar.gz and zip codecs behind the [`Codec`] trait
//! - [`pack`]: one-shot directory packing with [`pack_to`]
//! - [`streaming`]: forward-only [`StreamWriter`]
//! - [`fs`]: host filesystem helpers
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: per-entry events at `debug`,
//! open/flush summaries at `info`, and metadata failures or dropped dirty
//! sessions at `warn`. No logger is installed.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Buffer size for chunked copies.
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive_path;
pub mod codec;
pub mod entry;
pub mod error;
pub mod fs;
pub mod options;
pub mod pack;
pub mod session;
pub mod streaming;

pub use archive_path::ArchivePath;
pub use codec::{Codec, EntryEncoder, Format};
pub use entry::{Entry, EntryKind, EntryMeta, EntrySource};
pub use error::{Error, Result};
pub use options::{ExclusionFilter, OpenMode, SessionOptions, default_exclusion};
pub use pack::{PackResult, pack_to};
pub use session::{ArchiveSession, ExtractResult, FlushResult};
pub use streaming::{StreamResult, StreamWriter};
