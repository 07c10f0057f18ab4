//! Streaming directory archives for Blobgate.
//!
//! - [`extract_archive`] (push-dir) decodes a gzip-compressed tar stream
//!   entry by entry and stores every regular file as its own object.
//! - [`build_archive`] (pull-dir) pages through a key prefix and writes
//!   every object into a gzip-compressed tar stream.
//!
//! Both directions stream end to end: an entry's bytes flow straight
//! between the archive codec and the blob store and are never held whole
//! in memory. Entries are processed strictly one after another.
//!
//! # Partial failure
//!
//! A failing put or get affects only its own entry: it is logged, recorded
//! as [`TransferOutcome::Failed`], and the operation moves on. Corrupt
//! input (bad gzip framing, bad tar structure, an entry shorter than its
//! header) aborts the extraction with a [`DecodeError`].

pub mod build;
pub mod error;
pub mod extract;
pub mod report;

pub use build::{archive_file_name, build_archive, DEFAULT_ARCHIVE_NAME};
pub use error::{ArchiveError, ArchiveResult, DecodeError};
pub use extract::extract_archive;
pub use report::{TransferOutcome, TransferReport};
