//! Blob storage capability for Blobgate.
//!
//! The gateway treats object storage as an opaque capability with three
//! operations: put a stream under a key, get a key as a stream, and list a
//! key prefix one page at a time. This crate defines that capability as the
//! [`BlobStore`] trait and layers the transfer primitives every HTTP
//! operation is built from on top of it.
//!
//! # Storage Backends
//!
//! - [`InMemoryBlobStore`] -- `BTreeMap`-based store for tests and local runs
//! - [`RemoteBlobStore`] -- any `object_store` backend (S3, Cloudflare R2, ...)
//!
//! # Design Rules
//!
//! 1. Content is never read fully into memory by the transfer layer.
//! 2. The declared size of a put is known before the first byte is sent.
//! 3. Every put carries an `owner-id` metadata tag equal to the caller.
//! 4. Listings are lazy and restart only from the beginning.
//! 5. Every backend call observes the request's cancellation token.

pub mod error;
pub mod memory;
pub mod remote;
pub mod traits;
pub mod transfer;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBlobStore;
pub use remote::{RemoteBlobStore, S3Settings};
pub use traits::{BlobMetadata, BlobReader, BlobStore, ListPage};
pub use transfer::{get_object, list_prefix, put_object, PrefixListing, OWNER_METADATA_KEY};
