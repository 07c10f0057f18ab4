//! Foundation types for Blobgate.
//!
//! Every object the gateway stores lives under the namespace of the caller
//! that pushed it. This crate provides the types that make that partition
//! explicit and the path normalizer that keeps untrusted names inside it.
//!
//! # Key Types
//!
//! - [`Identity`]: opaque caller identity, the top-level key-space partition
//! - [`ObjectKey`]: `identity + "/" + normalized relative path`
//! - [`ListedObject`]: `(key, size)` pair returned by a prefix listing
//!
//! # Path Normalization
//!
//! [`normalize_path`] and [`normalize_prefix`] clean caller-controlled
//! strings lexically. They never fail: malformed input degrades to the
//! empty "no sub-path" case instead of escaping the caller's namespace.

pub mod error;
pub mod identity;
pub mod key;
pub mod path;

pub use error::TypeError;
pub use identity::Identity;
pub use key::{ListedObject, ObjectKey};
pub use path::{file_name, normalize_path, normalize_prefix};
