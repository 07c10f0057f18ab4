use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;

use blobgate_types::{ListedObject, ObjectKey};
use tokio_util::sync::CancellationToken;

use crate::error::StoreResult;

/// User metadata attached to a stored blob.
pub type BlobMetadata = BTreeMap<String, String>;

/// Streaming body of a fetched blob.
pub struct BlobReader {
    /// Content length, when the backend reports it up front.
    pub size: Option<u64>,
    pub reader: Box<dyn Read + Send>,
}

impl BlobReader {
    pub fn new(reader: impl Read + Send + 'static, size: Option<u64>) -> Self {
        Self {
            size,
            reader: Box::new(reader),
        }
    }
}

impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobReader").field("size", &self.size).finish()
    }
}

/// One page of a prefix listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    /// Continuation token for the following page; `None` on the last page.
    pub next: Option<String>,
}

/// Blob storage capability.
///
/// Calls block the current thread; async callers run them on a blocking
/// worker. Implementations must be safe to share across requests without
/// external locking.
///
/// - `put` reads exactly `size` bytes from `body` and stores them under `key`
///   with the given metadata. The size is declared up front so the backend
///   never has to buffer the whole body to learn its length.
/// - `get` returns the blob as a stream, or [`StoreError::NotFound`].
/// - `list_page` returns keys starting with `prefix` in lexicographic order.
///   The continuation token is opaque to callers.
///
/// [`StoreError::NotFound`]: crate::error::StoreError::NotFound
pub trait BlobStore: Send + Sync {
    /// Name of the bucket or container this store writes into.
    fn bucket(&self) -> &str;

    fn put(
        &self,
        key: &ObjectKey,
        body: &mut dyn Read,
        size: u64,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> StoreResult<()>;

    fn get(&self, key: &ObjectKey, cancel: &CancellationToken) -> StoreResult<BlobReader>;

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<ListPage>;
}
