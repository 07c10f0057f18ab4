//! Blob transfer primitives.
//!
//! Single push/pull use these directly; the archive extractor and builder
//! call them once per entry.

use std::collections::VecDeque;
use std::io::{self, Read};

use blobgate_types::{Identity, ListedObject, ObjectKey};
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobMetadata, BlobReader, BlobStore};

/// Metadata key under which every put records the caller's identity.
pub const OWNER_METADATA_KEY: &str = "owner-id";

/// Store `size` bytes from `body` under `key`, tagged with the owner.
///
/// The body is read through a size-checking wrapper: if it ends before
/// `size` bytes the put fails with [`StoreError::Truncated`] no matter how
/// the backend reported the short read.
pub fn put_object(
    store: &dyn BlobStore,
    identity: &Identity,
    key: &ObjectKey,
    body: &mut dyn Read,
    size: u64,
    cancel: &CancellationToken,
) -> StoreResult<()> {
    let mut metadata = BlobMetadata::new();
    metadata.insert(OWNER_METADATA_KEY.to_owned(), identity.as_str().to_owned());

    let mut sized = SizedBody::new(body, size);
    match store.put(key, &mut sized, size, &metadata, cancel) {
        Ok(()) => {
            tracing::debug!(%key, size, bucket = store.bucket(), "stored object");
            Ok(())
        }
        Err(_) if sized.truncated => Err(StoreError::Truncated {
            key: key.to_string(),
            expected: size,
            actual: sized.consumed,
        }),
        Err(e) => Err(e),
    }
}

/// Open `key` as a stream.
pub fn get_object(
    store: &dyn BlobStore,
    key: &ObjectKey,
    cancel: &CancellationToken,
) -> StoreResult<BlobReader> {
    let blob = store.get(key, cancel)?;
    tracing::debug!(%key, size = ?blob.size, "opened object");
    Ok(blob)
}

/// Lazily list every object under `prefix`.
///
/// Pages are fetched one at a time as the iterator is drained. After an
/// error the iterator is exhausted; to retry, start a new listing.
pub fn list_prefix<'a>(
    store: &'a dyn BlobStore,
    prefix: impl Into<String>,
    cancel: &CancellationToken,
) -> PrefixListing<'a> {
    PrefixListing {
        store,
        prefix: prefix.into(),
        cancel: cancel.clone(),
        buffered: VecDeque::new(),
        continuation: None,
        pages: 0,
        done: false,
    }
}

/// Iterator over a paginated prefix listing. See [`list_prefix`].
pub struct PrefixListing<'a> {
    store: &'a dyn BlobStore,
    prefix: String,
    cancel: CancellationToken,
    buffered: VecDeque<ListedObject>,
    continuation: Option<String>,
    pages: usize,
    done: bool,
}

impl PrefixListing<'_> {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

impl Iterator for PrefixListing<'_> {
    type Item = StoreResult<ListedObject>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(object) = self.buffered.pop_front() {
                return Some(Ok(object));
            }
            if self.done {
                return None;
            }
            match self
                .store
                .list_page(&self.prefix, self.continuation.as_deref(), &self.cancel)
            {
                Ok(page) => {
                    self.pages += 1;
                    self.done = page.next.is_none();
                    self.continuation = page.next;
                    self.buffered.extend(page.objects);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Reader that yields exactly `remaining` bytes and flags a short source.
struct SizedBody<'a> {
    inner: &'a mut dyn Read,
    remaining: u64,
    consumed: u64,
    truncated: bool,
}

impl<'a> SizedBody<'a> {
    fn new(inner: &'a mut dyn Read, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
            consumed: 0,
            truncated: false,
        }
    }
}

impl Read for SizedBody<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            self.truncated = true;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended {} bytes early", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        self.consumed += n as u64;
        Ok(n)
    }
}
