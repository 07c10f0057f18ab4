use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};
use std::ops::Bound;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use blobgate_types::{ListedObject, ObjectKey};
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};
use crate::traits::{BlobMetadata, BlobReader, BlobStore, ListPage};

/// Default number of keys per listing page, matching S3's maximum.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredBlob {
    data: Vec<u8>,
    metadata: BlobMetadata,
    modified: u64,
}

/// In-memory, `BTreeMap`-based blob store.
///
/// Intended for tests and local runs. Keys are kept sorted so listings page
/// in the same lexicographic order an S3-compatible service uses. Individual
/// keys can be marked as failing to simulate upstream faults.
pub struct InMemoryBlobStore {
    bucket: String,
    page_size: usize,
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
    failing_puts: RwLock<HashSet<String>>,
    failing_gets: RwLock<HashSet<String>>,
}

impl InMemoryBlobStore {
    /// Create a new empty store.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: DEFAULT_PAGE_SIZE,
            blobs: RwLock::new(BTreeMap::new()),
            failing_puts: RwLock::new(HashSet::new()),
            failing_gets: RwLock::new(HashSet::new()),
        }
    }

    /// Set the number of keys returned per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make every put to `key` fail with an upstream error.
    pub fn fail_puts_for(&self, key: impl Into<String>) {
        self.failing_puts.write().expect("lock poisoned").insert(key.into());
    }

    /// Make every get of `key` fail with an upstream error.
    pub fn fail_gets_for(&self, key: impl Into<String>) {
        self.failing_gets.write().expect("lock poisoned").insert(key.into());
    }

    /// Store `data` directly, bypassing the streaming path.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let blob = StoredBlob {
            data: data.into(),
            metadata: BlobMetadata::new(),
            modified: now_secs(),
        };
        self.blobs.write().expect("lock poisoned").insert(key.into(), blob);
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.blobs.read().expect("lock poisoned").keys().cloned().collect()
    }

    /// Full content of a blob.
    pub fn content(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(key).map(|blob| blob.data.clone())
    }

    /// Metadata attached to a blob.
    pub fn metadata(&self, key: &str) -> Option<BlobMetadata> {
        let map = self.blobs.read().expect("lock poisoned");
        map.get(key).map(|blob| blob.metadata.clone())
    }

    fn is_failing(set: &RwLock<HashSet<String>>, key: &str) -> bool {
        set.read().expect("lock poisoned").contains(key)
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl BlobStore for InMemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn put(
        &self,
        key: &ObjectKey,
        body: &mut dyn Read,
        size: u64,
        metadata: &BlobMetadata,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if Self::is_failing(&self.failing_puts, key.as_str()) {
            return Err(StoreError::Upstream(format!("injected put failure for {key}")));
        }

        let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
        body.take(size).read_to_end(&mut data)?;

        let blob = StoredBlob {
            data,
            metadata: metadata.clone(),
            modified: now_secs(),
        };
        self.blobs
            .write()
            .expect("lock poisoned")
            .insert(key.as_str().to_owned(), blob);
        Ok(())
    }

    fn get(&self, key: &ObjectKey, cancel: &CancellationToken) -> StoreResult<BlobReader> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if Self::is_failing(&self.failing_gets, key.as_str()) {
            return Err(StoreError::Upstream(format!("injected get failure for {key}")));
        }
        let map = self.blobs.read().expect("lock poisoned");
        let blob = map
            .get(key.as_str())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let size = blob.data.len() as u64;
        Ok(BlobReader::new(Cursor::new(blob.data.clone()), Some(size)))
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<ListPage> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let map = self.blobs.read().expect("lock poisoned");
        let start = match continuation {
            Some(after) => Bound::Excluded(after.to_owned()),
            None => Bound::Included(prefix.to_owned()),
        };

        let mut objects: Vec<ListedObject> = map
            .range((start, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .take(self.page_size + 1)
            .map(|(key, blob)| ListedObject {
                key: ObjectKey::from_raw(key.clone()),
                size: blob.data.len() as u64,
                last_modified: Some(blob.modified),
            })
            .collect();

        let next = if objects.len() > self.page_size {
            objects.truncate(self.page_size);
            objects.last().map(|obj| obj.key.as_str().to_owned())
        } else {
            None
        };
        Ok(ListPage { objects, next })
    }
}

impl std::fmt::Debug for InMemoryBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlobStore")
            .field("bucket", &self.bucket)
            .field("object_count", &self.len())
            .finish()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
