use std::borrow::Cow;
use std::future::Future;
use std::io::{self, Read};
use std::sync::Arc;

use blobgate_types::{ListedObject, ObjectKey};
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectMeta, ObjectStore, PutMultipartOpts, PutOptions,
    PutPayload, WriteMultipart,
};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, StoreResult};
use crate::memory::DEFAULT_PAGE_SIZE;
use crate::traits::{BlobMetadata, BlobReader, BlobStore, ListPage};

/// Bodies up to this size go out as a single request; larger ones are
/// uploaded in parts of this size.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Parts allowed in flight at once during a multipart upload.
const MAX_IN_FLIGHT_PARTS: usize = 4;

const COPY_BUFFER: usize = 64 * 1024;

/// Connection settings for an S3-compatible service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct S3Settings {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Blob store backed by any [`object_store::ObjectStore`].
///
/// The async client is driven from blocking callers through a captured
/// runtime handle, so methods must not be called from an async task.
/// Every call races the caller's cancellation token and is abandoned as
/// soon as it fires.
pub struct RemoteBlobStore {
    inner: Arc<dyn ObjectStore>,
    bucket: String,
    handle: Handle,
    page_size: usize,
}

impl RemoteBlobStore {
    pub fn new(inner: Arc<dyn ObjectStore>, bucket: impl Into<String>, handle: Handle) -> Self {
        Self {
            inner,
            bucket: bucket.into(),
            handle,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Connect to an S3-compatible endpoint such as Cloudflare R2.
    pub fn s3(settings: &S3Settings, handle: Handle) -> StoreResult<Self> {
        let client = AmazonS3Builder::new()
            .with_endpoint(&settings.endpoint)
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region)
            .with_access_key_id(&settings.access_key)
            .with_secret_access_key(&settings.secret_key)
            .build()
            .map_err(|e| StoreError::Upstream(e.to_string()))?;
        Ok(Self::new(Arc::new(client), settings.bucket.clone(), handle))
    }

    /// Set the number of keys requested per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn block_on<T, F>(&self, cancel: &CancellationToken, fut: F) -> StoreResult<T>
    where
        F: Future<Output = object_store::Result<T>>,
    {
        self.handle.block_on(async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(StoreError::Cancelled),
                result = fut => result.map_err(StoreError::from),
            }
        })
    }

    fn put_multipart(
        &self,
        location: &Path,
        body: &mut dyn Read,
        attributes: Attributes,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };
        let upload = self.block_on(cancel, self.inner.put_multipart_opts(location, opts))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);
        let mut buf = vec![0u8; COPY_BUFFER];

        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.abort(writer);
                    return Err(e.into());
                }
            };
            writer.write(&buf[..n]);
            if let Err(e) = self.block_on(cancel, writer.wait_for_capacity(MAX_IN_FLIGHT_PARTS)) {
                self.abort(writer);
                return Err(e);
            }
        }

        self.block_on(cancel, writer.finish())?;
        Ok(())
    }

    fn abort(&self, writer: WriteMultipart) {
        if let Err(e) = self.handle.block_on(writer.abort()) {
            tracing::warn!(error = %e, "failed to abort multipart upload");
        }
    }
}

impl BlobStore for RemoteBlobStore {
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
        let location = to_path(key.as_str())?;
        let attributes = to_attributes(metadata);

        if size > PART_SIZE as u64 {
            return self.put_multipart(&location, body, attributes, cancel);
        }

        let mut data = Vec::with_capacity(size as usize);
        body.take(size).read_to_end(&mut data)?;
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        self.block_on(
            cancel,
            self.inner.put_opts(&location, PutPayload::from(data), opts),
        )?;
        Ok(())
    }

    fn get(&self, key: &ObjectKey, cancel: &CancellationToken) -> StoreResult<BlobReader> {
        let location = to_path(key.as_str())?;
        let result = self.block_on(cancel, self.inner.get(&location))?;
        let size = result.meta.size as u64;

        // A cancelled request ends the stream early; readers see a short body.
        let stream = result
            .into_stream()
            .map_err(io::Error::other)
            .take_until(cancel.clone().cancelled_owned());
        let reader = SyncIoBridge::new_with_handle(
            StreamReader::new(Box::pin(stream)),
            self.handle.clone(),
        );
        Ok(BlobReader::new(reader, Some(size)))
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
        cancel: &CancellationToken,
    ) -> StoreResult<ListPage> {
        let prefix_path = to_path(prefix)?;
        let stream = match continuation {
            Some(offset) => self
                .inner
                .list_with_offset(Some(&prefix_path), &to_path(offset)?),
            None => self.inner.list(Some(&prefix_path)),
        };
        let metas: Vec<ObjectMeta> =
            self.block_on(cancel, stream.take(self.page_size + 1).try_collect())?;

        let mut objects: Vec<ListedObject> = metas
            .into_iter()
            .filter(|meta| meta.location.as_ref().starts_with(prefix))
            .map(|meta| ListedObject {
                key: ObjectKey::from_raw(meta.location.to_string()),
                size: meta.size as u64,
                last_modified: u64::try_from(meta.last_modified.timestamp()).ok(),
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

impl std::fmt::Debug for RemoteBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBlobStore")
            .field("backend", &self.inner.to_string())
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Backend path for a key, taken verbatim.
///
/// `Path::from` would percent-encode characters such as `#` or `[`, so the
/// stored name would differ from the key and listings would not round trip.
fn to_path(key: &str) -> StoreResult<Path> {
    Path::parse(key)
        .map_err(|e| StoreError::Upstream(format!("invalid object key {key:?}: {e}")))
}

fn to_attributes(metadata: &BlobMetadata) -> Attributes {
    let mut attributes = Attributes::new();
    for (key, value) in metadata {
        attributes.insert(
            Attribute::Metadata(Cow::Owned(key.clone())),
            AttributeValue::from(value.clone()),
        );
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    fn store_on(handle: Handle) -> (RemoteBlobStore, Arc<InMemory>) {
        let backend = Arc::new(InMemory::new());
        let store = RemoteBlobStore::new(backend.clone(), "test-bucket", handle).with_page_size(2);
        (store, backend)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_get_roundtrip() {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            let (store, _) = store_on(handle);
            let cancel = CancellationToken::new();
            let key = ObjectKey::from_raw("alice/notes/a.txt");
            let mut body: &[u8] = b"remote content";
            let mut meta = BlobMetadata::new();
            meta.insert("owner-id".into(), "alice".into());
            store.put(&key, &mut body, 14, &meta, &cancel).unwrap();

            let mut blob = store.get(&key, &cancel).unwrap();
            assert_eq!(blob.size, Some(14));
            let mut out = Vec::new();
            blob.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"remote content");
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn owner_metadata_becomes_attribute() {
        let handle = Handle::current();
        let backend = tokio::task::spawn_blocking(move || {
            let (store, backend) = store_on(handle);
            let mut meta = BlobMetadata::new();
            meta.insert("owner-id".into(), "alice".into());
            let mut body: &[u8] = b"x";
            store
                .put(&ObjectKey::from_raw("alice/x"), &mut body, 1, &meta, &CancellationToken::new())
                .unwrap();
            backend
        })
        .await
        .unwrap();

        let result = backend.get(&Path::from("alice/x")).await.unwrap();
        let owner = result
            .attributes
            .get(&Attribute::Metadata(Cow::Borrowed("owner-id")))
            .map(|v| {
                let value: &str = v.as_ref();
                value.to_owned()
            });
        assert_eq!(owner.as_deref(), Some("alice"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_object_is_not_found() {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            let (store, _) = store_on(handle);
            let err = store
                .get(&ObjectKey::from_raw("alice/missing"), &CancellationToken::new())
                .unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn listing_pages_through_prefix() {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            let (store, _) = store_on(handle);
            let cancel = CancellationToken::new();
            for name in ["alice/d/1", "alice/d/2", "alice/d/3", "bob/d/4"] {
                let mut body: &[u8] = b"z";
                store
                    .put(&ObjectKey::from_raw(name), &mut body, 1, &BlobMetadata::new(), &cancel)
                    .unwrap();
            }

            let first = store.list_page("alice/d/", None, &cancel).unwrap();
            assert_eq!(first.objects.len(), 2);
            let second = store
                .list_page("alice/d/", first.next.as_deref(), &cancel)
                .unwrap();
            assert_eq!(second.objects.len(), 1);
            assert_eq!(second.objects[0].key.as_str(), "alice/d/3");
            assert!(second.next.is_none());
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn special_characters_survive_listing() {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            let (store, _) = store_on(handle);
            let cancel = CancellationToken::new();
            let raw = "alice/report#1 [final] 100%.txt";
            let mut body: &[u8] = b"quarterly";
            store
                .put(&ObjectKey::from_raw(raw), &mut body, 9, &BlobMetadata::new(), &cancel)
                .unwrap();

            let page = store.list_page("alice/", None, &cancel).unwrap();
            let listed: Vec<&str> = page.objects.iter().map(|o| o.key.as_str()).collect();
            assert_eq!(listed, vec![raw]);

            let mut blob = store.get(&page.objects[0].key, &cancel).unwrap();
            let mut out = Vec::new();
            blob.read_to_end(&mut out).unwrap();
            assert_eq!(out, b"quarterly");
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancelled_put_is_abandoned() {
        let handle = Handle::current();
        tokio::task::spawn_blocking(move || {
            let (store, _) = store_on(handle);
            let cancel = CancellationToken::new();
            cancel.cancel();
            let mut body: &[u8] = b"x";
            let err = store
                .put(&ObjectKey::from_raw("alice/x"), &mut body, 1, &BlobMetadata::new(), &cancel)
                .unwrap_err();
            assert!(matches!(err, StoreError::Cancelled));
        })
        .await
        .unwrap();
    }
}
