//! Archive construction (pull-dir).

use std::io::{self, Read, Write};

use blobgate_store::{get_object, list_prefix, BlobStore, StoreError};
use blobgate_types::{normalize_path, Identity, ListedObject, ObjectKey};
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{EntryType, Header};
use tokio_util::sync::CancellationToken;

use crate::error::{ArchiveError, ArchiveResult};
use crate::report::{TransferOutcome, TransferReport};

/// Download name used when the whole namespace is archived.
pub const DEFAULT_ARCHIVE_NAME: &str = "archive.tar.gz";

/// Suggested download name for an archive of `dir`: the normalized
/// directory with `/` replaced by `_`, plus `.tar.gz`.
pub fn archive_file_name(dir: &str) -> String {
    let dir = normalize_path(dir);
    if dir.is_empty() {
        return DEFAULT_ARCHIVE_NAME.to_owned();
    }
    format!("{}.tar.gz", dir.replace('/', "_"))
}

/// Write every object under `identity/dir/` into a gzip tar stream.
///
/// Entry names are keys relative to the identity's namespace, so the
/// requested directory itself appears as the top-level folder of the
/// archive. The listing is consumed page by page while the archive is
/// being written.
///
/// Framing is emitted before the outcome of any entry is known, so
/// per-object failures cannot be reported to the reader of `output`. They
/// are logged and recorded in the returned report. A failed get leaves the
/// entry out; a body that breaks off mid-copy is padded with zeros to its
/// listed size so the entries after it stay readable.
///
/// The archive is finalized (tar trailer, then gzip trailer) even when the
/// listing fails part way; the listing error is returned afterwards.
pub fn build_archive<W: Write>(
    store: &dyn BlobStore,
    identity: &Identity,
    dir: &str,
    output: W,
    cancel: &CancellationToken,
) -> ArchiveResult<TransferReport> {
    let prefix = ObjectKey::prefix(identity, dir);
    let mut builder = tar::Builder::new(GzEncoder::new(output, Compression::default()));
    let mut report = TransferReport::new();
    let mut listing_error = None;

    for listed in list_prefix(store, prefix.as_str(), cancel) {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let object = match listed {
            Ok(object) => object,
            Err(StoreError::Cancelled) => return Err(ArchiveError::Cancelled),
            Err(e) => {
                tracing::error!(%prefix, error = %e, "failed to list objects");
                listing_error = Some(e);
                break;
            }
        };
        if object.key.is_placeholder() {
            continue;
        }
        let name = object
            .key
            .relative_to(identity)
            .map(normalize_path)
            .unwrap_or_default();
        if name.is_empty() {
            report.record(TransferOutcome::Skipped {
                name: object.key.to_string(),
                reason: "outside namespace".into(),
            });
            continue;
        }
        append_object(&mut builder, store, &object, &name, cancel, &mut report)?;
    }

    let encoder = builder.into_inner().map_err(ArchiveError::Output)?;
    encoder
        .finish()
        .and_then(|mut out| out.flush())
        .map_err(ArchiveError::Output)?;

    if let Some(e) = listing_error {
        return Err(e.into());
    }
    tracing::info!(
        identity = %identity,
        %prefix,
        entries = report.stored(),
        failed = report.failed(),
        bytes = report.bytes_stored(),
        "archive build complete"
    );
    Ok(report)
}

fn append_object<W: Write>(
    builder: &mut tar::Builder<W>,
    store: &dyn BlobStore,
    object: &ListedObject,
    name: &str,
    cancel: &CancellationToken,
    report: &mut TransferReport,
) -> ArchiveResult<()> {
    let blob = match get_object(store, &object.key, cancel) {
        Ok(blob) => blob,
        Err(StoreError::Cancelled) => return Err(ArchiveError::Cancelled),
        Err(e) => {
            tracing::warn!(key = %object.key, error = %e, "failed to download object");
            report.record(TransferOutcome::Failed {
                name: name.to_owned(),
                reason: e.to_string(),
            });
            return Ok(());
        }
    };
    if blob.size.is_some_and(|size| size != object.size) {
        tracing::warn!(
            key = %object.key,
            listed = object.size,
            actual = ?blob.size,
            "object changed since listing"
        );
    }

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(object.size);
    header.set_mode(0o644);
    header.set_mtime(object.last_modified.unwrap_or(0));

    let mut body = ZeroFill::new(blob, object.size);
    builder
        .append_data(&mut header, name, &mut body)
        .map_err(ArchiveError::Output)?;

    match body.fault {
        Some(reason) => {
            tracing::warn!(key = %object.key, error = %reason, "failed to copy object body");
            report.record(TransferOutcome::Failed {
                name: name.to_owned(),
                reason,
            });
        }
        None => report.record(TransferOutcome::Stored {
            key: object.key.clone(),
            size: object.size,
        }),
    }
    Ok(())
}

/// Yields exactly `remaining` bytes; once the source fails or runs dry the
/// rest is zeros.
struct ZeroFill<R> {
    inner: R,
    remaining: u64,
    fault: Option<String>,
}

impl<R: Read> ZeroFill<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
            fault: None,
        }
    }
}

impl<R: Read> Read for ZeroFill<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = buf
            .len()
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        if want == 0 {
            return Ok(0);
        }
        while self.fault.is_none() {
            match self.inner.read(&mut buf[..want]) {
                Ok(0) => self.fault = Some(format!("body ended {} bytes early", self.remaining)),
                Ok(n) => {
                    self.remaining -= n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => self.fault = Some(e.to_string()),
            }
        }
        buf[..want].fill(0);
        self.remaining -= want as u64;
        Ok(want)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobgate_store::{BlobMetadata, BlobReader, InMemoryBlobStore, ListPage};
    use flate2::read::GzDecoder;
    use std::collections::BTreeMap;

    fn alice() -> Identity {
        Identity::new("alice").unwrap()
    }

    /// Decode a gzip tar into `name -> content`.
    fn unpack(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut files = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            files.insert(name, content);
        }
        files
    }

    fn build(store: &dyn BlobStore, dir: &str) -> (Vec<u8>, TransferReport) {
        let mut out = Vec::new();
        let report =
            build_archive(store, &alice(), dir, &mut out, &CancellationToken::new()).unwrap();
        (out, report)
    }

    #[test]
    fn file_names() {
        assert_eq!(archive_file_name("photos"), "photos.tar.gz");
        assert_eq!(archive_file_name("/photos/summer/"), "photos_summer.tar.gz");
        assert_eq!(archive_file_name("a/../b/./c"), "b_c.tar.gz");
        assert_eq!(archive_file_name(""), "archive.tar.gz");
        assert_eq!(archive_file_name("/"), "archive.tar.gz");
    }

    #[test]
    fn archives_whole_namespace() {
        let store = InMemoryBlobStore::default();
        store.insert("alice/a.txt", b"alpha".to_vec());
        store.insert("alice/sub/b.txt", b"bravo".to_vec());
        store.insert("bob/secret.txt", b"nope".to_vec());

        let (bytes, report) = build(&store, "");
        assert_eq!(report.stored(), 2);

        let files = unpack(&bytes);
        assert_eq!(files.len(), 2);
        assert_eq!(files["a.txt"], b"alpha");
        assert_eq!(files["sub/b.txt"], b"bravo");
    }

    #[test]
    fn sub_dir_keeps_its_own_segment() {
        let store = InMemoryBlobStore::default();
        store.insert("alice/photos/summer/img.jpg", b"jpeg".to_vec());
        store.insert("alice/photos/cat.png", b"png".to_vec());
        store.insert("alice/photosynthesis.txt", b"not a photo".to_vec());
        store.insert("alice/docs/readme", b"doc".to_vec());

        let (bytes, _) = build(&store, "photos");
        let files = unpack(&bytes);
        let names: Vec<_> = files.keys().cloned().collect();
        assert_eq!(names, vec!["photos/cat.png", "photos/summer/img.jpg"]);
    }

    #[test]
    fn traversal_in_dir_stays_in_namespace() {
        let store = InMemoryBlobStore::default();
        store.insert("alice/x/mine", b"mine".to_vec());
        store.insert("x/other", b"other".to_vec());

        let (bytes, _) = build(&store, "../../x");
        let files = unpack(&bytes);
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["x/mine"]);
    }

    #[test]
    fn empty_prefix_yields_valid_empty_archive() {
        let store = InMemoryBlobStore::default();
        let (bytes, report) = build(&store, "nothing-here");
        assert_eq!(report.stored(), 0);
        assert!(!bytes.is_empty());
        assert!(unpack(&bytes).is_empty());
    }

    #[test]
    fn placeholders_are_skipped() {
        let store = InMemoryBlobStore::default();
        store.insert("alice/dir/", Vec::new());
        store.insert("alice/dir/file", b"f".to_vec());

        let (bytes, report) = build(&store, "dir");
        assert_eq!(report.stored(), 1);
        assert_eq!(unpack(&bytes).keys().collect::<Vec<_>>(), vec!["dir/file"]);
    }

    #[test]
    fn paginates_large_listings() {
        let store = InMemoryBlobStore::default().with_page_size(3);
        for i in 0..20 {
            store.insert(format!("alice/many/{i:03}"), format!("content {i}").into_bytes());
        }

        let (bytes, report) = build(&store, "many");
        assert_eq!(report.stored(), 20);
        let files = unpack(&bytes);
        assert_eq!(files.len(), 20);
        assert_eq!(files["many/007"], b"content 7");
    }

    #[test]
    fn failed_get_is_left_out() {
        let store = InMemoryBlobStore::default();
        store.insert("alice/a", b"a".to_vec());
        store.insert("alice/b", b"b".to_vec());
        store.insert("alice/c", b"c".to_vec());
        store.fail_gets_for("alice/b");

        let (bytes, report) = build(&store, "");
        assert_eq!(report.stored(), 2);
        assert_eq!(report.failures().collect::<Vec<_>>(), vec!["b"]);
        let files = unpack(&bytes);
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn long_names_survive() {
        let store = InMemoryBlobStore::default();
        let long = format!("deep/{}/file.txt", "segment".repeat(30));
        store.insert(format!("alice/{long}"), b"deep".to_vec());

        let (bytes, _) = build(&store, "");
        assert_eq!(unpack(&bytes)[&long], b"deep");
    }

    /// Store whose bodies stop short of their listed size for one key.
    struct ShortBodies {
        inner: InMemoryBlobStore,
        short_key: &'static str,
    }

    impl BlobStore for ShortBodies {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }

        fn put(
            &self,
            key: &ObjectKey,
            body: &mut dyn Read,
            size: u64,
            metadata: &BlobMetadata,
            cancel: &CancellationToken,
        ) -> blobgate_store::StoreResult<()> {
            self.inner.put(key, body, size, metadata, cancel)
        }

        fn get(
            &self,
            key: &ObjectKey,
            cancel: &CancellationToken,
        ) -> blobgate_store::StoreResult<BlobReader> {
            let blob = self.inner.get(key, cancel)?;
            if key.as_str() == self.short_key {
                return Ok(BlobReader::new(blob.take(2), None));
            }
            Ok(blob)
        }

        fn list_page(
            &self,
            prefix: &str,
            continuation: Option<&str>,
            cancel: &CancellationToken,
        ) -> blobgate_store::StoreResult<ListPage> {
            self.inner.list_page(prefix, continuation, cancel)
        }
    }

    #[test]
    fn short_body_is_padded_and_framing_kept() {
        let inner = InMemoryBlobStore::default();
        inner.insert("alice/1-short", b"abcdef".to_vec());
        inner.insert("alice/2-after", b"intact".to_vec());
        let store = ShortBodies {
            inner,
            short_key: "alice/1-short",
        };

        let (bytes, report) = build(&store, "");
        assert_eq!(report.stored(), 1);
        assert_eq!(report.failed(), 1);

        let files = unpack(&bytes);
        assert_eq!(files["1-short"], b"ab\0\0\0\0");
        assert_eq!(files["2-after"], b"intact");
    }

    #[test]
    fn closed_output_aborts() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let store = InMemoryBlobStore::default();
        store.insert("alice/big", vec![9u8; 256 * 1024]);
        let err = build_archive(&store, &alice(), "", Closed, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Output(_)));
    }

    #[test]
    fn cancellation_stops_build() {
        let store = InMemoryBlobStore::default();
        store.insert("alice/a", b"a".to_vec());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = build_archive(&store, &alice(), "", Vec::new(), &cancel).unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled));
    }
}
