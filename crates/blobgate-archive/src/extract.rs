//! Archive extraction (push-dir).

use std::cell::RefCell;
use std::io::{self, Read};
use std::rc::Rc;

use blobgate_store::{put_object, BlobStore, StoreError};
use blobgate_types::{Identity, ObjectKey};
use flate2::read::MultiGzDecoder;
use tar::EntryType;
use tokio_util::sync::CancellationToken;

use crate::error::{ArchiveError, ArchiveResult, DecodeError};
use crate::report::{TransferOutcome, TransferReport};

/// Decode a gzip tar stream and store each regular file it contains.
///
/// Concatenated gzip members are decoded as one stream.
///
/// Every file lands at `identity/[sub_dir/]normalized_entry_path`. Entries
/// are handled in stream order, one at a time, and each entry's content is
/// piped straight from the decoder into the store.
///
/// Returns the per-entry report on success. Per-entry put failures do not
/// fail the call; corrupt input and cancellation do.
pub fn extract_archive<R: Read>(
    store: &dyn BlobStore,
    identity: &Identity,
    sub_dir: Option<&str>,
    input: R,
    cancel: &CancellationToken,
) -> ArchiveResult<TransferReport> {
    let fault = GzipFault::default();
    let decoder = TrackedDecoder {
        inner: MultiGzDecoder::new(input),
        fault: fault.clone(),
    };
    let mut archive = tar::Archive::new(decoder);
    let entries = archive.entries().map_err(|e| fault.classify(e))?;
    let mut report = TransferReport::new();

    for entry in entries {
        if cancel.is_cancelled() {
            return Err(ArchiveError::Cancelled);
        }
        let mut entry = entry.map_err(|e| fault.classify(e))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() {
            tracing::debug!(%name, "skipping directory entry");
            report.record(TransferOutcome::Skipped {
                name,
                reason: "directory".into(),
            });
            continue;
        }
        if !matches!(entry_type, EntryType::Regular | EntryType::Continuous) {
            tracing::debug!(%name, ?entry_type, "skipping non-file entry");
            report.record(TransferOutcome::Skipped {
                name,
                reason: format!("unsupported entry type {entry_type:?}"),
            });
            continue;
        }
        let Some(key) = ObjectKey::in_dir(identity, sub_dir, &name) else {
            tracing::debug!(%name, "skipping entry with empty path");
            report.record(TransferOutcome::Skipped {
                name,
                reason: "empty path".into(),
            });
            continue;
        };

        let size = entry.size();
        match put_object(store, identity, &key, &mut entry, size, cancel) {
            Ok(()) => report.record(TransferOutcome::Stored { key, size }),
            Err(StoreError::Cancelled) => return Err(ArchiveError::Cancelled),
            Err(e) => {
                if let Some(reason) = fault.take() {
                    return Err(DecodeError::Compression(reason).into());
                }
                if let StoreError::Truncated { .. } = e {
                    return Err(DecodeError::Archive(format!("entry {name}: {e}")).into());
                }
                tracing::warn!(%key, error = %e, "failed to store archive entry");
                report.record(TransferOutcome::Failed {
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        identity = %identity,
        stored = report.stored(),
        skipped = report.skipped(),
        failed = report.failed(),
        bytes = report.bytes_stored(),
        "archive extraction complete"
    );
    Ok(report)
}

/// First read error raised by the gzip layer, if any.
#[derive(Clone, Default)]
struct GzipFault(Rc<RefCell<Option<String>>>);

impl GzipFault {
    fn set(&self, err: &io::Error) {
        let mut slot = self.0.borrow_mut();
        if slot.is_none() {
            *slot = Some(err.to_string());
        }
    }

    fn take(&self) -> Option<String> {
        self.0.borrow_mut().take()
    }

    /// A tar error caused by the gzip layer is a compression fault.
    fn classify(&self, err: io::Error) -> ArchiveError {
        match self.take() {
            Some(reason) => DecodeError::Compression(reason).into(),
            None => DecodeError::Archive(err.to_string()).into(),
        }
    }
}

struct TrackedDecoder<R: Read> {
    inner: MultiGzDecoder<R>,
    fault: GzipFault,
}

impl<R: Read> Read for TrackedDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|e| self.fault.set(e))
    }
}
