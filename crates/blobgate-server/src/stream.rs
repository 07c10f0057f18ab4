//! Plumbing between async HTTP bodies and the blocking transfer core.
//!
//! Uploads are spooled to an anonymous temp file so their size is known
//! and the limit enforced before any storage call. Downloads run a
//! blocking producer that writes into an in-memory pipe whose read half
//! becomes the response body.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::multipart::{Field, MultipartError};
use futures::Stream;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{ServerError, ServerResult};

/// Capacity of the in-memory pipe feeding a response body.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Copy one multipart field into an anonymous temp file.
///
/// Returns the file rewound to its start together with its size. Fails
/// with a validation error as soon as more than `limit` bytes arrive.
pub async fn spool_field(mut field: Field<'_>, limit: u64) -> ServerResult<(File, u64)> {
    let spool = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
    let mut spool = tokio::fs::File::from_std(spool);
    let mut size = 0u64;

    while let Some(chunk) = field.chunk().await.map_err(form_error)? {
        size += chunk.len() as u64;
        if size > limit {
            return Err(too_large(limit));
        }
        spool.write_all(&chunk).await?;
    }
    spool.flush().await?;

    let mut spool = spool.into_std().await;
    spool.seek(SeekFrom::Start(0))?;
    Ok((spool, size))
}

/// Response body fed by a blocking producer.
///
/// `produce` runs on the blocking pool and writes into the pipe; the
/// response streams whatever it writes. When the body is dropped (client
/// gone, response finished) `cancel` fires so the producer can stop.
pub fn blocking_body<F>(cancel: CancellationToken, produce: F) -> Body
where
    F: FnOnce(SyncIoBridge<DuplexStream>) + Send + 'static,
{
    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    let sink = SyncIoBridge::new(writer);
    tokio::task::spawn_blocking(move || produce(sink));

    Body::from_stream(CancelOnDrop {
        inner: ReaderStream::new(reader),
        _guard: cancel.drop_guard(),
    })
}

/// Stream wrapper that cancels a token when dropped.
struct CancelOnDrop<S> {
    inner: S,
    _guard: DropGuard,
}

impl<S: Stream + Unpin> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

pub fn form_error(err: MultipartError) -> ServerError {
    tracing::debug!(error = %err, "malformed multipart body");
    if err.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE {
        return ServerError::Validation("File too large".into());
    }
    ServerError::Validation("Failed to parse form".into())
}

fn too_large(limit: u64) -> ServerError {
    ServerError::Validation(format!("File too large (limit {limit} bytes)"))
}
