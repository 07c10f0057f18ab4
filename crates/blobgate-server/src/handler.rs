use std::io::{self, BufReader};
use std::sync::Arc;

use axum::extract::multipart::Field;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Json, Response};
use axum::Extension;
use blobgate_archive::{archive_file_name, build_archive, extract_archive, TransferReport};
use blobgate_store::{get_object, list_prefix, put_object, StoreError, StoreResult};
use blobgate_types::{file_name, Identity, ObjectKey};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ServerError, ServerResult};
use crate::response::{ApiResponse, ListResponse};
use crate::state::AppState;
use crate::stream::{blocking_body, form_error, spool_field};

/// Multipart field holding the upload in `/push` and `/push-dir`.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
pub struct PullParams {
    pub file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PushDirParams {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PullDirParams {
    pub dir: Option<String>,
}

pub async fn health() -> Json<ApiResponse> {
    Json(ApiResponse::ok("OK"))
}

/// Store one uploaded file under the caller's namespace.
pub async fn push(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> ServerResult<Json<ApiResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_owned();
        let key = ObjectKey::new(&identity, &name)
            .ok_or_else(|| ServerError::Validation("Invalid file name".into()))?;
        let (mut spool, size) = spool_field(field, state.config.limits.max_push_bytes).await?;

        let store = Arc::clone(&state.store);
        let owner = identity.clone();
        let target = key.clone();
        run_cancellable(move |cancel| {
            put_object(&*store, &owner, &target, &mut spool, size, &cancel)
        })
        .await?
        .map_err(|e| {
            tracing::error!(%key, error = %e, "upload failed");
            ServerError::Upstream("Failed to upload file".into())
        })?;

        tracing::info!(%key, size, "file uploaded");
        return Ok(Json(ApiResponse::ok(format!(
            "File '{key}' uploaded successfully"
        ))));
    }
    Err(ServerError::Validation("No file provided".into()))
}

/// Stream one object back to its owner.
pub async fn pull(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<PullParams>,
) -> ServerResult<Response> {
    let requested = params.file.unwrap_or_default();
    let key = ObjectKey::new(&identity, &requested)
        .ok_or_else(|| ServerError::Validation("File parameter required".into()))?;

    // Until the body takes over the token, dropping this handler cancels the get.
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let opening = cancel.drop_guard();
    let store = Arc::clone(&state.store);
    let target = key.clone();
    let mut blob = run_blocking(move || get_object(&*store, &target, &token))
        .await?
        .map_err(|e| match e {
            StoreError::NotFound(_) => ServerError::NotFound(key.to_string()),
            other => {
                tracing::error!(%key, error = %other, "download failed");
                ServerError::Upstream("Failed to download file".into())
            }
        })?;

    let size = blob.size;
    let filename = file_name(&requested).unwrap_or_else(|| requested.clone());
    let streamed = key.clone();
    let body = blocking_body(opening.disarm(), move |mut sink| {
        match io::copy(&mut blob, &mut sink) {
            Ok(bytes) => tracing::info!(key = %streamed, bytes, "file downloaded"),
            Err(e) => tracing::warn!(key = %streamed, error = %e, "download interrupted"),
        }
    });

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_DISPOSITION, attachment(&filename))
        .header(header::CONTENT_TYPE, "application/octet-stream");
    if let Some(size) = size {
        response = response.header(header::CONTENT_LENGTH, size);
    }
    response
        .body(body)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Every key in the caller's namespace, relative to it.
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ServerResult<Json<ListResponse>> {
    let store = Arc::clone(&state.store);
    let owner = identity.clone();
    let files = run_cancellable(move |cancel| -> StoreResult<Vec<String>> {
        let mut files = Vec::new();
        for object in list_prefix(&*store, owner.namespace(), &cancel) {
            let object = object?;
            if let Some(name) = object.key.relative_to(&owner).filter(|n| !n.is_empty()) {
                files.push(name.to_owned());
            }
        }
        Ok(files)
    })
    .await?
    .map_err(|e| {
        tracing::error!(%identity, error = %e, "listing failed");
        ServerError::Upstream("Failed to list files".into())
    })?;

    Ok(Json(ListResponse {
        success: true,
        files,
    }))
}

/// Unpack an uploaded `.tar.gz` into individual objects.
pub async fn push_dir(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<PushDirParams>,
    mut multipart: Multipart,
) -> ServerResult<Json<ApiResponse>> {
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let report = extract_upload(&state, &identity, params.name, field).await?;
        if report.is_partial() {
            tracing::warn!(
                %identity,
                failed = report.failed(),
                entries = ?report.failures().collect::<Vec<_>>(),
                "archive extracted with failures"
            );
        }
        tracing::info!(
            %identity,
            stored = report.stored(),
            skipped = report.skipped(),
            bytes = report.bytes_stored(),
            "archive extracted"
        );
        return Ok(Json(ApiResponse::ok(format!(
            "Extracted and uploaded {} files to {}",
            report.stored(),
            state.store.bucket()
        ))));
    }
    Err(ServerError::Validation("No file provided".into()))
}

/// Spool the upload, then extract it once it is known to be within the
/// size limit. Nothing is stored for an oversized upload.
async fn extract_upload(
    state: &AppState,
    identity: &Identity,
    sub_dir: Option<String>,
    field: Field<'_>,
) -> ServerResult<TransferReport> {
    let (spool, size) = spool_field(field, state.config.limits.max_push_dir_bytes).await?;
    tracing::debug!(%identity, size, "archive upload received");

    let store = Arc::clone(&state.store);
    let owner = identity.clone();
    let report = run_cancellable(move |cancel| {
        let input = BufReader::new(spool);
        extract_archive(&*store, &owner, sub_dir.as_deref(), input, &cancel)
    })
    .await??;
    Ok(report)
}

/// Stream the caller's directory back as a `.tar.gz`.
pub async fn pull_dir(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<PullDirParams>,
) -> ServerResult<Response> {
    let dir = params.dir.unwrap_or_default();
    let filename = archive_file_name(&dir);

    let cancel = CancellationToken::new();
    let building = cancel.clone();
    let store = Arc::clone(&state.store);
    let body = blocking_body(cancel, move |sink| {
        match build_archive(&*store, &identity, &dir, sink, &building) {
            Ok(report) => {
                if report.is_partial() {
                    tracing::warn!(
                        %identity,
                        %dir,
                        failed = report.failed(),
                        "archive sent with missing entries"
                    );
                }
                tracing::info!(%identity, %dir, stored = report.stored(), "archive sent");
            }
            Err(e) => tracing::error!(%identity, %dir, error = %e, "archive aborted"),
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_DISPOSITION, attachment(&filename))
        .header(header::CONTENT_TYPE, "application/x-gzip")
        .body(body)
        .map_err(|e| ServerError::Internal(e.to_string()))
}

async fn run_blocking<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(join_error)
}

/// Like [`run_blocking`], but `f` gets a token that fires if the returned
/// future is dropped before completion (client gone).
async fn run_cancellable<T, F>(f: F) -> ServerResult<T>
where
    F: FnOnce(CancellationToken) -> T + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let _abandon = cancel.clone().drop_guard();
    run_blocking(move || f(cancel)).await
}

fn join_error(err: tokio::task::JoinError) -> ServerError {
    ServerError::Internal(format!("blocking task failed: {err}"))
}

/// `Content-Disposition` value for a download named `filename`.
fn attachment(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
