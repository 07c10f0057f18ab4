use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use blobgate_archive::{ArchiveError, DecodeError};
use blobgate_store::StoreError;
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or malformed request input; nothing was stored.
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("invalid archive: {0}")]
    Decode(#[from] DecodeError),

    #[error("not found: {0}")]
    NotFound(String),

    /// The storage service failed a single-object request.
    #[error("{0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream(_) | Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to the client. Internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Upstream(msg) => msg.clone(),
            Self::Unauthorized => "Unauthorized".into(),
            Self::Decode(DecodeError::Compression(_)) => "Invalid gzip file".into(),
            Self::Decode(DecodeError::Archive(_)) => "Invalid tar file".into(),
            Self::NotFound(_) => "File not found or access denied".into(),
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "Internal server error".into(),
        }
    }
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => Self::NotFound(key),
            other => {
                tracing::error!(error = %other, "storage request failed");
                Self::Upstream("Storage request failed".into())
            }
        }
    }
}

impl From<ArchiveError> for ServerError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Decode(e) => Self::Decode(e),
            ArchiveError::Store(e) => e.into(),
            ArchiveError::Output(e) => Self::Io(e),
            ArchiveError::Cancelled => Self::Internal("operation cancelled".into()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(ApiResponse::error(self.public_message()))).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ServerError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ServerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::NotFound("k".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServerError::Upstream("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::from(DecodeError::Archive("bad".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn decode_messages_distinguish_layers() {
        let gzip = ServerError::from(DecodeError::Compression("bad header".into()));
        let tar = ServerError::from(DecodeError::Archive("bad checksum".into()));
        assert_eq!(gzip.public_message(), "Invalid gzip file");
        assert_eq!(tar.public_message(), "Invalid tar file");
    }

    #[test]
    fn store_errors_convert() {
        let not_found = ServerError::from(StoreError::NotFound("alice/x".into()));
        assert!(matches!(not_found, ServerError::NotFound(_)));

        let upstream = ServerError::from(StoreError::Upstream("503".into()));
        assert!(matches!(upstream, ServerError::Upstream(_)));
        assert_eq!(upstream.public_message(), "Storage request failed");
    }

    #[test]
    fn internal_details_are_hidden() {
        let err = ServerError::Internal("thread panicked at secret.rs".into());
        assert_eq!(err.public_message(), "Internal server error");
    }
}
