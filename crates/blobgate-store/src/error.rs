/// Errors from blob storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The storage service rejected or failed the request.
    #[error("upstream storage error: {0}")]
    Upstream(String),

    /// The body ended before the declared size was reached.
    #[error("body for {key} truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// The request was cancelled while the call was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error while reading a body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            other => Self::Upstream(other.to_string()),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
