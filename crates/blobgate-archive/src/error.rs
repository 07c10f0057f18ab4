use blobgate_store::StoreError;
use thiserror::Error;

/// The inbound archive itself cannot be trusted.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid gzip stream: {0}")]
    Compression(String),

    #[error("invalid tar archive: {0}")]
    Archive(String),
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Listing the source prefix failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Writing the outbound archive failed, usually a closed connection.
    #[error("failed to write archive: {0}")]
    Output(std::io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
