use thiserror::Error;

/// Errors produced by type construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("identity must not be empty")]
    EmptyIdentity,

    #[error("invalid identity {identity:?}: {reason}")]
    InvalidIdentity { identity: String, reason: String },
}
