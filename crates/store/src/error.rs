//! Session store error types.

use thiserror::Error;

/// Session store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Core(#[from] forklift_core::Error),
}

/// Result type for session store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
