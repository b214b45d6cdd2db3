//! Item store error types

use thiserror::Error;

/// Errors that can occur in the item store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed (snapshot files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value or snapshot did not (de)serialize
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
