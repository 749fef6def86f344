//! Store error types.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from a graph store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The path could not be read or written (peer offline, storage error).
    #[error("store unavailable at {0}")]
    Unavailable(String),
    /// The store refused the path or the write.
    #[error("rejected at {path}: {reason}")]
    Rejected { path: String, reason: String },
}

impl StoreError {
    pub fn unavailable(path: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(path.to_string())
    }
}
