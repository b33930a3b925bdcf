//! Store error kinds.

use std::io;

use thiserror::Error;

pub(crate) type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store's public API.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key was never written, or its newest entry is a tombstone.
    #[error("record does not exist")]
    NotFound,

    /// An underlying I/O failure, including a stream ending mid-frame.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame whose declared sizes are internally inconsistent.
    #[error("corrupt frame")]
    Corrupt,

    /// The stored value carries a different type tag than was asked for.
    #[error("invalid data type")]
    TypeMismatch,

    /// The store's background loops are gone; no further operations will
    /// succeed.
    #[error("store is closed")]
    Closed,
}
