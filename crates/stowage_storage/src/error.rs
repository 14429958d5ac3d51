//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The path is absolute or escapes the filesystem root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A directory was found where a file was expected, or the reverse.
    #[error("path conflict: {0}")]
    Conflict(String),
}
