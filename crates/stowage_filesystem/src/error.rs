//! Error types for the filesystem adapter.

use stowage_core::CoreError;
use stowage_storage::StorageError;
use thiserror::Error;

/// Result type for filesystem adapter operations.
pub type FilesystemResult<T> = Result<T, FilesystemError>;

/// Errors raised by the filesystem adapter.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// The underlying filesystem failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A file couldn't be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored file doesn't fit the aggregate.
    #[error("malformed file {path}: {message}")]
    Malformed {
        /// Path of the file.
        path: String,
        /// Description of the problem.
        message: String,
    },
}

impl FilesystemError {
    /// Creates a malformed file error.
    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<FilesystemError> for CoreError {
    fn from(err: FilesystemError) -> Self {
        CoreError::adapter("filesystem", err)
    }
}
