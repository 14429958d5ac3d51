//! Error types for the document-store adapter.

use stowage_core::CoreError;
use thiserror::Error;

/// Result type for document-store operations.
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors raised by the document-store adapter.
#[derive(Debug, Error)]
pub enum SearchError {
    /// A body couldn't be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with an error status.
    #[error("request to {url} failed with status {status}: {body}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// A stored document doesn't fit the aggregate.
    #[error("malformed document {id} in {index}: {message}")]
    MalformedDocument {
        /// Index name.
        index: String,
        /// Document id.
        id: String,
        /// Description of the problem.
        message: String,
    },

    /// A query uses a construct the client can't evaluate.
    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),
}

impl SearchError {
    /// Creates a malformed document error.
    pub fn malformed(
        index: impl Into<String>,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedDocument {
            index: index.into(),
            id: id.into(),
            message: message.into(),
        }
    }
}

impl From<SearchError> for CoreError {
    fn from(err: SearchError) -> Self {
        CoreError::adapter("search", err)
    }
}
