//! Error types for the relational adapter.

use stowage_core::CoreError;
use thiserror::Error;

/// Result type for relational operations.
pub type SqlResult<T> = Result<T, SqlError>;

/// Errors raised by the relational adapter.
#[derive(Debug, Error)]
pub enum SqlError {
    /// The SQLite driver failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A row didn't have the expected shape.
    #[error("malformed row in {table}: {message}")]
    MalformedRow {
        /// Table the row was read from.
        table: String,
        /// Description of the problem.
        message: String,
    },

    /// A statement was rejected by the driver boundary.
    #[error("statement failed: {0}")]
    Statement(String),
}

impl SqlError {
    /// Creates a malformed row error.
    pub fn malformed(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedRow {
            table: table.into(),
            message: message.into(),
        }
    }
}

impl From<SqlError> for CoreError {
    fn from(err: SqlError) -> Self {
        CoreError::adapter("sql", err)
    }
}
