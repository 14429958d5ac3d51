//! The driver boundary.

use stowage_core::Value;

use crate::error::SqlResult;

/// A SQL statement with positional `?` parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub parameters: Vec<Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    /// Creates a statement with parameters.
    pub fn with(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }
}

/// A row of column values, in select order.
pub type Row = Vec<Value>;

/// A connection to a relational database.
///
/// Implementations are expected to run everything on one session so that
/// `BEGIN`/`COMMIT` bracket the statements issued in between.
pub trait Connection: Send + Sync {
    /// Executes a statement and returns the number of affected rows.
    fn execute(&self, statement: &Statement) -> SqlResult<usize>;

    /// Runs a query and returns every row.
    fn query(&self, statement: &Statement) -> SqlResult<Vec<Row>>;

    /// Executes several parameterless statements separated by `;`.
    fn batch(&self, sql: &str) -> SqlResult<()>;
}
