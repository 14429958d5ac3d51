//! SQLite driver.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};
use stowage_core::Value;

use crate::connection::{Connection, Row, Statement};
use crate::error::SqlResult;

/// A [`Connection`] backed by one SQLite session.
///
/// Connections are opened with `foreign_keys=ON`, so child rows follow the
/// cascade rules of the generated tables, and `case_sensitive_like=ON`, so
/// pattern comparators match case the way the other backends do.
pub struct SqliteConnection {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteConnection {
    /// Opens or creates a database file.
    pub fn open(path: impl AsRef<Path>) -> SqlResult<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "opening sqlite database");
        Self::bootstrap(rusqlite::Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> SqlResult<Self> {
        tracing::debug!("opening in-memory sqlite database");
        Self::bootstrap(rusqlite::Connection::open_in_memory()?)
    }

    fn bootstrap(conn: rusqlite::Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA case_sensitive_like = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection").finish_non_exhaustive()
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl Connection for SqliteConnection {
    fn execute(&self, statement: &Statement) -> SqlResult<usize> {
        tracing::trace!(sql = %statement.sql, parameters = statement.parameters.len(), "execute");
        let conn = self.conn.lock();
        let affected = conn.execute(
            &statement.sql,
            params_from_iter(statement.parameters.iter().map(to_sql)),
        )?;
        Ok(affected)
    }

    fn query(&self, statement: &Statement) -> SqlResult<Vec<Row>> {
        tracing::trace!(sql = %statement.sql, parameters = statement.parameters.len(), "query");
        let conn = self.conn.lock();
        let mut prepared = conn.prepare(&statement.sql)?;
        let width = prepared.column_count();
        let mut rows = prepared.query(params_from_iter(statement.parameters.iter().map(to_sql)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(from_sql(row.get_ref(index)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn batch(&self, sql: &str) -> SqlResult<()> {
        tracing::trace!(%sql, "batch");
        self.conn.lock().execute_batch(sql)?;
        Ok(())
    }
}
