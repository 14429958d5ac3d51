//! # stowage sql
//!
//! Relational adapter for stowage.
//!
//! Every aggregate gets a table, every entity and optional a child table
//! keyed by the parent id, and every collection a child table keyed by
//! the element reference. [`ddl`] renders that layout; with
//! [`SqlConfig::create_tables`] set the adapter applies it when a
//! repository is first opened.
//!
//! Specifications compile to a `WHERE` clause over the aggregate table
//! joined with its entity and optional tables. Updates touch only the
//! columns and collection rows a diff names. Transactions map to native
//! `BEGIN`, `COMMIT` and `ROLLBACK`.
//!
//! ## Example
//!
//! ```rust
//! use stowage_sql::{SqlAdapter, SqliteConnection, SqlConfig};
//!
//! let connection = SqliteConnection::open_in_memory().unwrap();
//! let adapter = SqlAdapter::with_config(connection, SqlConfig::new().create_tables(true));
//! # let _ = adapter;
//! ```

mod adapter;
mod compiler;
mod config;
mod connection;
mod error;
mod rows;
mod schema;
mod sqlite;
mod writes;

pub use adapter::{SqlAdapter, SqlTransaction};
pub use compiler::{compile, Clause};
pub use config::SqlConfig;
pub use connection::{Connection, Row, Statement};
pub use error::{SqlError, SqlResult};
pub use schema::{ddl, SqlColumn};
pub use sqlite::SqliteConnection;
