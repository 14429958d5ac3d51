//! The relational [`Adapter`].

use std::sync::Arc;

use stowage_core::adapter::{Adapter, Fetch, Storage, Transaction};
use stowage_core::definition::Definition;
use stowage_core::raw::{Aggregate, Diff};
use stowage_core::specification::Specification;
use stowage_core::{CoreResult, Value};
use uuid::Uuid;

use crate::compiler::compile;
use crate::config::SqlConfig;
use crate::connection::{Connection, Statement};
use crate::error::SqlResult;
use crate::rows;
use crate::schema::{ddl, quote};
use crate::sqlite::SqliteConnection;
use crate::writes;

/// Stores aggregates in relational tables.
///
/// ```
/// use stowage_core::Manager;
/// use stowage_sql::SqlAdapter;
///
/// let adapter = SqlAdapter::sqlite_in_memory().unwrap();
/// let manager = Manager::new(adapter);
/// assert!(!manager.in_transaction());
/// ```
#[derive(Clone)]
pub struct SqlAdapter {
    connection: Arc<dyn Connection>,
    config: SqlConfig,
    transaction: SqlTransaction,
}

impl std::fmt::Debug for SqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqlAdapter {
    /// Creates an adapter over a connection with the default configuration.
    pub fn new(connection: impl Connection + 'static) -> Self {
        Self::with_config(connection, SqlConfig::default())
    }

    /// Creates an adapter with a custom configuration.
    pub fn with_config(connection: impl Connection + 'static, config: SqlConfig) -> Self {
        let connection: Arc<dyn Connection> = Arc::new(connection);
        Self {
            transaction: SqlTransaction {
                connection: Arc::clone(&connection),
            },
            connection,
            config,
        }
    }

    /// Creates an adapter over a fresh in-memory SQLite database.
    pub fn sqlite_in_memory() -> SqlResult<Self> {
        Ok(Self::new(SqliteConnection::open_in_memory()?))
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }
}

impl Adapter for SqlAdapter {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn storage(&self, definition: Arc<Definition>) -> CoreResult<Box<dyn Storage>> {
        if self.config.create_tables {
            tracing::debug!(aggregate = definition.name(), "creating tables");
            for statement in ddl(&definition)? {
                self.connection.batch(&statement)?;
            }
        }
        Ok(Box::new(SqlStorage {
            connection: Arc::clone(&self.connection),
            definition,
        }))
    }

    fn transaction(&self) -> &dyn Transaction {
        &self.transaction
    }
}

/// Native `BEGIN`/`COMMIT`/`ROLLBACK`.
#[derive(Clone)]
pub struct SqlTransaction {
    connection: Arc<dyn Connection>,
}

impl std::fmt::Debug for SqlTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTransaction").finish_non_exhaustive()
    }
}

impl Transaction for SqlTransaction {
    fn start(&self) -> CoreResult<()> {
        tracing::debug!("begin");
        self.connection.batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        tracing::debug!("commit");
        self.connection.batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> CoreResult<()> {
        tracing::debug!("rollback");
        self.connection.batch("ROLLBACK")?;
        Ok(())
    }
}

struct SqlStorage {
    connection: Arc<dyn Connection>,
    definition: Arc<Definition>,
}

impl SqlStorage {
    fn run(&self, statements: Vec<Statement>) -> CoreResult<()> {
        for statement in &statements {
            self.connection.execute(statement)?;
        }
        Ok(())
    }

    fn load(&self, statement: &Statement) -> CoreResult<Vec<Aggregate>> {
        let mut aggregates = self
            .connection
            .query(statement)?
            .into_iter()
            .map(|row| rows::decode(&self.definition, row))
            .collect::<CoreResult<Vec<_>>>()?;
        rows::load_collections(self.connection.as_ref(), &self.definition, &mut aggregates)?;
        Ok(aggregates)
    }

    fn filter(&self, specification: Option<&Specification>) -> CoreResult<Option<crate::Clause>> {
        specification
            .map(|s| compile(s, &self.definition))
            .transpose()
    }
}

impl Storage for SqlStorage {
    fn get(&self, id: Uuid) -> CoreResult<Option<Aggregate>> {
        let key = &self.definition.id()?.name;
        let sql = format!(
            "{} WHERE {}.{} = ?",
            rows::select(&self.definition)?,
            quote(self.definition.name()),
            quote(key)
        );
        let statement = Statement::with(sql, vec![Value::Text(id.to_string())]);
        Ok(self.load(&statement)?.into_iter().next())
    }

    fn add(&self, aggregate: &Aggregate) -> CoreResult<()> {
        tracing::trace!(aggregate = self.definition.name(), id = %aggregate.id.value, "insert");
        self.run(writes::add(&self.definition, aggregate)?)
    }

    fn update(&self, diff: &Diff) -> CoreResult<()> {
        tracing::trace!(aggregate = self.definition.name(), id = %diff.id.value, "update");
        self.run(writes::apply(&self.definition, diff)?)
    }

    fn remove(&self, id: Uuid) -> CoreResult<()> {
        tracing::trace!(aggregate = self.definition.name(), %id, "delete");
        self.run(writes::remove(&self.definition, id)?)
    }

    fn fetch(&self, fetch: &Fetch) -> CoreResult<Vec<Aggregate>> {
        let statement = rows::finish(
            rows::select(&self.definition)?,
            self.filter(fetch.specification.as_ref())?,
            fetch.sort.as_ref(),
            fetch.drop,
            fetch.take,
            &self.definition,
        )?;
        self.load(&statement)
    }

    fn size(&self, specification: Option<&Specification>) -> CoreResult<usize> {
        let statement = rows::finish(
            format!("SELECT COUNT(*) {}", rows::from(&self.definition)?),
            self.filter(specification)?,
            None,
            None,
            None,
            &self.definition,
        )?;
        let count = self
            .connection
            .query(&statement)?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .and_then(|v| v.as_integer())
            .unwrap_or(0);
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn any(&self, specification: Option<&Specification>) -> CoreResult<bool> {
        let statement = rows::finish(
            format!("SELECT 1 {}", rows::from(&self.definition)?),
            self.filter(specification)?,
            None,
            None,
            Some(1),
            &self.definition,
        )?;
        Ok(!self.connection.query(&statement)?.is_empty())
    }
}
