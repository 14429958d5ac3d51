//! The contract between repositories and storage backends.
//!
//! An [`Adapter`] hands out one [`Storage`] per aggregate definition and
//! exposes a single [`Transaction`] shared by all of them. Storages work
//! on the raw model only.

pub mod memory;
mod pending;

pub use pending::{PendingWrite, PendingWrites};

use std::sync::Arc;
use uuid::Uuid;

use crate::definition::Definition;
use crate::error::CoreResult;
use crate::raw::{Aggregate, Diff};
use crate::specification::{Sort, Specification};

/// A storage backend.
pub trait Adapter: Send + Sync {
    /// Short name of the backend, used in errors and logs.
    fn name(&self) -> &'static str;

    /// Returns the storage for one aggregate.
    fn storage(&self, definition: Arc<Definition>) -> CoreResult<Box<dyn Storage>>;

    /// The backend's transaction.
    fn transaction(&self) -> &dyn Transaction;
}

/// Transaction boundary of a backend.
pub trait Transaction: Send + Sync {
    /// Starts a transaction.
    fn start(&self) -> CoreResult<()>;

    /// Makes every write since `start` durable.
    fn commit(&self) -> CoreResult<()>;

    /// Discards every write since `start`.
    fn rollback(&self) -> CoreResult<()>;
}

/// Persistence of one aggregate in raw form.
pub trait Storage: Send + Sync {
    /// Loads an aggregate.
    fn get(&self, id: Uuid) -> CoreResult<Option<Aggregate>>;

    /// Returns true if the aggregate exists.
    fn contains(&self, id: Uuid) -> CoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Stores a new aggregate.
    fn add(&self, aggregate: &Aggregate) -> CoreResult<()>;

    /// Applies a diff to a stored aggregate.
    fn update(&self, diff: &Diff) -> CoreResult<()>;

    /// Removes an aggregate with its entities, optionals and collections.
    /// Removing an unknown id does nothing.
    fn remove(&self, id: Uuid) -> CoreResult<()>;

    /// Loads every aggregate selected by `fetch`.
    fn fetch(&self, fetch: &Fetch) -> CoreResult<Vec<Aggregate>>;

    /// Counts the aggregates matching `specification`.
    fn size(&self, specification: Option<&Specification>) -> CoreResult<usize>;

    /// Returns true if some aggregate matches `specification`.
    fn any(&self, specification: Option<&Specification>) -> CoreResult<bool> {
        let fetch = Fetch {
            specification: specification.cloned(),
            take: Some(1),
            ..Fetch::default()
        };
        Ok(!self.fetch(&fetch)?.is_empty())
    }
}

/// What to load.
#[derive(Debug, Clone, Default)]
pub struct Fetch {
    /// Filter, or everything when `None`.
    pub specification: Option<Specification>,
    /// Ordering.
    pub sort: Option<Sort>,
    /// Number of leading aggregates to skip.
    pub drop: Option<usize>,
    /// Maximum number of aggregates to return.
    pub take: Option<usize>,
}

impl Fetch {
    /// Fetches everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Fetches what matches `specification`.
    #[must_use]
    pub fn matching(specification: Specification) -> Self {
        Self {
            specification: Some(specification),
            ..Self::default()
        }
    }

    /// Sets the ordering.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Skips the first `count` aggregates.
    #[must_use]
    pub fn drop(mut self, count: usize) -> Self {
        self.drop = Some(count);
        self
    }

    /// Returns at most `count` aggregates.
    #[must_use]
    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }
}
