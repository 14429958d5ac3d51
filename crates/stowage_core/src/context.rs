//! Per-manager state shared by its repositories.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::normalize::References;
use crate::raw::Aggregate;

/// Whether repositories may mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction is running; repositories are read-only.
    Idle,
    /// A transaction is running.
    Mutable,
}

/// Identifies the manager a sub-query was built by.
#[derive(Clone, Default)]
pub struct ContextToken(Arc<()>);

impl ContextToken {
    /// Creates a fresh token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if both tokens come from the same manager.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ContextToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextToken({:p})", Arc::as_ptr(&self.0))
    }
}

/// State shared by a manager and its repositories.
#[derive(Debug)]
pub struct Context {
    token: ContextToken,
    config: Config,
    state: Mutex<TransactionState>,
    identity: Mutex<HashMap<(&'static str, Uuid), Aggregate>>,
    references: References,
}

impl Context {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            token: ContextToken::new(),
            references: References::new(config.reference_tracking),
            config,
            state: Mutex::new(TransactionState::Idle),
            identity: Mutex::new(HashMap::new()),
        }
    }

    /// Token identifying this context.
    #[must_use]
    pub fn token(&self) -> &ContextToken {
        &self.token
    }

    /// Current transaction state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Collection element references.
    #[must_use]
    pub fn references(&self) -> &References {
        &self.references
    }

    /// Fails unless a transaction is running.
    pub(crate) fn ensure_mutable(&self, operation: &'static str, model: &str) -> CoreResult<()> {
        match self.state() {
            TransactionState::Mutable => Ok(()),
            TransactionState::Idle => Err(CoreError::illegal_mutation(operation, model)),
        }
    }

    /// Enters the mutable state.
    pub(crate) fn begin(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        if *state == TransactionState::Mutable {
            return Err(CoreError::NestedTransaction);
        }
        *state = TransactionState::Mutable;
        self.identity.lock().clear();
        Ok(())
    }

    /// Leaves the mutable state and forgets cached snapshots and element
    /// references.
    ///
    /// A later `put` remembers the references of the stored snapshot again
    /// before diffing, so nothing carries over between transactions.
    pub(crate) fn end(&self) {
        *self.state.lock() = TransactionState::Idle;
        self.identity.lock().clear();
        self.references.clear();
    }

    /// Returns the cached snapshot of an aggregate.
    pub(crate) fn cached(&self, model: &'static str, id: Uuid) -> Option<Aggregate> {
        if !self.config.identity_map {
            return None;
        }
        self.identity.lock().get(&(model, id)).cloned()
    }

    /// Caches the snapshot of an aggregate for the running transaction.
    pub(crate) fn cache(&self, model: &'static str, aggregate: Aggregate) {
        if !self.config.identity_map || self.state() != TransactionState::Mutable {
            return;
        }
        trace!(model, id = %aggregate.id.value, "snapshot cached");
        self.identity
            .lock()
            .insert((model, aggregate.id.value), aggregate);
    }

    /// Drops the cached snapshot of an aggregate.
    pub(crate) fn evict(&self, model: &'static str, id: Uuid) {
        self.identity.lock().remove(&(model, id));
    }
}
