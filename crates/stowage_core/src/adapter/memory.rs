//! In-memory adapter.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Adapter, Fetch, PendingWrite, PendingWrites, Storage, Transaction};
use crate::definition::Definition;
use crate::error::CoreResult;
use crate::raw::{Aggregate, Diff};
use crate::specification::{memory, Specification};

#[derive(Debug, Default)]
struct State {
    committed: HashMap<String, BTreeMap<Uuid, Aggregate>>,
    pending: PendingWrites,
}

impl State {
    fn visible(&self, model: &str, id: Uuid) -> Option<Aggregate> {
        match self.pending.get(model, id) {
            Some(PendingWrite::Put { aggregate }) => Some(aggregate.clone()),
            Some(PendingWrite::Delete) => None,
            None => self
                .committed
                .get(model)
                .and_then(|aggregates| aggregates.get(&id))
                .cloned(),
        }
    }

    fn all(&self, model: &str) -> Vec<Aggregate> {
        let mut merged: BTreeMap<Uuid, Aggregate> =
            self.committed.get(model).cloned().unwrap_or_default();
        for (id, write) in self.pending.of(model) {
            match write {
                PendingWrite::Put { aggregate } => {
                    merged.insert(id, aggregate.clone());
                }
                PendingWrite::Delete => {
                    merged.remove(&id);
                }
            }
        }
        merged.into_values().collect()
    }
}

/// Adapter keeping every aggregate in memory.
///
/// Writes are buffered until commit and discarded on rollback. Useful for
/// tests and as the reference behaviour for other adapters.
#[derive(Debug, Clone)]
pub struct InMemoryAdapter {
    transaction: MemoryTransaction,
}

impl InMemoryAdapter {
    /// Creates an empty adapter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transaction: MemoryTransaction {
                state: Arc::new(Mutex::new(State::default())),
            },
        }
    }

    /// Number of committed aggregates named `model`.
    #[must_use]
    pub fn committed(&self, model: &str) -> usize {
        self.transaction
            .state
            .lock()
            .committed
            .get(model)
            .map_or(0, BTreeMap::len)
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for InMemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn storage(&self, definition: Arc<Definition>) -> CoreResult<Box<dyn Storage>> {
        Ok(Box::new(MemoryStorage {
            definition,
            state: Arc::clone(&self.transaction.state),
        }))
    }

    fn transaction(&self) -> &dyn Transaction {
        &self.transaction
    }
}

#[derive(Debug, Clone)]
struct MemoryTransaction {
    state: Arc<Mutex<State>>,
}

impl Transaction for MemoryTransaction {
    fn start(&self) -> CoreResult<()> {
        self.state.lock().pending.clear();
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        let writes = state.pending.drain();
        debug!(writes = writes.len(), "committing in-memory transaction");
        for (model, id, write) in writes {
            let aggregates = state.committed.entry(model).or_default();
            match write {
                PendingWrite::Put { aggregate } => {
                    aggregates.insert(id, aggregate);
                }
                PendingWrite::Delete => {
                    aggregates.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn rollback(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        debug!(writes = state.pending.len(), "rolling back in-memory transaction");
        state.pending.clear();
        Ok(())
    }
}

struct MemoryStorage {
    definition: Arc<Definition>,
    state: Arc<Mutex<State>>,
}

impl MemoryStorage {
    fn model(&self) -> &str {
        self.definition.name()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, id: Uuid) -> CoreResult<Option<Aggregate>> {
        Ok(self.state.lock().visible(self.model(), id))
    }

    fn add(&self, aggregate: &Aggregate) -> CoreResult<()> {
        self.state
            .lock()
            .pending
            .put(self.model(), aggregate.clone());
        Ok(())
    }

    fn update(&self, diff: &Diff) -> CoreResult<()> {
        let mut state = self.state.lock();
        let Some(mut aggregate) = state.visible(self.model(), diff.id.value) else {
            warn!(model = self.model(), id = %diff.id.value, "update of a missing aggregate ignored");
            return Ok(());
        };
        aggregate.apply(diff)?;
        state.pending.put(self.model(), aggregate);
        Ok(())
    }

    fn remove(&self, id: Uuid) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.visible(self.model(), id).is_some() {
            state.pending.delete(self.model(), id);
        }
        Ok(())
    }

    fn fetch(&self, fetch: &Fetch) -> CoreResult<Vec<Aggregate>> {
        let all = self.state.lock().all(self.model());
        memory::select(
            all,
            fetch.specification.as_ref(),
            fetch.sort.as_ref(),
            fetch.drop,
            fetch.take,
            &self.definition,
        )
    }

    fn size(&self, specification: Option<&Specification>) -> CoreResult<usize> {
        let all = self.state.lock().all(self.model());
        Ok(memory::select(all, specification, None, None, None, &self.definition)?.len())
    }
}
