//! The filesystem [`Adapter`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use stowage_core::adapter::{Adapter, Fetch, PendingWrite, PendingWrites, Storage, Transaction};
use stowage_core::definition::Definition;
use stowage_core::raw::{Aggregate, Diff};
use stowage_core::specification::{memory, Specification};
use stowage_core::CoreResult;
use stowage_storage::{Filesystem, InMemoryFilesystem, LocalFilesystem};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::FilesystemError;
use crate::layout;

/// Stores every aggregate as a directory of JSON files.
///
/// Writes go to an in-memory overlay and reach the filesystem on commit.
/// Reads see the overlay first. A rollback drops the overlay.
#[derive(Clone)]
pub struct FilesystemAdapter {
    transaction: FilesystemTransaction,
}

impl FilesystemAdapter {
    /// Creates an adapter over `filesystem`.
    pub fn new(filesystem: impl Filesystem + 'static) -> Self {
        Self {
            transaction: FilesystemTransaction {
                filesystem: Arc::new(filesystem),
                pending: Arc::new(Mutex::new(PendingWrites::new())),
            },
        }
    }

    /// Creates an adapter rooted at a local directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be created.
    pub fn local(root: &Path) -> CoreResult<Self> {
        let filesystem = LocalFilesystem::open(root).map_err(FilesystemError::from)?;
        Ok(Self::new(filesystem))
    }

    /// Creates an adapter over a fresh [`InMemoryFilesystem`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(InMemoryFilesystem::new())
    }

    /// The underlying filesystem.
    #[must_use]
    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.transaction.filesystem
    }

    /// Number of aggregates with uncommitted writes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.transaction.pending.lock().len()
    }
}

impl std::fmt::Debug for FilesystemAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemAdapter")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Adapter for FilesystemAdapter {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn storage(&self, definition: Arc<Definition>) -> CoreResult<Box<dyn Storage>> {
        Ok(Box::new(FilesystemStorage {
            filesystem: Arc::clone(&self.transaction.filesystem),
            pending: Arc::clone(&self.transaction.pending),
            definition,
        }))
    }

    fn transaction(&self) -> &dyn Transaction {
        &self.transaction
    }
}

#[derive(Clone)]
struct FilesystemTransaction {
    filesystem: Arc<dyn Filesystem>,
    pending: Arc<Mutex<PendingWrites>>,
}

impl Transaction for FilesystemTransaction {
    fn start(&self) -> CoreResult<()> {
        self.pending.lock().clear();
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        let writes = self.pending.lock().drain();
        debug!(writes = writes.len(), "flushing filesystem overlay");
        for (model, id, write) in writes {
            match write {
                PendingWrite::Put { aggregate } => {
                    trace!(%model, %id, "write");
                    layout::write(self.filesystem.as_ref(), &model, &aggregate)?;
                }
                PendingWrite::Delete => {
                    trace!(%model, %id, "remove");
                    layout::remove(self.filesystem.as_ref(), &model, id)?;
                }
            }
        }
        Ok(())
    }

    fn rollback(&self) -> CoreResult<()> {
        let mut pending = self.pending.lock();
        debug!(writes = pending.len(), "dropping filesystem overlay");
        pending.clear();
        Ok(())
    }
}

struct FilesystemStorage {
    filesystem: Arc<dyn Filesystem>,
    pending: Arc<Mutex<PendingWrites>>,
    definition: Arc<Definition>,
}

impl FilesystemStorage {
    fn model(&self) -> &str {
        self.definition.name()
    }

    fn visible(&self, pending: &PendingWrites, id: Uuid) -> CoreResult<Option<Aggregate>> {
        match pending.get(self.model(), id) {
            Some(PendingWrite::Put { aggregate }) => Ok(Some(aggregate.clone())),
            Some(PendingWrite::Delete) => Ok(None),
            None => layout::read(self.filesystem.as_ref(), &self.definition, id),
        }
    }

    fn all(&self) -> CoreResult<Vec<Aggregate>> {
        let pending = self.pending.lock();
        let mut merged = BTreeMap::new();
        for id in layout::ids(self.filesystem.as_ref(), self.model())? {
            if pending.get(self.model(), id).is_none() {
                if let Some(aggregate) = layout::read(self.filesystem.as_ref(), &self.definition, id)? {
                    merged.insert(id, aggregate);
                }
            }
        }
        for (id, write) in pending.of(self.model()) {
            if let PendingWrite::Put { aggregate } = write {
                merged.insert(id, aggregate.clone());
            }
        }
        Ok(merged.into_values().collect())
    }
}

impl Storage for FilesystemStorage {
    fn get(&self, id: Uuid) -> CoreResult<Option<Aggregate>> {
        let pending = self.pending.lock();
        self.visible(&pending, id)
    }

    fn add(&self, aggregate: &Aggregate) -> CoreResult<()> {
        self.pending.lock().put(self.model(), aggregate.clone());
        Ok(())
    }

    fn update(&self, diff: &Diff) -> CoreResult<()> {
        let mut pending = self.pending.lock();
        let Some(mut aggregate) = self.visible(&pending, diff.id.value)? else {
            warn!(model = self.model(), id = %diff.id.value, "update of a missing aggregate ignored");
            return Ok(());
        };
        aggregate.apply(diff)?;
        pending.put(self.model(), aggregate);
        Ok(())
    }

    fn remove(&self, id: Uuid) -> CoreResult<()> {
        let mut pending = self.pending.lock();
        if self.visible(&pending, id)?.is_some() {
            pending.delete(self.model(), id);
        }
        Ok(())
    }

    fn fetch(&self, fetch: &Fetch) -> CoreResult<Vec<Aggregate>> {
        memory::select(
            self.all()?,
            fetch.specification.as_ref(),
            fetch.sort.as_ref(),
            fetch.drop,
            fetch.take,
            &self.definition,
        )
    }

    fn size(&self, specification: Option<&Specification>) -> CoreResult<usize> {
        Ok(memory::select(self.all()?, specification, None, None, None, &self.definition)?.len())
    }
}
