//! Typed repositories.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::adapter::{Fetch, Storage};
use crate::context::Context;
use crate::definition::{Aggregate, Definition, Mapping};
use crate::error::CoreResult;
use crate::id::Id;
use crate::normalize::diff;
use crate::raw;
use crate::specification::{resolve_sub_queries, Direction, Sort, Specification, SubQuery};
use crate::value::Value;

struct Inner<M> {
    mapping: Arc<Mapping<M>>,
    storage: Box<dyn Storage>,
    context: Arc<Context>,
}

/// Loads and stores aggregates of type `M`.
///
/// Obtained from [`crate::Manager::repository`]. Reads work at any time;
/// `put` and `remove` need a running transaction.
pub struct Repository<M> {
    inner: Arc<Inner<M>>,
}

impl<M> Clone for Repository<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> fmt::Debug for Repository<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("model", &self.inner.mapping.definition().name())
            .finish_non_exhaustive()
    }
}

impl<M: Aggregate> Repository<M> {
    pub(crate) fn new(mapping: Arc<Mapping<M>>, storage: Box<dyn Storage>, context: Arc<Context>) -> Self {
        Self {
            inner: Arc::new(Inner {
                mapping,
                storage,
                context,
            }),
        }
    }

    /// The definition of `M`.
    #[must_use]
    pub fn definition(&self) -> &Definition {
        self.inner.mapping.definition()
    }

    fn rebuild(&self, raw: raw::Aggregate) -> CoreResult<M> {
        let context = &self.inner.context;
        context.cache(M::NAME, raw.clone());
        self.inner.mapping.denormalize(raw, context.references())
    }

    fn resolve(&self, specification: Option<Specification>) -> CoreResult<Option<Specification>> {
        specification
            .map(|s| resolve_sub_queries(s, self.inner.context.token()))
            .transpose()
    }

    /// Loads an aggregate.
    pub fn get(&self, id: &Id<M>) -> CoreResult<Option<M>> {
        self.inner
            .storage
            .get(id.to_uuid())?
            .map(|raw| self.rebuild(raw))
            .transpose()
    }

    /// Returns true if the aggregate exists.
    pub fn contains(&self, id: &Id<M>) -> CoreResult<bool> {
        self.inner.storage.contains(id.to_uuid())
    }

    /// Stores an aggregate: adds it when new, otherwise writes only what
    /// changed since it was loaded.
    pub fn put(&self, aggregate: &M) -> CoreResult<()> {
        let Inner {
            mapping,
            storage,
            context,
        } = &*self.inner;
        context.ensure_mutable("put", M::NAME)?;

        let id = mapping.identify(aggregate)?;
        let then = match context.cached(M::NAME, id) {
            Some(cached) => Some(cached),
            None => storage.get(id)?,
        };
        if let Some(then) = &then {
            for collection in &then.collections {
                context
                    .references()
                    .remember(M::NAME, id, &collection.name, &collection.elements);
            }
        }

        let now = mapping.normalize(aggregate, context.references())?;
        match then {
            Some(then) => {
                let changes = diff(&then, &now)?;
                if changes.is_empty() {
                    trace!(model = M::NAME, %id, "aggregate unchanged");
                } else {
                    debug!(model = M::NAME, %id, "updating aggregate");
                    storage.update(&changes)?;
                }
            }
            None => {
                debug!(model = M::NAME, %id, "adding aggregate");
                storage.add(&now)?;
            }
        }
        context.cache(M::NAME, now);
        Ok(())
    }

    /// Removes an aggregate. Removing an unknown id does nothing.
    pub fn remove(&self, id: &Id<M>) -> CoreResult<()> {
        let context = &self.inner.context;
        context.ensure_mutable("remove", M::NAME)?;
        let id = id.to_uuid();
        debug!(model = M::NAME, %id, "removing aggregate");
        self.inner.storage.remove(id)?;
        context.evict(M::NAME, id);
        context.references().forget(M::NAME, id);
        Ok(())
    }

    /// Loads what `fetch` selects.
    pub fn fetch(&self, fetch: Fetch) -> CoreResult<Vec<M>> {
        let fetch = Fetch {
            specification: self.resolve(fetch.specification)?,
            ..fetch
        };
        self.inner
            .storage
            .fetch(&fetch)?
            .into_iter()
            .map(|raw| self.rebuild(raw))
            .collect()
    }

    /// Counts the aggregates matching `specification`, or all of them.
    pub fn size(&self, specification: Option<Specification>) -> CoreResult<usize> {
        let specification = self.resolve(specification)?;
        self.inner.storage.size(specification.as_ref())
    }

    /// Returns true if some aggregate matches.
    pub fn any(&self, specification: Option<Specification>) -> CoreResult<bool> {
        let specification = self.resolve(specification)?;
        self.inner.storage.any(specification.as_ref())
    }

    /// Returns true if no aggregate matches.
    pub fn none(&self, specification: Option<Specification>) -> CoreResult<bool> {
        self.any(specification).map(|any| !any)
    }

    /// Starts a query over every aggregate.
    #[must_use]
    pub fn all(&self) -> Query<M> {
        Query {
            repository: self.clone(),
            fetch: Fetch::all(),
        }
    }

    /// Starts a query over the aggregates matching `specification`.
    #[must_use]
    pub fn matching(&self, specification: Specification) -> Query<M> {
        Query {
            repository: self.clone(),
            fetch: Fetch::matching(specification),
        }
    }
}

/// A query under construction.
pub struct Query<M> {
    repository: Repository<M>,
    fetch: Fetch,
}

impl<M> Clone for Query<M> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            fetch: self.fetch.clone(),
        }
    }
}

impl<M> fmt::Debug for Query<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("repository", &self.repository)
            .field("fetch", &self.fetch)
            .finish()
    }
}

impl<M: Aggregate> Query<M> {
    /// Orders by `path` (a root property or `entity.property`).
    #[must_use]
    pub fn sort(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.fetch.sort = Some(Sort {
            path: path.into(),
            direction,
        });
        self
    }

    /// Skips the first `count` aggregates.
    #[must_use]
    pub fn drop(mut self, count: usize) -> Self {
        self.fetch.drop = Some(count);
        self
    }

    /// Returns at most `count` aggregates.
    #[must_use]
    pub fn take(mut self, count: usize) -> Self {
        self.fetch.take = Some(count);
        self
    }

    /// Runs the query.
    pub fn fetch(self) -> CoreResult<Vec<M>> {
        self.repository.fetch(self.fetch)
    }

    /// Runs the query and returns the first aggregate.
    pub fn first(self) -> CoreResult<Option<M>> {
        Ok(self.take(1).fetch()?.into_iter().next())
    }

    /// Counts the matching aggregates. Sorting and paging are ignored.
    pub fn size(self) -> CoreResult<usize> {
        self.repository.size(self.fetch.specification)
    }

    /// Returns true if some aggregate matches.
    pub fn any(self) -> CoreResult<bool> {
        self.repository.any(self.fetch.specification)
    }

    /// Returns true if no aggregate matches.
    pub fn none(self) -> CoreResult<bool> {
        self.repository.none(self.fetch.specification)
    }

    /// Turns the query into a sub-query selecting the ids of the matching
    /// aggregates, for use with [`crate::specification::Property::matching`].
    #[must_use]
    pub fn ids(self) -> SubQuery {
        let token = self.repository.inner.context.token().clone();
        let Self { repository, fetch } = self;
        SubQuery::new(token, M::NAME, move || {
            let fetch = Fetch {
                specification: repository.resolve(fetch.specification.clone())?,
                ..fetch.clone()
            };
            Ok(repository
                .inner
                .storage
                .fetch(&fetch)?
                .into_iter()
                .map(|raw| Value::Text(raw.id.value.to_string()))
                .collect())
        })
    }
}
