//! The manager: entry point tying an adapter to typed repositories.

use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::config::Config;
use crate::context::{Context, ContextToken, TransactionState};
use crate::definition::{Aggregate, Definition, Definitions};
use crate::error::{CoreError, CoreResult};
use crate::repository::Repository;
use crate::types::Registry;

/// Owns an adapter, the resolved definitions and one repository per
/// aggregate type.
///
/// ```
/// use stowage_core::{Aggregate, CoreResult, Fields, Id, InMemoryAdapter, Manager, Schema};
///
/// struct Note {
///     id: Id<Note>,
///     text: String,
/// }
///
/// impl Aggregate for Note {
///     const NAME: &'static str = "note";
///
///     fn describe(schema: &mut Schema<Self>) {
///         schema.id("id", |n| &n.id).property("text", |n| &n.text);
///     }
///
///     fn assemble(mut fields: Fields) -> CoreResult<Self> {
///         Ok(Self { id: fields.id()?, text: fields.take("text")? })
///     }
/// }
///
/// let manager = Manager::new(InMemoryAdapter::new());
/// let notes = manager.repository::<Note>()?;
/// let note = Note { id: Id::new(), text: "hello".into() };
///
/// manager.transactional(|| notes.put(&note))?;
/// assert_eq!(notes.get(&note.id)?.map(|n| n.text), Some("hello".to_string()));
/// # Ok::<(), stowage_core::CoreError>(())
/// ```
pub struct Manager {
    adapter: Arc<dyn Adapter>,
    context: Arc<Context>,
    definitions: Definitions,
    repositories: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Manager {
    /// Creates a manager with the default configuration and registry.
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self::open(adapter, Config::default(), Registry::new())
    }

    /// Creates a manager with the given configuration.
    pub fn with_config(adapter: impl Adapter + 'static, config: Config) -> Self {
        Self::open(adapter, config, Registry::new())
    }

    /// Creates a manager resolving types through `registry`.
    pub fn with_registry(adapter: impl Adapter + 'static, registry: Registry) -> Self {
        Self::open(adapter, Config::default(), registry)
    }

    /// Creates a manager from all of its parts.
    pub fn open(adapter: impl Adapter + 'static, config: Config, registry: Registry) -> Self {
        debug!(adapter = adapter.name(), ?config, "opening manager");
        Self {
            adapter: Arc::new(adapter),
            context: Arc::new(Context::new(config)),
            definitions: Definitions::new(registry),
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// The adapter.
    #[must_use]
    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Token identifying this manager's sub-queries.
    #[must_use]
    pub fn token(&self) -> &ContextToken {
        self.context.token()
    }

    /// Returns true while a transaction is running.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.context.state() == TransactionState::Mutable
    }

    /// Returns the definition of `M`, resolving it on first use.
    pub fn definition<M: Aggregate>(&self) -> CoreResult<Arc<Definition>> {
        Ok(Arc::clone(self.definitions.get::<M>()?.definition()))
    }

    /// Returns the repository of `M`. Repeated calls return the same
    /// repository.
    pub fn repository<M: Aggregate>(&self) -> CoreResult<Repository<M>> {
        let key = TypeId::of::<M>();
        if let Some(repository) = self
            .repositories
            .lock()
            .get(&key)
            .and_then(|r| r.downcast_ref::<Repository<M>>())
            .cloned()
        {
            return Ok(repository);
        }

        let mapping = self.definitions.get::<M>()?;
        let storage = self.adapter.storage(Arc::clone(mapping.definition()))?;
        let repository = Repository::new(mapping, storage, Arc::clone(&self.context));
        debug!(model = M::NAME, adapter = self.adapter.name(), "repository created");

        let mut repositories = self.repositories.lock();
        let entry = repositories
            .entry(key)
            .or_insert_with(|| Arc::new(repository.clone()) as Arc<dyn Any + Send + Sync>);
        Ok(entry
            .downcast_ref::<Repository<M>>()
            .cloned()
            .unwrap_or(repository))
    }

    /// Runs `work` in a transaction.
    ///
    /// Commits when `work` returns `Ok`, rolls back when it returns `Err`
    /// or panics. Calling this again from inside `work` fails with
    /// [`CoreError::NestedTransaction`].
    pub fn transactional<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<CoreError>,
    {
        self.context.begin()?;
        let boundary = Boundary {
            adapter: self.adapter.as_ref(),
            context: &self.context,
            open: true,
        };
        if let Err(err) = self.adapter.transaction().start() {
            boundary.rollback();
            return Err(err.into());
        }
        debug!(adapter = self.adapter.name(), "transaction started");

        match work() {
            Ok(value) => {
                boundary.commit()?;
                Ok(value)
            }
            Err(err) => {
                boundary.rollback();
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("adapter", &self.adapter.name())
            .field("context", &self.context)
            .field("definitions", &self.definitions)
            .finish_non_exhaustive()
    }
}

/// Ends a transaction exactly once, rolling back if dropped while open.
struct Boundary<'a> {
    adapter: &'a dyn Adapter,
    context: &'a Context,
    open: bool,
}

impl Boundary<'_> {
    fn commit(mut self) -> CoreResult<()> {
        self.open = false;
        let result = self.adapter.transaction().commit();
        match &result {
            Ok(()) => debug!(adapter = self.adapter.name(), "transaction committed"),
            Err(err) => {
                warn!(adapter = self.adapter.name(), error = %err, "commit failed");
                self.release();
            }
        }
        self.context.end();
        result
    }

    fn rollback(mut self) {
        self.open = false;
        self.release();
        self.context.end();
    }

    fn release(&self) {
        match self.adapter.transaction().rollback() {
            Ok(()) => debug!(adapter = self.adapter.name(), "transaction rolled back"),
            Err(err) => warn!(adapter = self.adapter.name(), error = %err, "rollback failed"),
        }
    }
}

impl Drop for Boundary<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!(adapter = self.adapter.name(), "transaction abandoned, rolling back");
            self.release();
            self.context.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::InMemoryAdapter;
    use crate::adapter::{Fetch, Storage, Transaction};
    use crate::fixtures::{Article, Comment, State};
    use crate::raw;
    use crate::specification::{Direction, Property, Specification};
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn manager() -> Manager {
        Manager::new(InMemoryAdapter::new())
    }

    #[test]
    fn put_outside_a_transaction_is_illegal() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        let err = articles.put(&Article::sample()).unwrap_err();
        assert!(matches!(err, CoreError::IllegalMutation { operation: "put", .. }));
        let err = articles.remove(&crate::Id::new()).unwrap_err();
        assert!(matches!(err, CoreError::IllegalMutation { operation: "remove", .. }));
    }

    #[test]
    fn put_then_get_roundtrip() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        let article = Article::sample();

        manager.transactional(|| articles.put(&article)).unwrap();

        assert_eq!(articles.get(&article.id).unwrap(), Some(article.clone()));
        assert!(articles.contains(&article.id).unwrap());
        assert_eq!(articles.size(None).unwrap(), 1);
    }

    #[test]
    fn failing_work_rolls_back() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        let article = Article::sample();

        let result: CoreResult<()> = manager.transactional(|| {
            articles.put(&article)?;
            Err(CoreError::definition("article", "boom"))
        });

        assert!(result.is_err());
        assert!(!manager.in_transaction());
        assert!(articles.get(&article.id).unwrap().is_none());
    }

    #[test]
    fn panicking_work_rolls_back() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        let article = Article::sample();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: CoreResult<()> = manager.transactional(|| {
                articles.put(&article)?;
                panic!("work failed");
            });
        }));

        assert!(outcome.is_err());
        assert!(!manager.in_transaction());
        assert!(articles.get(&article.id).unwrap().is_none());
    }

    #[test]
    fn nested_transactions_are_rejected() {
        let manager = manager();
        let result: CoreResult<()> = manager.transactional(|| manager.transactional(|| Ok(())));
        assert!(matches!(result, Err(CoreError::NestedTransaction)));
        assert!(!manager.in_transaction());
    }

    #[test]
    fn repositories_are_cached() {
        let manager = manager();
        let a = manager.repository::<Article>().unwrap();
        let b = manager.repository::<Article>().unwrap();
        assert!(std::ptr::eq(a.definition(), b.definition()));
        assert_eq!(manager.definition::<Article>().unwrap().name(), "article");
    }

    #[test]
    fn remove_unknown_id_is_a_no_op() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        manager
            .transactional(|| articles.remove(&crate::Id::new()))
            .unwrap();
    }

    #[test]
    fn queries_sort_and_page() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        manager
            .transactional(|| {
                for (title, rating) in [("c", 3), ("a", 1), ("b", 2), ("d", 4)] {
                    articles.put(&Article::titled(title, Some(rating)))?;
                }
                Ok::<_, CoreError>(())
            })
            .unwrap();

        let page = articles
            .matching(Property::of("rating").greater_than(1))
            .sort("title", Direction::Descending)
            .drop(1)
            .take(2)
            .fetch()
            .unwrap();
        let titles: Vec<_> = page.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "b"]);

        assert_eq!(articles.all().size().unwrap(), 4);
        assert!(articles.matching(Property::of("title").equals("a")).any().unwrap());
        assert!(articles.matching(Property::of("title").equals("z")).none().unwrap());
        assert_eq!(
            articles
                .all()
                .sort("rating", Direction::Ascending)
                .first()
                .unwrap()
                .map(|a| a.title),
            Some("a".to_string())
        );
    }

    #[test]
    fn sub_queries_select_by_id() {
        let manager = manager();
        let articles = manager.repository::<Article>().unwrap();
        let keep = Article::titled("keep", Some(5));
        let other = Article::titled("other", Some(1));
        manager
            .transactional(|| {
                articles.put(&keep)?;
                articles.put(&other)
            })
            .unwrap();

        let ids = articles
            .matching(Property::of("rating").greater_than(3))
            .ids();
        let found = articles
            .matching(Property::of("id").matching(ids))
            .fetch()
            .unwrap();
        assert_eq!(found, vec![keep]);
    }

    #[test]
    fn foreign_sub_queries_are_rejected() {
        let ours = manager();
        let theirs = manager();
        let ids = theirs.repository::<Article>().unwrap().all().ids();
        let err = ours
            .repository::<Article>()
            .unwrap()
            .matching(Property::of("id").matching(ids))
            .fetch()
            .unwrap_err();
        assert!(matches!(err, CoreError::ForeignContext { .. }));
    }

    /// Counts storage calls so tests can see what `put` sends down.
    #[derive(Default)]
    struct Recorder {
        inner: InMemoryAdapter,
        adds: Arc<AtomicUsize>,
        updates: Arc<Mutex<Vec<raw::Diff>>>,
    }

    struct RecordingStorage {
        inner: Box<dyn Storage>,
        adds: Arc<AtomicUsize>,
        updates: Arc<Mutex<Vec<raw::Diff>>>,
    }

    impl Adapter for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn storage(&self, definition: Arc<Definition>) -> CoreResult<Box<dyn Storage>> {
            Ok(Box::new(RecordingStorage {
                inner: self.inner.storage(definition)?,
                adds: Arc::clone(&self.adds),
                updates: Arc::clone(&self.updates),
            }))
        }

        fn transaction(&self) -> &dyn Transaction {
            self.inner.transaction()
        }
    }

    impl Storage for RecordingStorage {
        fn get(&self, id: Uuid) -> CoreResult<Option<raw::Aggregate>> {
            self.inner.get(id)
        }

        fn add(&self, aggregate: &raw::Aggregate) -> CoreResult<()> {
            self.adds.fetch_add(1, Ordering::SeqCst);
            self.inner.add(aggregate)
        }

        fn update(&self, diff: &raw::Diff) -> CoreResult<()> {
            self.updates.lock().push(diff.clone());
            self.inner.update(diff)
        }

        fn remove(&self, id: Uuid) -> CoreResult<()> {
            self.inner.remove(id)
        }

        fn fetch(&self, fetch: &Fetch) -> CoreResult<Vec<raw::Aggregate>> {
            self.inner.fetch(fetch)
        }

        fn size(&self, specification: Option<&Specification>) -> CoreResult<usize> {
            self.inner.size(specification)
        }
    }

    #[test]
    fn put_sends_only_the_diff() {
        let recorder = Recorder::default();
        let adds = Arc::clone(&recorder.adds);
        let updates = Arc::clone(&recorder.updates);
        let manager = Manager::new(recorder);
        let articles = manager.repository::<Article>().unwrap();
        let article = Article::sample();

        manager.transactional(|| articles.put(&article)).unwrap();
        assert_eq!(adds.load(Ordering::SeqCst), 1);

        manager
            .transactional(|| {
                let mut loaded = articles.get(&article.id)?.unwrap();
                articles.put(&loaded)?;
                loaded.state = State::Draft;
                loaded.comments.push(Comment {
                    body: "new".into(),
                    votes: 0,
                });
                articles.put(&loaded)
            })
            .unwrap();

        let updates = updates.lock();
        assert_eq!(updates.len(), 1, "unchanged put must not update");
        let diff = &updates[0];
        assert_eq!(diff.properties.len(), 1);
        assert_eq!(diff.collections[0].added.len(), 1);
        assert!(diff.collections[0].removed.is_empty());
    }

    #[test]
    fn element_references_are_dropped_between_transactions() {
        let recorder = Recorder::default();
        let updates = Arc::clone(&recorder.updates);
        let manager = Manager::new(recorder);
        let articles = manager.repository::<Article>().unwrap();
        let article = Article::sample();

        manager.transactional(|| articles.put(&article)).unwrap();
        assert!(manager.context.references().is_empty());

        let mut loaded = articles.get(&article.id).unwrap().unwrap();
        manager
            .transactional(|| {
                loaded.comments.remove(0);
                articles.put(&loaded)
            })
            .unwrap();
        assert!(manager.context.references().is_empty());

        let updates = updates.lock();
        let comments = &updates[0].collections[0];
        assert_eq!(comments.removed.len(), 1);
        assert!(comments.added.is_empty());
    }
}
