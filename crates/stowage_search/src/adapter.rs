//! The document-store [`Adapter`].

use std::sync::Arc;

use serde_json::Value as Json;
use stowage_core::adapter::{Adapter, Fetch, Storage, Transaction};
use stowage_core::definition::Definition;
use stowage_core::raw::{Aggregate, Diff};
use stowage_core::specification::Specification;
use stowage_core::CoreResult;
use uuid::Uuid;

use crate::client::DocumentClient;
use crate::config::SearchConfig;
use crate::document;
use crate::error::SearchError;
use crate::mapping::mapping;
use crate::query;

/// Stores aggregates as documents, one index per aggregate.
///
/// # Consistency
///
/// Document stores have no transactions. Every write is sent when it is
/// made, so a rolled back transaction keeps the writes it made before
/// failing, and other readers see writes before the transaction ends.
#[derive(Clone)]
pub struct SearchAdapter {
    client: Arc<dyn DocumentClient>,
    config: SearchConfig,
}

impl SearchAdapter {
    /// Creates an adapter with the default configuration.
    pub fn new(client: impl DocumentClient + 'static) -> Self {
        Self::with_config(client, SearchConfig::default())
    }

    /// Creates an adapter with a custom configuration.
    pub fn with_config(client: impl DocumentClient + 'static, config: SearchConfig) -> Self {
        Self {
            client: Arc::new(client),
            config,
        }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }
}

impl std::fmt::Debug for SearchAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Adapter for SearchAdapter {
    fn name(&self) -> &'static str {
        "search"
    }

    fn storage(&self, definition: Arc<Definition>) -> CoreResult<Box<dyn Storage>> {
        let index = self.config.index(definition.name());
        if self.config.create_indices {
            tracing::debug!(%index, "creating index");
            self.client.create_index(&index, &mapping(&definition)?)?;
        }
        Ok(Box::new(SearchStorage {
            client: Arc::clone(&self.client),
            index,
            page_size: self.config.page_size.max(1),
            definition,
        }))
    }

    fn transaction(&self) -> &dyn Transaction {
        &PassThrough
    }
}

/// Transaction of a store without transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl Transaction for PassThrough {
    fn start(&self) -> CoreResult<()> {
        tracing::debug!("begin (document store writes are not transactional)");
        Ok(())
    }

    fn commit(&self) -> CoreResult<()> {
        tracing::debug!("commit");
        Ok(())
    }

    fn rollback(&self) -> CoreResult<()> {
        tracing::warn!("rollback requested, writes already sent to the document store are kept");
        Ok(())
    }
}

struct SearchStorage {
    client: Arc<dyn DocumentClient>,
    index: String,
    page_size: usize,
    definition: Arc<Definition>,
}

impl Storage for SearchStorage {
    fn get(&self, id: Uuid) -> CoreResult<Option<Aggregate>> {
        let id = id.to_string();
        self.client
            .get(&self.index, &id)?
            .map(|source| document::decode(&self.definition, &self.index, &id, &source))
            .transpose()
    }

    fn add(&self, aggregate: &Aggregate) -> CoreResult<()> {
        let id = aggregate.id.value.to_string();
        tracing::trace!(index = %self.index, %id, "index");
        self.client
            .index(&self.index, &id, &document::encode(aggregate))?;
        Ok(())
    }

    fn update(&self, diff: &Diff) -> CoreResult<()> {
        let id = diff.id.value.to_string();
        tracing::trace!(index = %self.index, %id, "update");
        self.client
            .update(&self.index, &id, &document::encode_diff(diff))?;
        Ok(())
    }

    fn remove(&self, id: Uuid) -> CoreResult<()> {
        let id = id.to_string();
        tracing::trace!(index = %self.index, %id, "delete");
        self.client.delete(&self.index, &id)?;
        Ok(())
    }

    fn fetch(&self, fetch: &Fetch) -> CoreResult<Vec<Aggregate>> {
        let mut found = Vec::new();
        let mut after: Option<Vec<Json>> = None;
        loop {
            let wanted = fetch
                .take
                .map_or(self.page_size, |take| take.saturating_sub(found.len()).min(self.page_size));
            if wanted == 0 {
                break;
            }
            let body = query::search_body(fetch, &self.definition, wanted, after.as_deref())?;
            tracing::trace!(index = %self.index, %body, "search");
            let hits = self.client.search(&self.index, &body)?;
            let exhausted = hits.len() < wanted;
            if let Some(last) = hits.last() {
                if last.sort.is_empty() {
                    return Err(SearchError::malformed(&self.index, &last.id, "hit without sort values").into());
                }
                after = Some(last.sort.clone());
            }
            for hit in hits {
                found.push(document::decode(&self.definition, &self.index, &hit.id, &hit.source)?);
            }
            if exhausted {
                break;
            }
        }
        Ok(found)
    }

    fn size(&self, specification: Option<&Specification>) -> CoreResult<usize> {
        let body = query::count_body(specification, &self.definition)?;
        tracing::trace!(index = %self.index, %body, "count");
        Ok(self.client.count(&self.index, &body)?)
    }

    fn any(&self, specification: Option<&Specification>) -> CoreResult<bool> {
        Ok(self.size(specification)? > 0)
    }
}
