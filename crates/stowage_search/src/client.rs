//! The document-store boundary.

use serde_json::Value as Json;

use crate::error::SearchResult;

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Document id.
    pub id: String,
    /// Stored document.
    pub source: Json,
    /// Sort values of the hit, empty for unsorted searches.
    pub sort: Vec<Json>,
}

/// A client of a document store speaking the Elasticsearch query DSL.
///
/// Writes must be visible to the next search, so implementations backed by
/// a real cluster refresh on write.
pub trait DocumentClient: Send + Sync {
    /// Creates an index with `mapping` unless it exists.
    fn create_index(&self, index: &str, mapping: &Json) -> SearchResult<()>;

    /// Stores a whole document, replacing any previous one.
    fn index(&self, index: &str, id: &str, document: &Json) -> SearchResult<()>;

    /// Merges `partial` into a stored document.
    fn update(&self, index: &str, id: &str, partial: &Json) -> SearchResult<()>;

    /// Deletes a document. Returns false if it didn't exist.
    fn delete(&self, index: &str, id: &str) -> SearchResult<bool>;

    /// Loads a document.
    fn get(&self, index: &str, id: &str) -> SearchResult<Option<Json>>;

    /// Runs a search request body.
    fn search(&self, index: &str, body: &Json) -> SearchResult<Vec<Hit>>;

    /// Counts the documents matching a count request body.
    fn count(&self, index: &str, body: &Json) -> SearchResult<usize>;
}
