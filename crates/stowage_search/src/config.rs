//! Document-store adapter configuration.

/// Configuration for a [`crate::SearchAdapter`].
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Prepended to every aggregate name to form its index name.
    pub index_prefix: String,
    /// Hits asked for per search request. Fetches larger than this are
    /// read page by page.
    pub page_size: usize,
    /// Whether an aggregate's index is created when its storage is first
    /// opened.
    pub create_indices: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_prefix: String::new(),
            page_size: 1_000,
            create_indices: true,
        }
    }
}

impl SearchConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the index prefix.
    #[must_use]
    pub fn index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Sets the page size. Zero is treated as one.
    #[must_use]
    pub const fn page_size(mut self, value: usize) -> Self {
        self.page_size = value;
        self
    }

    /// Sets whether indices are created on demand.
    #[must_use]
    pub const fn create_indices(mut self, value: bool) -> Self {
        self.create_indices = value;
        self
    }

    /// Index name of an aggregate.
    pub fn index(&self, aggregate: &str) -> String {
        format!("{}{aggregate}", self.index_prefix)
    }
}
