//! Relational adapter configuration.

/// Configuration for a [`crate::SqlAdapter`].
#[derive(Debug, Clone)]
pub struct SqlConfig {
    /// Whether `CREATE TABLE IF NOT EXISTS` is issued for an aggregate's
    /// tables when its storage is first opened.
    pub create_tables: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            create_tables: true,
        }
    }
}

impl SqlConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether tables are created on demand.
    #[must_use]
    pub const fn create_tables(mut self, value: bool) -> Self {
        self.create_tables = value;
        self
    }
}
