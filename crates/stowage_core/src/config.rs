//! Manager configuration.

/// Configuration for a [`crate::Manager`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether loaded aggregates are remembered for the duration of a
    /// transaction so that a later `put` can be diffed without reading the
    /// backend again.
    pub identity_map: bool,

    /// Whether collection elements keep their reference across a
    /// load/put cycle. When off, every collection is replaced wholesale.
    pub reference_tracking: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_map: true,
            reference_tracking: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether loaded aggregates are cached per transaction.
    #[must_use]
    pub const fn identity_map(mut self, value: bool) -> Self {
        self.identity_map = value;
        self
    }

    /// Sets whether collection element references are tracked.
    #[must_use]
    pub const fn reference_tracking(mut self, value: bool) -> Self {
        self.reference_tracking = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.identity_map);
        assert!(config.reference_tracking);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new().identity_map(false).reference_tracking(false);

        assert!(!config.identity_map);
        assert!(!config.reference_tracking);
    }
}
