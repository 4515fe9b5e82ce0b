//! Persistence configuration.

/// Update-record count above which a document load compacts the log.
pub const PREFERRED_TRIM_SIZE: usize = 500;

/// Default database name.
pub const DEFAULT_DATABASE_NAME: &str = "yjs";

/// Persistence instance configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    /// Database name; for RocksDB this is the directory under the connection path
    pub database_name: String,
    /// Flush a document after a load that read more than this many updates
    pub flush_threshold: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            flush_threshold: PREFERRED_TRIM_SIZE,
        }
    }
}

impl PersistenceConfig {
    /// Create config for testing (tiny flush threshold).
    pub fn for_testing(flush_threshold: usize) -> Self {
        Self {
            flush_threshold,
            ..Self::default()
        }
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PersistenceConfig::default();
        assert_eq!(config.database_name, "yjs");
        assert_eq!(config.flush_threshold, 500);
    }

    #[test]
    fn test_config_builders() {
        let config = PersistenceConfig::default()
            .with_database_name("docs")
            .with_flush_threshold(2);
        assert_eq!(config, PersistenceConfig::for_testing(2).with_database_name("docs"));
    }
}
