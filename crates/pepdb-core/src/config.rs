//! Centralized configuration for the PEP database agent.
//!
//! Constant holders mirror the keys and defaults shared with other PEP
//! tooling; [`AgentOptions`] carries the runtime knobs a caller may change.

use std::path::PathBuf;
use std::time::Duration;

/// Keys and defaults of the PEP document model.
pub struct PepConfig;

impl PepConfig {
    pub const DEFAULT_TAG: &'static str = "default";
    pub const NAME_KEY: &'static str = "name";
    pub const DESCRIPTION_KEY: &'static str = "description";
    /// Reserved sample attribute carrying the row GUID on round-trips.
    pub const SAMPLE_ID_KEY: &'static str = "ph_id";
    /// Config key naming the sample attribute used as the sample name.
    pub const SAMPLE_TABLE_INDEX_KEY: &'static str = "sample_table_index";
    pub const SAMPLE_NAME_ATTR: &'static str = "sample_name";
    pub const LATEST_SCHEMA_VERSION: &'static str = "latest";
}

/// History retention settings.
pub struct HistoryConfig;

impl HistoryConfig {
    /// Maximum number of history entries kept per project.
    pub const MAX_HISTORY_SAMPLES_NUMBER: usize = 2000;
    pub const DEFAULT_CLEAN_DAYS: i64 = 90;
}

/// Listing defaults.
pub struct QueryConfig;

impl QueryConfig {
    pub const DEFAULT_OFFSET: usize = 0;
    pub const DEFAULT_LIMIT: usize = 100;
}

/// SQLite connection settings.
pub struct StoreConfig;

impl StoreConfig {
    pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DB_FILE_NAME: &'static str = "pepdb.sqlite";
}

/// Where the agent keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

/// Runtime options consumed by [`crate::PepAgentBuilder`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub location: StoreLocation,
    pub max_history_entries: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            location: StoreLocation::InMemory,
            max_history_entries: HistoryConfig::MAX_HISTORY_SAMPLES_NUMBER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = AgentOptions::default();
        assert_eq!(options.location, StoreLocation::InMemory);
        assert_eq!(options.max_history_entries, 2000);
        assert!(StoreConfig::BUSY_TIMEOUT > Duration::ZERO);
    }
}
