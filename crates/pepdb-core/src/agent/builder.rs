//! Builder for configuring PepAgent initialization.

use std::path::PathBuf;

use crate::config::{AgentOptions, StoreConfig, StoreLocation};
use crate::error::{PepDbError, Result};
use crate::store::PepStore;
use crate::PepAgent;
use tracing::info;

/// Builder for configuring PepAgent initialization.
///
/// # Example
///
/// ```rust,no_run
/// use pepdb_core::PepAgent;
///
/// let agent = PepAgent::builder()
///     .data_dir("./pepdb-data")
///     .auto_create_dirs(true)
///     .max_history_entries(500)
///     .build()?;
/// # Ok::<(), pepdb_core::PepDbError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PepAgentBuilder {
    options: AgentOptions,
    auto_create_dirs: bool,
}

impl PepAgentBuilder {
    /// Start from the defaults: in-memory store, default history cap.
    pub fn new() -> Self {
        Self {
            options: AgentOptions::default(),
            auto_create_dirs: false,
        }
    }

    /// Store data in this SQLite file.
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.location = StoreLocation::File(path.into());
        self
    }

    /// Store data in `pepdb.sqlite` inside this directory.
    pub fn data_dir(self, dir: impl Into<PathBuf>) -> Self {
        let path = dir.into().join(StoreConfig::DB_FILE_NAME);
        self.db_path(path)
    }

    /// Keep everything in memory; nothing survives the agent.
    pub fn in_memory(mut self) -> Self {
        self.options.location = StoreLocation::InMemory;
        self
    }

    /// Maximum number of history entries kept per project. Must be at
    /// least 1.
    ///
    /// Default: [`crate::config::HistoryConfig::MAX_HISTORY_SAMPLES_NUMBER`]
    pub fn max_history_entries(mut self, max: usize) -> Self {
        self.options.max_history_entries = max;
        self
    }

    /// Create the database's parent directory if it is missing.
    ///
    /// Default: `false` (the directory must exist)
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Use a complete set of options.
    pub fn options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    /// Open the store and build the agent.
    ///
    /// Fails with `Config` if the history cap is zero: every tracked update
    /// reports the entry it wrote, so at least that one must be kept.
    pub fn build(self) -> Result<PepAgent> {
        if self.options.max_history_entries == 0 {
            return Err(PepDbError::Config {
                message: "max_history_entries must be at least 1".to_string(),
            });
        }

        let store = match &self.options.location {
            StoreLocation::InMemory => PepStore::open_in_memory()?,
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    if !parent.exists() && !self.auto_create_dirs {
                        return Err(PepDbError::Config {
                            message: format!("Data directory does not exist: {}", parent.display()),
                        });
                    }
                }
                PepStore::open(path)?
            }
        };

        info!(
            "PEP agent ready ({:?}, history cap {})",
            self.options.location, self.options.max_history_entries
        );
        Ok(PepAgent::from_parts(store, self.options))
    }
}

impl Default for PepAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
