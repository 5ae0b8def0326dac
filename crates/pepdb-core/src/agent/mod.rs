//! The agent facade: one store, one service handle per concern.

mod builder;

pub use builder::PepAgentBuilder;

use crate::annotation::AnnotationService;
use crate::config::AgentOptions;
use crate::error::Result;
use crate::group::GroupService;
use crate::history::HistoryService;
use crate::namespace::NamespaceService;
use crate::project::ProjectService;
use crate::sample::SampleService;
use crate::schema::SchemaService;
use crate::store::PepStore;
use crate::view::ViewService;
use std::path::PathBuf;

/// Entry point to a PEP database.
///
/// Service handles borrow the agent and are cheap to create; every call
/// on them is one transaction.
#[derive(Debug, Clone)]
pub struct PepAgent {
    store: PepStore,
    options: AgentOptions,
}

impl PepAgent {
    /// Open (or create) a database file with default options.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        PepAgentBuilder::new().db_path(db_path).build()
    }

    /// In-memory database with default options.
    pub fn in_memory() -> Result<Self> {
        PepAgentBuilder::new().in_memory().build()
    }

    pub fn builder() -> PepAgentBuilder {
        PepAgentBuilder::new()
    }

    pub(crate) fn from_parts(store: PepStore, options: AgentOptions) -> Self {
        Self { store, options }
    }

    pub fn project(&self) -> ProjectService<'_> {
        ProjectService::new(&self.store, self.options.max_history_entries)
    }

    pub fn sample(&self) -> SampleService<'_> {
        SampleService::new(&self.store, self.options.max_history_entries)
    }

    pub fn history(&self) -> HistoryService<'_> {
        HistoryService::new(&self.store, self.options.max_history_entries)
    }

    pub fn schema(&self) -> SchemaService<'_> {
        SchemaService::new(&self.store)
    }

    pub fn annotation(&self) -> AnnotationService<'_> {
        AnnotationService::new(&self.store)
    }

    pub fn namespace(&self) -> NamespaceService<'_> {
        NamespaceService::new(&self.store)
    }

    pub fn view(&self) -> ViewService<'_> {
        ViewService::new(&self.store)
    }

    pub fn group(&self) -> GroupService<'_> {
        GroupService::new(&self.store)
    }

    pub fn store(&self) -> &PepStore {
        &self.store
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }
}
