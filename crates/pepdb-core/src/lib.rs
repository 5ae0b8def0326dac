//! pepdb-core - Headless database agent for PEP project metadata.
//!
//! Stores PEPs (a config document, an ordered sample table and optional
//! subsample tables) in SQLite. Every sample row carries a stable GUID, so
//! an edited project can be written back as a minimal set of row inserts,
//! updates, deletes and moves. Each update snapshots the prior state into a
//! bounded, restorable history. Projects can be sliced into named views
//! and collected into groups.
//!
//! # Example
//!
//! ```rust,no_run
//! use pepdb_core::{CreateOptions, PepAgent, Project, ProjectUpdateRequest};
//!
//! fn main() -> pepdb_core::Result<()> {
//!     let agent = PepAgent::open("pepdb.sqlite")?;
//!
//!     let project: Project = serde_json::from_str(
//!         r#"{"_config": {"name": "example"}, "_sample_dict": [{"sample_name": "a"}]}"#,
//!     )?;
//!     let key = agent.project().create(project, "databio", CreateOptions::default())?;
//!
//!     // Edit with identifiers attached, then write the table back.
//!     let mut samples = agent.project().get_samples(&key, true)?;
//!     samples[0].insert("protocol".into(), "rna".into());
//!     let outcome = agent
//!         .project()
//!         .update(&key, ProjectUpdateRequest::replace_samples(samples))?;
//!     println!("{} rows updated", outcome.updated);
//!
//!     Ok(())
//! }
//! ```

pub mod annotation;
pub mod config;
pub mod differ;
pub mod error;
pub mod group;
pub mod history;
pub mod identity;
pub mod models;
pub mod namespace;
pub mod ordering;
pub mod project;
pub mod registry_path;
pub mod sample;
pub mod schema;
pub mod store;
pub mod view;

mod agent;

// Re-export commonly used types
pub use agent::{PepAgent, PepAgentBuilder};
pub use annotation::{AnnotationFilter, AnnotationOrder, AnnotationService};
pub use config::{AgentOptions, HistoryConfig, PepConfig, QueryConfig, StoreConfig, StoreLocation};
pub use differ::{CurrentRow, IdentityMode, SampleDiff, SampleDiffer};
pub use error::{PepDbError, Result};
pub use group::GroupService;
pub use history::HistoryService;
pub use identity::{assign_guid, compute_digest};
pub use models::{
    Annotation, AnnotationList, CreateOptions, ForkOptions, GroupInfo, GroupList, GroupUpdate,
    HistoryAnnotation, HistoryChange, NamespaceInfo, NamespaceList, Project, ProjectUpdateRequest,
    ProjectViews, SampleAttributes, SchemaRecord, SchemaVersionUpdate, ViewAnnotation,
};
pub use namespace::NamespaceService;
pub use project::{ProjectService, UpdateOutcome};
pub use registry_path::{RegistryPath, SchemaRef};
pub use sample::SampleService;
pub use schema::SchemaService;
pub use store::PepStore;
pub use view::ViewService;
