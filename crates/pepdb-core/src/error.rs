//! Error types for the PEP database agent.
//!
//! Every public operation returns [`Result`]; each failure kind a caller may
//! want to branch on (not found, integrity, uniqueness, shape) has its own
//! variant, while backend failures are wrapped with their source attached.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the PEP database agent.
#[derive(Debug, Error)]
pub enum PepDbError {
    // Not-found errors
    #[error("Project does not exist: {registry_path}")]
    ProjectNotFound { registry_path: String },

    #[error("Sample '{sample_name}' not found in project {registry_path}")]
    SampleNotFound {
        registry_path: String,
        sample_name: String,
    },

    #[error("Schema does not exist: {schema}")]
    SchemaNotFound { schema: String },

    #[error("No history entry {change_id} for project {registry_path}")]
    HistoryNotFound {
        registry_path: String,
        change_id: i64,
    },

    #[error("Namespace does not exist: {namespace}")]
    NamespaceNotFound { namespace: String },

    #[error("View '{view_name}' does not exist in project {registry_path}")]
    ViewNotFound {
        registry_path: String,
        view_name: String,
    },

    #[error("Sample '{sample_name}' is not in view '{view_name}'")]
    SampleNotInView {
        view_name: String,
        sample_name: String,
    },

    #[error("Group does not exist: {group}")]
    GroupNotFound { group: String },

    #[error("Project {registry_path} is not in group {group}")]
    ProjectNotInGroup {
        group: String,
        registry_path: String,
    },

    #[error("Schema {schema} has no tag '{tag}'")]
    SchemaTagNotFound { schema: String, tag: String },

    // Integrity errors raised while validating a sample table
    #[error("Sample identifier '{guid}' appears more than once in the sample table")]
    DuplicatedIdentifier { guid: String },

    #[error("Sample at row {row} has no '{key}' identifier; keep identifiers when editing or overwrite the project")]
    MissingIdentifier { row: usize, key: String },

    #[error("Sample table update failed: {message}")]
    SampleTableUpdate { message: String },

    // Uniqueness conflicts
    #[error("Project {registry_path} already exists; set overwrite or choose another tag")]
    ProjectUniqueName { registry_path: String },

    #[error("Sample '{sample_name}' already exists in project {registry_path}")]
    SampleAlreadyExists {
        registry_path: String,
        sample_name: String,
    },

    #[error("Schema already exists: {schema}")]
    SchemaAlreadyExists { schema: String },

    #[error("View '{view_name}' already exists in project {registry_path}")]
    ViewAlreadyExists {
        registry_path: String,
        view_name: String,
    },

    #[error("Sample '{sample_name}' is already in view '{view_name}'")]
    SampleAlreadyInView {
        view_name: String,
        sample_name: String,
    },

    #[error("Group already exists: {group}")]
    GroupAlreadyExists { group: String },

    #[error("Project {registry_path} is already in group {group}")]
    ProjectAlreadyInGroup {
        group: String,
        registry_path: String,
    },

    #[error("Schema {schema} already has tag '{tag}'")]
    SchemaTagAlreadyExists { schema: String, tag: String },

    // Shape errors, raised before storage is touched
    #[error("Provided registry path is incorrect: '{path}'. {reason}")]
    RegistryPath { path: String, reason: String },

    #[error("Provided schema path is incorrect: '{path}'. {reason}")]
    SchemaPath { path: String, reason: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Backend errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, PepDbError>;

impl From<std::io::Error> for PepDbError {
    fn from(err: std::io::Error) -> Self {
        PepDbError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PepDbError {
    fn from(err: serde_json::Error) -> Self {
        PepDbError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for PepDbError {
    fn from(err: rusqlite::Error) -> Self {
        PepDbError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PepDbError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PepDbError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a lock-poisoning failure on the shared connection.
    pub(crate) fn lock_poisoned() -> Self {
        PepDbError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        }
    }

    /// True for lookups that failed because the keyed item does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PepDbError::ProjectNotFound { .. }
                | PepDbError::SampleNotFound { .. }
                | PepDbError::SchemaNotFound { .. }
                | PepDbError::HistoryNotFound { .. }
                | PepDbError::NamespaceNotFound { .. }
                | PepDbError::ViewNotFound { .. }
                | PepDbError::SampleNotInView { .. }
                | PepDbError::GroupNotFound { .. }
                | PepDbError::ProjectNotInGroup { .. }
                | PepDbError::SchemaTagNotFound { .. }
        )
    }

    /// True for sample-table integrity failures. These are always raised
    /// before any row is written.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            PepDbError::DuplicatedIdentifier { .. }
                | PepDbError::MissingIdentifier { .. }
                | PepDbError::SampleTableUpdate { .. }
        )
    }

    /// True when the operation collided with an existing unique key.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PepDbError::ProjectUniqueName { .. }
                | PepDbError::SampleAlreadyExists { .. }
                | PepDbError::SchemaAlreadyExists { .. }
                | PepDbError::ViewAlreadyExists { .. }
                | PepDbError::SampleAlreadyInView { .. }
                | PepDbError::GroupAlreadyExists { .. }
                | PepDbError::ProjectAlreadyInGroup { .. }
                | PepDbError::SchemaTagAlreadyExists { .. }
        )
    }

    /// True if the underlying SQLite error is a UNIQUE (or primary key)
    /// violation. Foreign-key, NOT NULL and CHECK failures stay `Database`
    /// errors.
    pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PepDbError::ProjectNotFound {
            registry_path: "ns/pep:default".into(),
        };
        assert_eq!(err.to_string(), "Project does not exist: ns/pep:default");

        let err = PepDbError::DuplicatedIdentifier { guid: "abc".into() };
        assert!(err.to_string().contains("'abc'"));
    }

    #[test]
    fn test_error_kinds() {
        assert!(PepDbError::HistoryNotFound {
            registry_path: "a/b:c".into(),
            change_id: 3
        }
        .is_not_found());
        assert!(PepDbError::MissingIdentifier {
            row: 0,
            key: "ph_id".into()
        }
        .is_integrity_error());
        assert!(PepDbError::ProjectUniqueName {
            registry_path: "a/b:c".into()
        }
        .is_conflict());
        assert!(!PepDbError::Config {
            message: "x".into()
        }
        .is_not_found());
    }

    #[test]
    fn test_unique_violation_is_narrow() {
        let failure = |code| rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None);

        assert!(PepDbError::is_unique_violation(&failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )));
        assert!(!PepDbError::is_unique_violation(&failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        )));
        assert!(!PepDbError::is_unique_violation(&failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL
        )));
        assert!(!PepDbError::is_unique_violation(&rusqlite::Error::QueryReturnedNoRows));
    }
}
