//! Value types exchanged with callers.

use crate::config::PepConfig;
use crate::error::{PepDbError, Result};
use crate::registry_path::validate_identifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One sample row: attribute name to value, in column order.
pub type SampleAttributes = Map<String, Value>;

/// In-memory project: config document, ordered samples, subsample tables.
///
/// Serializes with the raw PEP dictionary keys (`_config`, `_sample_dict`,
/// `_subsample_list`) and also accepts the plain field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_config", alias = "config", default)]
    pub config: Map<String, Value>,
    #[serde(rename = "_sample_dict", alias = "samples", default)]
    pub samples: Vec<SampleAttributes>,
    #[serde(rename = "_subsample_list", alias = "subsamples", default)]
    pub subsamples: Vec<Vec<SampleAttributes>>,
}

impl Project {
    pub fn new(
        config: Map<String, Value>,
        samples: Vec<SampleAttributes>,
        subsamples: Vec<Vec<SampleAttributes>>,
    ) -> Self {
        Self {
            config,
            samples,
            subsamples,
        }
    }

    /// Project name as stored in the config.
    pub fn name(&self) -> Option<&str> {
        config_str(&self.config, PepConfig::NAME_KEY)
    }

    /// Free-form description as stored in the config.
    pub fn description(&self) -> Option<&str> {
        config_str(&self.config, PepConfig::DESCRIPTION_KEY)
    }

    pub fn set_name(&mut self, name: &str) {
        self.config
            .insert(PepConfig::NAME_KEY.to_string(), Value::String(name.to_string()));
    }

    pub fn set_description(&mut self, description: &str) {
        self.config.insert(
            PepConfig::DESCRIPTION_KEY.to_string(),
            Value::String(description.to_string()),
        );
    }
}

pub(crate) fn config_str<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

pub(crate) fn sample_name_key(config: &Map<String, Value>) -> &str {
    config_str(config, PepConfig::SAMPLE_TABLE_INDEX_KEY).unwrap_or(PepConfig::SAMPLE_NAME_ATTR)
}

/// Render a sample attribute as the indexed sample name.
pub(crate) fn sample_name_of(sample: &SampleAttributes, key: &str) -> Option<String> {
    match sample.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Sparse change set for [`crate::ProjectService::update`].
///
/// Every field is optional; only the provided ones change. `project`
/// replaces config, samples and subsamples at once and cannot be combined
/// with the individual `config`/`samples`/`subsamples` fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectUpdateRequest {
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub config: Option<Map<String, Value>>,
    /// Desired sample table; rows carry their GUID under `ph_id`.
    #[serde(default)]
    pub samples: Option<Vec<SampleAttributes>>,
    #[serde(default)]
    pub subsamples: Option<Vec<Vec<SampleAttributes>>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
    /// Schema reference, `namespace/name[:version]`.
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub pop: Option<bool>,
    /// Recorded on the history entry; defaults to the project namespace.
    #[serde(default)]
    pub user: Option<String>,
}

impl ProjectUpdateRequest {
    /// Full replacement of config, samples and subsamples.
    pub fn replace_project(project: Project) -> Self {
        Self {
            project: Some(project),
            ..Default::default()
        }
    }

    /// Replace only the sample table.
    pub fn replace_samples(samples: Vec<SampleAttributes>) -> Self {
        Self {
            samples: Some(samples),
            ..Default::default()
        }
    }

    /// Boundary validation, run before any storage access.
    pub fn validate(&self) -> Result<()> {
        if self.project.is_some()
            && (self.config.is_some() || self.samples.is_some() || self.subsamples.is_some())
        {
            return Err(PepDbError::Validation {
                field: "project".to_string(),
                message: "cannot be combined with config, samples or subsamples".to_string(),
            });
        }
        if let Some(name) = &self.name {
            validate_identifier("name", name)?;
        }
        if let Some(tag) = &self.tag {
            validate_identifier("tag", tag)?;
        }
        Ok(())
    }

    /// True when the request would change nothing.
    pub fn is_empty(&self) -> bool {
        self.project.is_none()
            && self.config.is_none()
            && self.samples.is_none()
            && self.subsamples.is_none()
            && self.name.is_none()
            && self.tag.is_none()
            && self.description.is_none()
            && self.is_private.is_none()
            && self.schema.is_none()
            && self.pop.is_none()
    }
}

/// Options for [`crate::ProjectService::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Defaults to the config's `name`.
    pub name: Option<String>,
    /// Defaults to [`PepConfig::DEFAULT_TAG`].
    pub tag: Option<String>,
    /// Defaults to the config's `description`.
    pub description: Option<String>,
    pub is_private: bool,
    pub pop: bool,
    /// Schema reference, `namespace/name[:version]`.
    pub schema: Option<String>,
    /// Replace an existing project at the same key.
    pub overwrite: bool,
    /// Only replace an existing project; never create one.
    pub update_only: bool,
}

/// Options for [`crate::ProjectService::fork`].
#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    pub name: Option<String>,
    pub tag: Option<String>,
    pub description: Option<String>,
    pub is_private: bool,
}

/// Project metadata without its sample content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub is_private: bool,
    pub number_of_samples: usize,
    pub description: String,
    pub last_update_date: String,
    pub submission_date: String,
    pub digest: String,
    pub pep_schema: Option<String>,
    pub pop: bool,
    pub forked_from: Option<String>,
}

/// Page of annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationList {
    /// Total number of matches, independent of paging.
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
    pub results: Vec<Annotation>,
}

/// One history entry summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryChange {
    pub change_id: i64,
    pub change_date: String,
    pub user: String,
    /// Digest of the sample content captured by this entry.
    pub digest: String,
}

/// History of a project, newest entry first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryAnnotation {
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub history: Vec<HistoryChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub namespace: String,
    pub number_of_projects: usize,
    pub number_of_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceList {
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
    pub results: Vec<NamespaceInfo>,
}

/// A registered schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub schema: Value,
    pub description: String,
    pub last_update_date: String,
}

/// Sparse change set for [`crate::SchemaService::update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaVersionUpdate {
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SchemaVersionUpdate {
    pub fn is_empty(&self) -> bool {
        self.schema.is_none() && self.description.is_none()
    }
}

/// A named subset of one project's samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAnnotation {
    pub name: String,
    pub description: String,
    pub number_of_samples: usize,
}

/// Views defined on a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectViews {
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub views: Vec<ViewAnnotation>,
}

/// A named collection of projects owned by a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub number_of_projects: usize,
    pub last_update_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupList {
    pub count: usize,
    pub limit: usize,
    pub offset: usize,
    pub results: Vec<GroupInfo>,
}

/// Sparse change set for [`crate::GroupService::update`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
}

impl GroupUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            validate_identifier("name", name)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.is_private.is_none()
    }
}
