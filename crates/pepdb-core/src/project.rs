//! Project lifecycle: create, read, update, fork and delete.
//!
//! [`ProjectService::update`] is the reconciliation entry point. It resolves
//! the requested change set against the stored project, validates every
//! input (sample identifiers, schema pointer, new key) before the first
//! write, then applies the sample diff, replaces subsamples, records the
//! pre-update state as a history entry and commits, all in one
//! transaction.

use crate::config::PepConfig;
use crate::differ::{without_identifier, IdentityMode, SampleDiffer};
use crate::error::{PepDbError, Result};
use crate::identity::{assign_guid, compute_digest};
use crate::models::{
    config_str, sample_name_key, CreateOptions, ForkOptions, Project, ProjectUpdateRequest,
    SampleAttributes,
};
use crate::ordering::assign_order;
use crate::registry_path::{validate_identifier, RegistryPath, SchemaRef};
use crate::store::projects::{self, NewProject, ProjectRow};
use crate::store::{history, now_timestamp, samples, schemas, PepStore};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Key of the project after the update (it changes on rename/retag).
    pub registry_path: RegistryPath,
    /// History entry written for this update; `None` when nothing changed.
    pub change_id: Option<i64>,
    pub digest: String,
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
    pub moved: usize,
}

/// Project operations over one store.
#[derive(Clone, Copy)]
pub struct ProjectService<'a> {
    store: &'a PepStore,
    max_history_entries: usize,
}

impl<'a> ProjectService<'a> {
    pub(crate) fn new(store: &'a PepStore, max_history_entries: usize) -> Self {
        Self {
            store,
            max_history_entries,
        }
    }

    /// Upload a project.
    ///
    /// The namespace and name are lower-cased. Samples get fresh GUIDs, so
    /// any `ph_id` attributes carried by `project` are dropped. If the key is
    /// taken, `overwrite` or `update_only` replace the stored project (as a
    /// tracked change); otherwise the upload fails with `ProjectUniqueName`.
    pub fn create(
        &self,
        mut project: Project,
        namespace: &str,
        options: CreateOptions,
    ) -> Result<RegistryPath> {
        let namespace = namespace.to_lowercase();
        validate_identifier("namespace", &namespace)?;

        let name = options
            .name
            .as_deref()
            .or_else(|| project.name())
            .map(str::to_lowercase)
            .ok_or_else(|| PepDbError::Validation {
                field: "name".to_string(),
                message: "must be given or set in the project config".to_string(),
            })?;
        validate_identifier("name", &name)?;

        let tag = options
            .tag
            .clone()
            .unwrap_or_else(|| PepConfig::DEFAULT_TAG.to_string());
        validate_identifier("tag", &tag)?;

        let description = options
            .description
            .as_deref()
            .or_else(|| project.description())
            .unwrap_or_default()
            .to_string();

        let schema = options.schema.as_deref().map(SchemaRef::parse).transpose()?;

        project.set_name(&name);
        project.set_description(&description);
        let Project {
            config,
            samples,
            subsamples,
        } = project;

        let samples: Vec<SampleAttributes> = samples
            .iter()
            .map(|sample| without_identifier(sample, PepConfig::SAMPLE_ID_KEY))
            .collect();
        let digest = compute_digest(&samples);
        let key = RegistryPath::new(namespace, name, tag);

        self.store.write(|tx| {
            let schema_id = schema
                .as_ref()
                .map(|schema| schemas::resolve_schema_id(tx, schema))
                .transpose()?;

            let content = ProjectContent {
                config,
                samples,
                subsamples,
                digest,
                description,
                private: options.is_private,
                pop: options.pop,
                schema_id,
            };

            match projects::find_project(tx, &key)? {
                Some(existing) if options.overwrite || options.update_only => {
                    self.overwrite(tx, existing, content)?;
                    info!("Overwrote project {}", key);
                }
                Some(_) => {
                    return Err(PepDbError::ProjectUniqueName {
                        registry_path: key.to_string(),
                    })
                }
                None if options.update_only => {
                    return Err(PepDbError::ProjectNotFound {
                        registry_path: key.to_string(),
                    })
                }
                None => {
                    insert_new(tx, &key, &content, None, None)?;
                    info!("Uploaded project {} ({} samples)", key, content.samples.len());
                }
            }
            Ok(())
        })?;

        Ok(key)
    }

    /// Replace every stored part of `existing` with `content`.
    fn overwrite(&self, tx: &Connection, mut existing: ProjectRow, content: ProjectContent) -> Result<()> {
        let snapshot = history::capture_snapshot(tx, &existing)?;
        let previous_digest = existing.digest.clone();

        samples::delete_all_samples(tx, existing.id)?;
        insert_fresh_samples(tx, existing.id, &content.samples, sample_name_key(&content.config))?;
        samples::replace_subsamples(tx, existing.id, &content.subsamples)?;

        existing.number_of_samples = content.samples.len();
        existing.digest = content.digest;
        existing.config = content.config;
        existing.description = content.description;
        existing.private = content.private;
        existing.pop = content.pop;
        existing.schema_id = content.schema_id;
        existing.last_update_date = now_timestamp();

        let user = existing.namespace.clone();
        history::record_change(tx, &mut existing, &snapshot, &previous_digest, &user)?;
        projects::save_project(tx, &existing)?;
        history::prune(tx, existing.id, self.max_history_entries)?;
        Ok(())
    }

    /// Load a project. With `with_ids`, every sample carries its GUID under
    /// `ph_id`, which is what [`ProjectService::update`] expects back.
    pub fn get(&self, key: &RegistryPath, with_ids: bool) -> Result<Project> {
        self.store.read(|tx| {
            let row = projects::require_project(tx, key)?;
            Ok(Project::new(
                row.config.clone(),
                samples::load_sample_table(tx, row.id, with_ids)?,
                samples::load_subsamples(tx, row.id)?,
            ))
        })
    }

    pub fn get_by_registry_path(&self, registry_path: &str, with_ids: bool) -> Result<Project> {
        self.get(&RegistryPath::parse(registry_path)?, with_ids)
    }

    pub fn exists(&self, key: &RegistryPath) -> Result<bool> {
        self.store.read(|tx| projects::project_exists(tx, key))
    }

    pub fn get_config(&self, key: &RegistryPath) -> Result<Map<String, Value>> {
        self.store
            .read(|tx| Ok(projects::require_project(tx, key)?.config))
    }

    pub fn get_samples(&self, key: &RegistryPath, with_ids: bool) -> Result<Vec<SampleAttributes>> {
        self.store.read(|tx| {
            let row = projects::require_project(tx, key)?;
            samples::load_sample_table(tx, row.id, with_ids)
        })
    }

    pub fn get_subsamples(&self, key: &RegistryPath) -> Result<Vec<Vec<SampleAttributes>>> {
        self.store.read(|tx| {
            let row = projects::require_project(tx, key)?;
            samples::load_subsamples(tx, row.id)
        })
    }

    /// Delete a project with its samples, subsamples, history and views, and
    /// take it out of every group. Forks of it survive with their
    /// `forked_from` pointer cleared.
    pub fn delete(&self, key: &RegistryPath) -> Result<()> {
        self.store.write(|tx| {
            let row = projects::require_project(tx, key)?;
            projects::delete_project_cascade(tx, row.id)
        })?;
        info!("Deleted project {}", key);
        Ok(())
    }

    pub fn delete_by_registry_path(&self, registry_path: &str) -> Result<()> {
        self.delete(&RegistryPath::parse(registry_path)?)
    }

    /// Copy a project into `namespace`.
    ///
    /// The fork keeps the original's name and tag unless overridden, and
    /// inherits its `pop` flag, schema and submission date.
    pub fn fork(
        &self,
        original: &RegistryPath,
        namespace: &str,
        options: ForkOptions,
    ) -> Result<RegistryPath> {
        let namespace = namespace.to_lowercase();
        validate_identifier("namespace", &namespace)?;
        if let Some(name) = &options.name {
            validate_identifier("name", name)?;
        }
        if let Some(tag) = &options.tag {
            validate_identifier("tag", tag)?;
        }

        let key = self.store.write(|tx| {
            let source = projects::require_project(tx, original)?;
            let key = RegistryPath::new(
                namespace,
                options
                    .name
                    .as_deref()
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| source.name.clone()),
                options.tag.clone().unwrap_or_else(|| source.tag.clone()),
            );

            let description = options
                .description
                .clone()
                .unwrap_or_else(|| source.description.clone());
            let mut config = source.config.clone();
            config.insert(PepConfig::NAME_KEY.to_string(), Value::String(key.name.clone()));
            config.insert(
                PepConfig::DESCRIPTION_KEY.to_string(),
                Value::String(description.clone()),
            );

            let content = ProjectContent {
                config,
                samples: samples::load_sample_table(tx, source.id, false)?,
                subsamples: samples::load_subsamples(tx, source.id)?,
                digest: source.digest.clone(),
                description,
                private: options.is_private,
                pop: source.pop,
                schema_id: source.schema_id,
            };
            insert_new(
                tx,
                &key,
                &content,
                Some(source.id),
                Some(source.submission_date.as_str()),
            )?;
            Ok(key)
        })?;

        info!("Forked project {} into {}", original, key);
        Ok(key)
    }

    /// Apply a sparse change set to a stored project.
    ///
    /// Samples in the request must carry their GUID under `ph_id`; a `null`
    /// value marks a new row. Rows missing from the request are deleted.
    /// Subsamples, when given, replace the stored ones wholesale.
    pub fn update(&self, key: &RegistryPath, request: ProjectUpdateRequest) -> Result<UpdateOutcome> {
        let outcome = self
            .store
            .write(|tx| apply_update(tx, key, request, self.max_history_entries))?;
        if let Some(change_id) = outcome.change_id {
            info!(
                "Updated project {} (change {}, -{} ~{} +{} moved {})",
                outcome.registry_path,
                change_id,
                outcome.deleted,
                outcome.updated,
                outcome.inserted,
                outcome.moved
            );
        }
        Ok(outcome)
    }
}

/// Everything written for a new or overwritten project.
struct ProjectContent {
    config: Map<String, Value>,
    samples: Vec<SampleAttributes>,
    subsamples: Vec<Vec<SampleAttributes>>,
    digest: String,
    description: String,
    private: bool,
    pop: bool,
    schema_id: Option<i64>,
}

fn insert_new(
    tx: &Connection,
    key: &RegistryPath,
    content: &ProjectContent,
    forked_from_id: Option<i64>,
    submission_date: Option<&str>,
) -> Result<i64> {
    let now = now_timestamp();
    let project_id = projects::insert_project(
        tx,
        &NewProject {
            key,
            digest: &content.digest,
            config: &content.config,
            description: &content.description,
            private: content.private,
            number_of_samples: content.samples.len(),
            submission_date: submission_date.unwrap_or(now.as_str()),
            last_update_date: &now,
            schema_id: content.schema_id,
            pop: content.pop,
            forked_from_id,
        },
    )?;
    insert_fresh_samples(tx, project_id, &content.samples, sample_name_key(&content.config))?;
    samples::replace_subsamples(tx, project_id, &content.subsamples)?;
    Ok(project_id)
}

fn insert_fresh_samples(
    tx: &Connection,
    project_id: i64,
    rows: &[SampleAttributes],
    name_key: &str,
) -> Result<()> {
    for (sample, row_number) in assign_order(rows) {
        samples::insert_sample(tx, project_id, &assign_guid(), sample, row_number, name_key)?;
    }
    Ok(())
}

/// Reconcile a stored project with `request` inside the caller's
/// transaction.
pub(crate) fn apply_update(
    tx: &Connection,
    key: &RegistryPath,
    request: ProjectUpdateRequest,
    max_history_entries: usize,
) -> Result<UpdateOutcome> {
    request.validate()?;
    let mut project = projects::require_project(tx, key)?;

    if request.is_empty() {
        debug!("Empty update request for {}", key);
        return Ok(UpdateOutcome {
            registry_path: project.registry_path(),
            change_id: None,
            digest: project.digest,
            deleted: 0,
            updated: 0,
            inserted: 0,
            moved: 0,
        });
    }

    let ProjectUpdateRequest {
        project: replacement,
        config,
        samples: desired_samples,
        subsamples,
        name,
        tag,
        description,
        is_private,
        schema,
        pop,
        user,
    } = request;

    let (config, desired_samples, subsamples) = match replacement {
        Some(replacement) => (
            Some(replacement.config),
            Some(replacement.samples),
            Some(replacement.subsamples),
        ),
        None => (config, desired_samples, subsamples),
    };

    // Validation and lookups; nothing below this block may fail on input.
    let schema_id = match schema.as_deref() {
        Some(schema) => Some(schemas::resolve_schema_id(tx, &SchemaRef::parse(schema)?)?),
        None => project.schema_id,
    };

    let new_name = match name.as_deref() {
        Some(name) => name.to_lowercase(),
        None => config
            .as_ref()
            .and_then(|config| config_str(config, PepConfig::NAME_KEY))
            .map(str::to_lowercase)
            .unwrap_or_else(|| project.name.clone()),
    };
    validate_identifier("name", &new_name)?;
    let new_tag = tag.unwrap_or_else(|| project.tag.clone());
    let new_description = description
        .or_else(|| {
            config
                .as_ref()
                .and_then(|config| config_str(config, PepConfig::DESCRIPTION_KEY))
                .map(str::to_string)
        })
        .unwrap_or_else(|| project.description.clone());

    let new_key = RegistryPath::new(&project.namespace, &new_name, &new_tag);
    if new_key != project.registry_path() && projects::project_exists(tx, &new_key)? {
        return Err(PepDbError::ProjectUniqueName {
            registry_path: new_key.to_string(),
        });
    }

    let current = samples::load_samples(tx, project.id)?;
    let diff = desired_samples
        .map(|desired| SampleDiffer::new(IdentityMode::Required).diff(&current, &desired))
        .transpose()?;

    // Writes.
    let snapshot = history::capture_snapshot(tx, &project)?;
    let previous_digest = project.digest.clone();
    let previous_name_key = sample_name_key(&project.config).to_string();

    let mut new_config = config.unwrap_or_else(|| project.config.clone());
    new_config.insert(PepConfig::NAME_KEY.to_string(), Value::String(new_name.clone()));
    new_config.insert(
        PepConfig::DESCRIPTION_KEY.to_string(),
        Value::String(new_description.clone()),
    );
    let name_key = sample_name_key(&new_config).to_string();

    let (deleted, updated, inserted, moved) = match &diff {
        Some(diff) => {
            samples::apply_sample_diff(tx, project.id, diff, &name_key)?;
            project.digest = diff.digest();
            project.number_of_samples = diff.rows.len();
            (
                diff.deletions.len(),
                diff.updates.len(),
                diff.insertions.len(),
                diff.moves().len(),
            )
        }
        None => (0, 0, 0, 0),
    };
    if name_key != previous_name_key {
        samples::reindex_sample_names(tx, project.id, &name_key)?;
    }

    if let Some(subsamples) = &subsamples {
        samples::replace_subsamples(tx, project.id, subsamples)?;
    }

    project.name = new_name;
    project.tag = new_tag;
    project.config = new_config;
    project.description = new_description;
    project.schema_id = schema_id;
    if let Some(private) = is_private {
        project.private = private;
    }
    if let Some(pop) = pop {
        project.pop = pop;
    }
    project.last_update_date = now_timestamp();

    let user = user.unwrap_or_else(|| project.namespace.clone());
    let change_id = history::record_change(tx, &mut project, &snapshot, &previous_digest, &user)?;
    projects::save_project(tx, &project)?;
    history::prune(tx, project.id, max_history_entries)?;

    Ok(UpdateOutcome {
        registry_path: project.registry_path(),
        change_id: Some(change_id),
        digest: project.digest,
        deleted,
        updated,
        inserted,
        moved,
    })
}
