//! Single-sample operations.
//!
//! Samples are addressed by the value of the project's sample-name
//! attribute (`sample_table_index` in the config, `sample_name` by default).
//! Names are not unique; the first row carrying the name is the one acted
//! on. Every change is recorded in the project history like any other
//! update.

use crate::config::PepConfig;
use crate::differ::without_identifier;
use crate::error::{PepDbError, Result};
use crate::identity::assign_guid;
use crate::models::{sample_name_key, sample_name_of, Project, SampleAttributes};
use crate::registry_path::RegistryPath;
use crate::store::projects::{self, ProjectRow};
use crate::store::{history, now_timestamp, samples, PepStore};
use rusqlite::Connection;
use tracing::info;

/// Sample operations over one store.
#[derive(Clone, Copy)]
pub struct SampleService<'a> {
    store: &'a PepStore,
    max_history_entries: usize,
}

impl<'a> SampleService<'a> {
    pub(crate) fn new(store: &'a PepStore, max_history_entries: usize) -> Self {
        Self {
            store,
            max_history_entries,
        }
    }

    /// Attributes of the named sample.
    pub fn get(&self, key: &RegistryPath, sample_name: &str) -> Result<SampleAttributes> {
        self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            samples::find_sample_by_name(tx, project.id, sample_name)?
                .map(|row| row.attributes)
                .ok_or_else(|| sample_not_found(key, sample_name))
        })
    }

    /// Append a sample at the end of the table.
    ///
    /// If a sample with the same name exists, `overwrite` replaces its
    /// attributes in place; otherwise the call fails with
    /// `SampleAlreadyExists`.
    pub fn add(&self, key: &RegistryPath, sample: SampleAttributes, overwrite: bool) -> Result<()> {
        let sample = without_identifier(&sample, PepConfig::SAMPLE_ID_KEY);

        self.store.write(|tx| {
            let mut project = projects::require_project(tx, key)?;
            let name_key = sample_name_key(&project.config).to_string();
            let sample_name =
                sample_name_of(&sample, &name_key).ok_or_else(|| PepDbError::Validation {
                    field: name_key.clone(),
                    message: "sample has no name attribute".to_string(),
                })?;

            let snapshot = history::capture_snapshot(tx, &project)?;
            match samples::find_sample_by_name(tx, project.id, &sample_name)? {
                Some(existing) if overwrite => {
                    samples::update_sample(tx, project.id, &existing.guid, &sample, &name_key)?;
                }
                Some(_) => {
                    return Err(PepDbError::SampleAlreadyExists {
                        registry_path: key.to_string(),
                        sample_name,
                    })
                }
                None => {
                    let row_number = samples::count_samples(tx, project.id)?;
                    samples::insert_sample(
                        tx,
                        project.id,
                        &assign_guid(),
                        &sample,
                        row_number,
                        &name_key,
                    )?;
                }
            }

            self.commit_change(tx, &mut project, &snapshot)
        })?;

        info!("Added sample to {}", key);
        Ok(())
    }

    /// Change the named sample.
    ///
    /// With `full_update` the stored attributes are replaced by `update`;
    /// otherwise `update` is merged into them, overriding existing keys.
    pub fn update(
        &self,
        key: &RegistryPath,
        sample_name: &str,
        update: SampleAttributes,
        full_update: bool,
    ) -> Result<()> {
        let update = without_identifier(&update, PepConfig::SAMPLE_ID_KEY);

        self.store.write(|tx| {
            let mut project = projects::require_project(tx, key)?;
            let existing = samples::find_sample_by_name(tx, project.id, sample_name)?
                .ok_or_else(|| sample_not_found(key, sample_name))?;

            let attributes = if full_update {
                update
            } else {
                let mut merged = existing.attributes.clone();
                merged.extend(update);
                merged
            };

            if attributes == existing.attributes {
                return Ok(());
            }

            let snapshot = history::capture_snapshot(tx, &project)?;
            let name_key = sample_name_key(&project.config).to_string();
            samples::update_sample(tx, project.id, &existing.guid, &attributes, &name_key)?;
            self.commit_change(tx, &mut project, &snapshot)
        })?;

        info!("Updated sample {} of {}", sample_name, key);
        Ok(())
    }

    /// Remove the named sample; the rows after it move up by one.
    pub fn delete(&self, key: &RegistryPath, sample_name: &str) -> Result<()> {
        self.store.write(|tx| {
            let mut project = projects::require_project(tx, key)?;
            let existing = samples::find_sample_by_name(tx, project.id, sample_name)?
                .ok_or_else(|| sample_not_found(key, sample_name))?;

            let snapshot = history::capture_snapshot(tx, &project)?;
            samples::delete_sample(tx, project.id, &existing)?;
            self.commit_change(tx, &mut project, &snapshot)
        })?;

        info!("Deleted sample {} of {}", sample_name, key);
        Ok(())
    }

    /// Refresh digest, count and update date after a sample change and
    /// record the prior state.
    fn commit_change(
        &self,
        tx: &Connection,
        project: &mut ProjectRow,
        snapshot: &Project,
    ) -> Result<()> {
        let previous_digest = project.digest.clone();
        let (digest, count) = samples::sample_table_summary(tx, project.id)?;
        project.digest = digest;
        project.number_of_samples = count;
        project.last_update_date = now_timestamp();

        let user = project.namespace.clone();
        history::record_change(tx, project, snapshot, &previous_digest, &user)?;
        projects::save_project(tx, project)?;
        history::prune(tx, project.id, self.max_history_entries)?;
        Ok(())
    }
}

fn sample_not_found(key: &RegistryPath, sample_name: &str) -> PepDbError {
    PepDbError::SampleNotFound {
        registry_path: key.to_string(),
        sample_name: sample_name.to_string(),
    }
}
