//! Project history: list, fetch, restore and prune snapshots.

use crate::config::PepConfig;
use crate::differ::without_identifier;
use crate::error::{PepDbError, Result};
use crate::models::{HistoryAnnotation, Project, ProjectUpdateRequest};
use crate::project::{apply_update, UpdateOutcome};
use crate::registry_path::RegistryPath;
use crate::store::{history, projects, PepStore};
use chrono::{SecondsFormat, TimeDelta, Utc};
use tracing::info;

/// History operations over one store.
#[derive(Clone, Copy)]
pub struct HistoryService<'a> {
    store: &'a PepStore,
    max_history_entries: usize,
}

impl<'a> HistoryService<'a> {
    pub(crate) fn new(store: &'a PepStore, max_history_entries: usize) -> Self {
        Self {
            store,
            max_history_entries,
        }
    }

    /// History entries of a project, newest first.
    pub fn get_history(&self, key: &RegistryPath) -> Result<HistoryAnnotation> {
        self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            Ok(HistoryAnnotation {
                namespace: project.namespace.clone(),
                name: project.name.clone(),
                tag: project.tag.clone(),
                history: history::list_changes(tx, project.id)?,
            })
        })
    }

    /// The project as it was before change `change_id` was applied.
    pub fn get_project_from_history(
        &self,
        key: &RegistryPath,
        change_id: i64,
        with_ids: bool,
    ) -> Result<Project> {
        let mut snapshot = self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            history::load_snapshot(tx, &project, change_id)
        })?;

        if !with_ids {
            snapshot.samples = snapshot
                .samples
                .iter()
                .map(|sample| without_identifier(sample, PepConfig::SAMPLE_ID_KEY))
                .collect();
        }
        Ok(snapshot)
    }

    /// Make the state saved in `change_id` current again.
    ///
    /// Restoring is an ordinary update with the snapshot as full
    /// replacement, so it is itself recorded as a new history entry and the
    /// entry being restored stays in place.
    pub fn restore(&self, key: &RegistryPath, change_id: i64, user: Option<&str>) -> Result<UpdateOutcome> {
        let outcome = self.store.write(|tx| {
            let project = projects::require_project(tx, key)?;
            let snapshot = history::load_snapshot(tx, &project, change_id)?;

            let mut request = ProjectUpdateRequest::replace_project(snapshot);
            request.user = user.map(str::to_string);
            apply_update(tx, key, request, self.max_history_entries)
        })?;

        info!(
            "Restored project {} to change {} (new change {:?})",
            outcome.registry_path, change_id, outcome.change_id
        );
        Ok(outcome)
    }

    /// Delete one entry, or every entry of the project when `change_id` is
    /// `None`. Returns the number of entries removed.
    pub fn delete_history(&self, key: &RegistryPath, change_id: Option<i64>) -> Result<usize> {
        let removed = self.store.write(|tx| {
            let project = projects::require_project(tx, key)?;
            match change_id {
                Some(change_id) => history::delete_change(tx, &project, change_id).map(|()| 1),
                None => history::delete_all_changes(tx, project.id),
            }
        })?;
        info!("Deleted {} history entries of {}", removed, key);
        Ok(removed)
    }

    /// Delete entries of every project older than `days` days.
    pub fn clean_history(&self, days: i64) -> Result<usize> {
        if days < 0 {
            return Err(PepDbError::Validation {
                field: "days".to_string(),
                message: "must not be negative".to_string(),
            });
        }
        let cutoff = TimeDelta::try_days(days)
            .and_then(|delta| Utc::now().checked_sub_signed(delta))
            .ok_or_else(|| PepDbError::Validation {
                field: "days".to_string(),
                message: format!("{days} days is out of range"),
            })?
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        let removed = self.store.write(|tx| history::delete_older_than(tx, &cutoff))?;
        info!("Cleaned {} history entries older than {} days", removed, days);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateOptions;
    use crate::project::ProjectService;
    use serde_json::{json, Map, Value};

    fn attrs(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn setup(store: &PepStore) -> RegistryPath {
        let project = Project::new(
            attrs(json!({"name": "pep"})),
            vec![attrs(json!({"sample_name": "a"})), attrs(json!({"sample_name": "b"}))],
            vec![],
        );
        ProjectService::new(store, 3)
            .create(project, "ns", CreateOptions::default())
            .unwrap()
    }

    fn bump(store: &PepStore, key: &RegistryPath, description: &str) {
        ProjectService::new(store, 3)
            .update(
                key,
                ProjectUpdateRequest {
                    description: Some(description.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[test]
    fn test_history_newest_first_and_capped() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        for i in 0..5 {
            bump(&store, &key, &format!("v{i}"));
        }

        let history = HistoryService::new(&store, 3).get_history(&key).unwrap();
        let ids: Vec<i64> = history.history.iter().map(|h| h.change_id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn test_change_ids_not_reused_after_delete() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        let service = HistoryService::new(&store, 3);
        bump(&store, &key, "one");
        assert_eq!(service.delete_history(&key, None).unwrap(), 1);

        bump(&store, &key, "two");
        let ids: Vec<i64> = service
            .get_history(&key)
            .unwrap()
            .history
            .iter()
            .map(|h| h.change_id)
            .collect();
        assert_eq!(ids, vec![2]);

        let err = service.delete_history(&key, Some(1)).unwrap_err();
        assert!(matches!(err, PepDbError::HistoryNotFound { change_id: 1, .. }));
    }

    #[test]
    fn test_snapshot_without_ids() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        bump(&store, &key, "changed");

        let service = HistoryService::new(&store, 3);
        let with_ids = service.get_project_from_history(&key, 1, true).unwrap();
        assert!(with_ids.samples.iter().all(|s| s.contains_key("ph_id")));
        let plain = service.get_project_from_history(&key, 1, false).unwrap();
        assert!(plain.samples.iter().all(|s| !s.contains_key("ph_id")));
        assert_eq!(plain.description(), Some(""));

        assert!(service
            .get_project_from_history(&key, 9, false)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_clean_history() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        bump(&store, &key, "changed");

        let service = HistoryService::new(&store, 3);
        assert_eq!(service.clean_history(1).unwrap(), 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(service.clean_history(0).unwrap(), 1);
        assert!(service.clean_history(-1).is_err());
    }
}
