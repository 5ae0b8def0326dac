//! Named sample subsets of a project.
//!
//! A view stores references to sample rows, not copies. Editing a sample
//! shows up in every view holding it; deleting a sample drops it from its
//! views; deleting the project deletes its views.

use crate::error::{PepDbError, Result};
use crate::models::{Project, ProjectViews, SampleAttributes, ViewAnnotation};
use crate::registry_path::{validate_identifier, RegistryPath};
use crate::store::projects::{self, ProjectRow};
use crate::store::{samples, views, PepStore};
use rusqlite::Connection;
use tracing::{info, warn};

#[derive(Clone, Copy)]
pub struct ViewService<'a> {
    store: &'a PepStore,
}

fn require_view(conn: &Connection, project: &ProjectRow, view_name: &str) -> Result<views::ViewRow> {
    views::find_view(conn, project.id, view_name)?.ok_or_else(|| PepDbError::ViewNotFound {
        registry_path: project.registry_path().to_string(),
        view_name: view_name.to_string(),
    })
}

fn require_sample_id(conn: &Connection, project: &ProjectRow, sample_name: &str) -> Result<i64> {
    views::sample_id_by_name(conn, project.id, sample_name)?.ok_or_else(|| {
        PepDbError::SampleNotFound {
            registry_path: project.registry_path().to_string(),
            sample_name: sample_name.to_string(),
        }
    })
}

impl<'a> ViewService<'a> {
    pub(crate) fn new(store: &'a PepStore) -> Self {
        Self { store }
    }

    /// Create a view over the named samples of `key`.
    ///
    /// Names resolve to the first sample (by row order) carrying them. An
    /// unknown name fails the whole call unless `skip_missing` is set, in
    /// which case it is left out.
    pub fn create<S: AsRef<str>>(
        &self,
        key: &RegistryPath,
        view_name: &str,
        sample_names: &[S],
        description: &str,
        skip_missing: bool,
    ) -> Result<ViewAnnotation> {
        validate_identifier("view", view_name)?;

        let annotation = self.store.write(|tx| {
            let project = projects::require_project(tx, key)?;
            let view_id = views::insert_view(tx, project.id, view_name, description)?.ok_or_else(
                || PepDbError::ViewAlreadyExists {
                    registry_path: key.to_string(),
                    view_name: view_name.to_string(),
                },
            )?;

            for sample_name in sample_names {
                let sample_name = sample_name.as_ref();
                let sample_id = match views::sample_id_by_name(tx, project.id, sample_name)? {
                    Some(id) => id,
                    None if skip_missing => {
                        warn!("Sample '{}' not found in {}, skipped", sample_name, key);
                        continue;
                    }
                    None => {
                        return Err(PepDbError::SampleNotFound {
                            registry_path: key.to_string(),
                            sample_name: sample_name.to_string(),
                        })
                    }
                };
                if !views::add_member(tx, view_id, sample_id)? {
                    return Err(PepDbError::SampleAlreadyInView {
                        view_name: view_name.to_string(),
                        sample_name: sample_name.to_string(),
                    });
                }
            }

            Ok(ViewAnnotation {
                name: view_name.to_string(),
                description: description.to_string(),
                number_of_samples: views::count_members(tx, view_id)?,
            })
        })?;

        info!(
            "Created view '{}' of {} ({} samples)",
            view_name, key, annotation.number_of_samples
        );
        Ok(annotation)
    }

    /// The project config with only the view's samples, in project row
    /// order. Subsample tables are not part of a view.
    pub fn get(&self, key: &RegistryPath, view_name: &str, with_ids: bool) -> Result<Project> {
        self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            let view = require_view(tx, &project, view_name)?;
            Ok(Project::new(
                project.config.clone(),
                views::load_members(tx, view.id, with_ids)?,
                Vec::new(),
            ))
        })
    }

    pub fn annotation(&self, key: &RegistryPath, view_name: &str) -> Result<ViewAnnotation> {
        self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            let view = require_view(tx, &project, view_name)?;
            Ok(ViewAnnotation {
                number_of_samples: views::count_members(tx, view.id)?,
                name: view.name,
                description: view.description,
            })
        })
    }

    /// Every view of a project, by name.
    pub fn list(&self, key: &RegistryPath) -> Result<ProjectViews> {
        self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            Ok(ProjectViews {
                views: views::list_views(tx, project.id)?,
                namespace: project.namespace,
                name: project.name,
                tag: project.tag,
            })
        })
    }

    /// Add samples to an existing view. Nothing is added if any name is
    /// unknown or already a member.
    pub fn add_samples<S: AsRef<str>>(
        &self,
        key: &RegistryPath,
        view_name: &str,
        sample_names: &[S],
    ) -> Result<()> {
        self.store.write(|tx| {
            let project = projects::require_project(tx, key)?;
            let view = require_view(tx, &project, view_name)?;
            for sample_name in sample_names {
                let sample_name = sample_name.as_ref();
                let sample_id = require_sample_id(tx, &project, sample_name)?;
                if !views::add_member(tx, view.id, sample_id)? {
                    return Err(PepDbError::SampleAlreadyInView {
                        view_name: view_name.to_string(),
                        sample_name: sample_name.to_string(),
                    });
                }
            }
            Ok(())
        })?;
        info!("Added {} samples to view '{}' of {}", sample_names.len(), view_name, key);
        Ok(())
    }

    /// Take one sample out of a view. The sample itself is untouched.
    pub fn remove_sample(&self, key: &RegistryPath, view_name: &str, sample_name: &str) -> Result<()> {
        self.store.write(|tx| {
            let project = projects::require_project(tx, key)?;
            let view = require_view(tx, &project, view_name)?;
            let sample_id = require_sample_id(tx, &project, sample_name)?;
            if views::remove_member(tx, view.id, sample_id)? {
                Ok(())
            } else {
                Err(PepDbError::SampleNotInView {
                    view_name: view_name.to_string(),
                    sample_name: sample_name.to_string(),
                })
            }
        })?;
        info!("Removed sample '{}' from view '{}' of {}", sample_name, view_name, key);
        Ok(())
    }

    pub fn delete(&self, key: &RegistryPath, view_name: &str) -> Result<()> {
        self.store.write(|tx| {
            let project = projects::require_project(tx, key)?;
            let view = require_view(tx, &project, view_name)?;
            views::delete_view(tx, view.id)
        })?;
        info!("Deleted view '{}' of {}", view_name, key);
        Ok(())
    }

    /// An unsaved view: the project config with the named samples, in the
    /// order given.
    pub fn snap<S: AsRef<str>>(&self, key: &RegistryPath, sample_names: &[S]) -> Result<Project> {
        self.store.read(|tx| {
            let project = projects::require_project(tx, key)?;
            let mut selected: Vec<SampleAttributes> = Vec::with_capacity(sample_names.len());
            for sample_name in sample_names {
                let sample_name = sample_name.as_ref();
                let row = samples::find_sample_by_name(tx, project.id, sample_name)?.ok_or_else(
                    || PepDbError::SampleNotFound {
                        registry_path: key.to_string(),
                        sample_name: sample_name.to_string(),
                    },
                )?;
                selected.push(row.attributes);
            }
            Ok(Project::new(project.config.clone(), selected, Vec::new()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateOptions, ProjectUpdateRequest};
    use crate::project::ProjectService;
    use crate::sample::SampleService;
    use serde_json::{json, Map, Value};

    fn setup(store: &PepStore) -> RegistryPath {
        let mut subsample = Map::new();
        subsample.insert("sample_name".into(), json!("a"));
        subsample.insert("file".into(), json!("a_1.fq"));
        let mut config = Map::new();
        config.insert("name".into(), json!("pep"));
        let samples = ["a", "b", "c", "d"]
            .iter()
            .map(|name| {
                let mut row = Map::new();
                row.insert("sample_name".into(), Value::String(name.to_string()));
                row
            })
            .collect();
        ProjectService::new(store, 10)
            .create(
                Project::new(config, samples, vec![vec![subsample]]),
                "ns",
                CreateOptions::default(),
            )
            .unwrap()
    }

    fn names(project: &Project) -> Vec<&str> {
        project
            .samples
            .iter()
            .map(|s| s["sample_name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_create_get_and_list() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        let service = ViewService::new(&store);

        let created = service.create(&key, "odd", &["c", "a"], "first and third", false).unwrap();
        assert_eq!(created.number_of_samples, 2);

        let view = service.get(&key, "odd", false).unwrap();
        assert_eq!(names(&view), vec!["a", "c"]);
        assert_eq!(view.config["name"], json!("pep"));
        assert!(view.subsamples.is_empty());

        let with_ids = service.get(&key, "odd", true).unwrap();
        assert!(with_ids.samples[0].contains_key("ph_id"));

        let err = service.create(&key, "odd", &["b"], "", false).unwrap_err();
        assert!(matches!(err, PepDbError::ViewAlreadyExists { .. }));

        service.create(&key, "all", &["a", "b", "c", "d"], "", false).unwrap();
        let listed = service.list(&key).unwrap();
        assert_eq!(listed.tag, "default");
        let counts: Vec<_> = listed
            .views
            .iter()
            .map(|v| (v.name.as_str(), v.number_of_samples))
            .collect();
        assert_eq!(counts, vec![("all", 4), ("odd", 2)]);
    }

    #[test]
    fn test_create_missing_sample() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        let service = ViewService::new(&store);

        let err = service.create(&key, "v", &["a", "zzz"], "", false).unwrap_err();
        assert!(matches!(err, PepDbError::SampleNotFound { .. }));
        assert!(service.list(&key).unwrap().views.is_empty());

        let created = service.create(&key, "v", &["a", "zzz"], "", true).unwrap();
        assert_eq!(created.number_of_samples, 1);

        let missing = RegistryPath::new("ns", "nope", "default");
        let err = service.create(&missing, "v", &["a"], "", false).unwrap_err();
        assert!(matches!(err, PepDbError::ProjectNotFound { .. }));

        let err = service.create(&key, "a/b", &["a"], "", false).unwrap_err();
        assert!(matches!(err, PepDbError::Validation { .. }));
    }

    #[test]
    fn test_add_and_remove_samples() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        let service = ViewService::new(&store);
        service.create(&key, "v", &["a"], "", false).unwrap();

        service.add_samples(&key, "v", &["d", "b"]).unwrap();
        assert_eq!(names(&service.get(&key, "v", false).unwrap()), vec!["a", "b", "d"]);

        let err = service.add_samples(&key, "v", &["c", "a"]).unwrap_err();
        assert!(matches!(err, PepDbError::SampleAlreadyInView { .. }));
        assert_eq!(service.annotation(&key, "v").unwrap().number_of_samples, 3);

        service.remove_sample(&key, "v", "b").unwrap();
        let err = service.remove_sample(&key, "v", "b").unwrap_err();
        assert!(matches!(err, PepDbError::SampleNotInView { .. }));
        let err = service.remove_sample(&key, "v", "zzz").unwrap_err();
        assert!(matches!(err, PepDbError::SampleNotFound { .. }));
        let err = service.add_samples(&key, "nope", &["a"]).unwrap_err();
        assert!(matches!(err, PepDbError::ViewNotFound { .. }));

        service.delete(&key, "v").unwrap();
        assert!(service.get(&key, "v", false).unwrap_err().is_not_found());
        assert!(service.delete(&key, "v").unwrap_err().is_not_found());
    }

    #[test]
    fn test_views_follow_sample_edits() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        let service = ViewService::new(&store);
        service.create(&key, "v", &["b", "c"], "", false).unwrap();

        SampleService::new(&store, 10).delete(&key, "b").unwrap();
        assert_eq!(names(&service.get(&key, "v", false).unwrap()), vec!["c"]);

        let projects = ProjectService::new(&store, 10);
        let mut table = projects.get_samples(&key, true).unwrap();
        table.reverse();
        for row in &mut table {
            row.insert("protocol".into(), json!("rna"));
        }
        projects
            .update(&key, ProjectUpdateRequest::replace_samples(table))
            .unwrap();

        let view = service.get(&key, "v", false).unwrap();
        assert_eq!(names(&view), vec!["c"]);
        assert_eq!(view.samples[0]["protocol"], json!("rna"));
    }

    #[test]
    fn test_snap_keeps_requested_order() {
        let store = PepStore::open_in_memory().unwrap();
        let key = setup(&store);
        let service = ViewService::new(&store);

        let snap = service.snap(&key, &["d", "a"]).unwrap();
        assert_eq!(names(&snap), vec!["d", "a"]);
        assert!(!snap.samples[0].contains_key("ph_id"));

        let err = service.snap(&key, &["a", "zzz"]).unwrap_err();
        assert!(matches!(err, PepDbError::SampleNotFound { .. }));
        assert!(service.list(&key).unwrap().views.is_empty());
    }
}
