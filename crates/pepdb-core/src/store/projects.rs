//! Project rows and the ownership cascade.

use crate::error::{PepDbError, Result};
use crate::registry_path::RegistryPath;
use crate::store::views;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::debug;

const PROJECT_COLUMNS: &str = "id, namespace, name, tag, digest, config_json, description, \
     private, number_of_samples, submission_date, last_update_date, schema_id, pop, \
     forked_from_id, next_change_id";

/// A stored project without its samples.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectRow {
    pub id: i64,
    pub namespace: String,
    pub name: String,
    pub tag: String,
    pub digest: String,
    pub config: Map<String, Value>,
    pub description: String,
    pub private: bool,
    pub number_of_samples: usize,
    pub submission_date: String,
    pub last_update_date: String,
    pub schema_id: Option<i64>,
    pub pop: bool,
    pub forked_from_id: Option<i64>,
    pub next_change_id: i64,
}

impl ProjectRow {
    pub fn registry_path(&self) -> RegistryPath {
        RegistryPath::new(&self.namespace, &self.name, &self.tag)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<(Self, String)> {
        let config_json: String = row.get(5)?;
        Ok((
            Self {
                id: row.get(0)?,
                namespace: row.get(1)?,
                name: row.get(2)?,
                tag: row.get(3)?,
                digest: row.get(4)?,
                config: Map::new(),
                description: row.get(6)?,
                private: row.get(7)?,
                number_of_samples: row.get(8)?,
                submission_date: row.get(9)?,
                last_update_date: row.get(10)?,
                schema_id: row.get(11)?,
                pop: row.get(12)?,
                forked_from_id: row.get(13)?,
                next_change_id: row.get(14)?,
            },
            config_json,
        ))
    }
}

/// Values of a project row that is about to be inserted.
#[derive(Debug, Clone)]
pub(crate) struct NewProject<'a> {
    pub key: &'a RegistryPath,
    pub digest: &'a str,
    pub config: &'a Map<String, Value>,
    pub description: &'a str,
    pub private: bool,
    pub number_of_samples: usize,
    pub submission_date: &'a str,
    pub last_update_date: &'a str,
    pub schema_id: Option<i64>,
    pub pop: bool,
    pub forked_from_id: Option<i64>,
}

fn decode(pair: (ProjectRow, String)) -> Result<ProjectRow> {
    let (mut project, config_json) = pair;
    project.config = serde_json::from_str(&config_json)?;
    Ok(project)
}

pub(crate) fn find_project(conn: &Connection, key: &RegistryPath) -> Result<Option<ProjectRow>> {
    let sql = format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE namespace = ?1 AND name = ?2 AND tag = ?3"
    );
    let found = conn
        .query_row(&sql, params![key.namespace, key.name, key.tag], ProjectRow::from_row)
        .optional()?;
    found.map(decode).transpose()
}

/// Load a project or fail with `ProjectNotFound`.
pub(crate) fn require_project(conn: &Connection, key: &RegistryPath) -> Result<ProjectRow> {
    find_project(conn, key)?.ok_or_else(|| PepDbError::ProjectNotFound {
        registry_path: key.to_string(),
    })
}

pub(crate) fn project_exists(conn: &Connection, key: &RegistryPath) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT id FROM projects WHERE namespace = ?1 AND name = ?2 AND tag = ?3",
            params![key.namespace, key.name, key.tag],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a project row. A key collision is reported as `ProjectUniqueName`.
pub(crate) fn insert_project(conn: &Connection, project: &NewProject<'_>) -> Result<i64> {
    let config_json = serde_json::to_string(project.config)?;
    let inserted = conn.execute(
        "INSERT INTO projects (namespace, name, tag, digest, config_json, description, private,
             number_of_samples, submission_date, last_update_date, schema_id, pop, forked_from_id,
             next_change_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)",
        params![
            project.key.namespace,
            project.key.name,
            project.key.tag,
            project.digest,
            config_json,
            project.description,
            project.private,
            project.number_of_samples,
            project.submission_date,
            project.last_update_date,
            project.schema_id,
            project.pop,
            project.forked_from_id,
        ],
    );

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if PepDbError::is_unique_violation(&e) => Err(PepDbError::ProjectUniqueName {
            registry_path: project.key.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Write every scalar column of `project` back to its row.
pub(crate) fn save_project(conn: &Connection, project: &ProjectRow) -> Result<()> {
    let config_json = serde_json::to_string(&project.config)?;
    let updated = conn.execute(
        "UPDATE projects SET namespace = ?2, name = ?3, tag = ?4, digest = ?5, config_json = ?6,
             description = ?7, private = ?8, number_of_samples = ?9, last_update_date = ?10,
             schema_id = ?11, pop = ?12, next_change_id = ?13
         WHERE id = ?1",
        params![
            project.id,
            project.namespace,
            project.name,
            project.tag,
            project.digest,
            config_json,
            project.description,
            project.private,
            project.number_of_samples,
            project.last_update_date,
            project.schema_id,
            project.pop,
            project.next_change_id,
        ],
    );

    match updated {
        Ok(_) => Ok(()),
        Err(e) if PepDbError::is_unique_violation(&e) => Err(PepDbError::ProjectUniqueName {
            registry_path: project.registry_path().to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Delete a project and everything it owns.
///
/// Forks keep existing; their `forked_from_id` is cleared.
pub(crate) fn delete_project_cascade(conn: &Connection, project_id: i64) -> Result<()> {
    let views = views::delete_project_views(conn, project_id)?;
    let groups = conn.execute(
        "DELETE FROM group_projects WHERE project_id = ?1",
        params![project_id],
    )?;
    let samples = conn.execute("DELETE FROM samples WHERE project_id = ?1", params![project_id])?;
    let subsamples = conn.execute(
        "DELETE FROM subsamples WHERE project_id = ?1",
        params![project_id],
    )?;
    let history = conn.execute("DELETE FROM history WHERE project_id = ?1", params![project_id])?;
    let forks = conn.execute(
        "UPDATE projects SET forked_from_id = NULL WHERE forked_from_id = ?1",
        params![project_id],
    )?;
    conn.execute("DELETE FROM projects WHERE id = ?1", params![project_id])?;

    debug!(
        "Deleted project {} ({} samples, {} subsample rows, {} history entries, {} views, \
         {} group memberships, {} forks detached)",
        project_id, samples, subsamples, history, views, groups, forks
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PepStore;
    use serde_json::json;

    fn find_project_by_id(conn: &Connection, id: i64) -> Result<Option<ProjectRow>> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        let found = conn
            .query_row(&sql, params![id], ProjectRow::from_row)
            .optional()?;
        found.map(decode).transpose()
    }

    fn new_project<'a>(key: &'a RegistryPath, config: &'a Map<String, Value>) -> NewProject<'a> {
        NewProject {
            key,
            digest: "d41d8cd98f00b204e9800998ecf8427e",
            config,
            description: "",
            private: false,
            number_of_samples: 0,
            submission_date: "2024-01-01T00:00:00.000000Z",
            last_update_date: "2024-01-01T00:00:00.000000Z",
            schema_id: None,
            pop: false,
            forked_from_id: None,
        }
    }

    #[test]
    fn test_insert_find_and_conflict() {
        let store = PepStore::open_in_memory().unwrap();
        let key = RegistryPath::new("ns", "pep", "default");
        let mut config = Map::new();
        config.insert("name".into(), json!("pep"));

        store
            .write(|tx| {
                let id = insert_project(tx, &new_project(&key, &config))?;
                let row = require_project(tx, &key)?;
                assert_eq!(row.id, id);
                assert_eq!(row.config, config);
                assert_eq!(row.next_change_id, 1);
                assert!(project_exists(tx, &key)?);

                let err = insert_project(tx, &new_project(&key, &config)).unwrap_err();
                assert!(matches!(err, PepDbError::ProjectUniqueName { .. }));
                Ok(())
            })
            .unwrap();

        let missing = RegistryPath::new("ns", "other", "default");
        let err = store.read(|tx| require_project(tx, &missing)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_foreign_key_failure_is_not_a_name_conflict() {
        let store = PepStore::open_in_memory().unwrap();
        let key = RegistryPath::new("ns", "pep", "default");
        let config = Map::new();

        let err = store
            .write(|tx| {
                let mut project = new_project(&key, &config);
                project.schema_id = Some(9999);
                insert_project(tx, &project)
            })
            .unwrap_err();
        assert!(matches!(err, PepDbError::Database { .. }));
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_cascade_detaches_forks() {
        let store = PepStore::open_in_memory().unwrap();
        let parent = RegistryPath::new("ns", "parent", "default");
        let child = RegistryPath::new("ns", "child", "default");
        let config = Map::new();

        store
            .write(|tx| {
                let parent_id = insert_project(tx, &new_project(&parent, &config))?;
                let mut fork = new_project(&child, &config);
                fork.forked_from_id = Some(parent_id);
                let child_id = insert_project(tx, &fork)?;

                delete_project_cascade(tx, parent_id)?;
                assert!(find_project_by_id(tx, parent_id)?.is_none());
                let fork = find_project_by_id(tx, child_id)?.unwrap();
                assert_eq!(fork.forked_from_id, None);
                Ok(())
            })
            .unwrap();
    }
}
