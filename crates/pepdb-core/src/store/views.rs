//! View rows and their sample memberships.
//!
//! Memberships point at sample row ids, so they follow a sample through
//! edits and moves and are dropped when the sample row is deleted.

use crate::differ::CurrentRow;
use crate::error::Result;
use crate::models::{SampleAttributes, ViewAnnotation};
use crate::store::samples::with_identifier;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ViewRow {
    pub id: i64,
    pub name: String,
    pub description: String,
}

pub(crate) fn find_view(conn: &Connection, project_id: i64, name: &str) -> Result<Option<ViewRow>> {
    Ok(conn
        .query_row(
            "SELECT id, name, description FROM views WHERE project_id = ?1 AND name = ?2",
            params![project_id, name],
            |row| {
                Ok(ViewRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            },
        )
        .optional()?)
}

/// Insert a view row. Returns `None` when the project already has a view
/// with this name.
pub(crate) fn insert_view(
    conn: &Connection,
    project_id: i64,
    name: &str,
    description: &str,
) -> Result<Option<i64>> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO views (project_id, name, description) VALUES (?1, ?2, ?3)",
        params![project_id, name, description],
    )?;
    Ok((inserted == 1).then(|| conn.last_insert_rowid()))
}

/// Row id of the first sample (by row order) with the given indexed name.
pub(crate) fn sample_id_by_name(
    conn: &Connection,
    project_id: i64,
    sample_name: &str,
) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM samples WHERE project_id = ?1 AND sample_name = ?2
             ORDER BY row_number LIMIT 1",
            params![project_id, sample_name],
            |row| row.get(0),
        )
        .optional()?)
}

/// Add a sample to a view. Returns false if it was already a member.
pub(crate) fn add_member(conn: &Connection, view_id: i64, sample_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO view_samples (view_id, sample_id) VALUES (?1, ?2)",
        params![view_id, sample_id],
    )?;
    Ok(inserted == 1)
}

/// Remove a sample from a view. Returns false if it was not a member.
pub(crate) fn remove_member(conn: &Connection, view_id: i64, sample_id: i64) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM view_samples WHERE view_id = ?1 AND sample_id = ?2",
        params![view_id, sample_id],
    )?;
    Ok(removed == 1)
}

/// Member samples of a view, in the project's row order.
pub(crate) fn load_members(
    conn: &Connection,
    view_id: i64,
    with_ids: bool,
) -> Result<Vec<SampleAttributes>> {
    let mut stmt = conn.prepare(
        "SELECT s.guid, s.sample_json, s.row_number FROM view_samples vs
         JOIN samples s ON s.id = vs.sample_id
         WHERE vs.view_id = ?1 ORDER BY s.row_number, s.id",
    )?;
    let rows = stmt.query_map(params![view_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, usize>(2)?,
        ))
    })?;

    let mut samples = Vec::new();
    for row in rows {
        let (guid, sample_json, row_number) = row?;
        let row = CurrentRow {
            guid,
            attributes: serde_json::from_str(&sample_json)?,
            row_number,
        };
        samples.push(if with_ids { with_identifier(row) } else { row.attributes });
    }
    Ok(samples)
}

/// Views of a project with their member counts, by name.
pub(crate) fn list_views(conn: &Connection, project_id: i64) -> Result<Vec<ViewAnnotation>> {
    let mut stmt = conn.prepare(
        "SELECT v.name, v.description, COUNT(vs.sample_id) FROM views v
         LEFT JOIN view_samples vs ON vs.view_id = v.id
         WHERE v.project_id = ?1
         GROUP BY v.id ORDER BY v.name",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok(ViewAnnotation {
            name: row.get(0)?,
            description: row.get(1)?,
            number_of_samples: row.get(2)?,
        })
    })?;

    let mut views = Vec::new();
    for row in rows {
        views.push(row?);
    }
    Ok(views)
}

pub(crate) fn count_members(conn: &Connection, view_id: i64) -> Result<usize> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM view_samples WHERE view_id = ?1",
        params![view_id],
        |row| row.get(0),
    )?)
}

pub(crate) fn delete_view(conn: &Connection, view_id: i64) -> Result<()> {
    conn.execute("DELETE FROM view_samples WHERE view_id = ?1", params![view_id])?;
    conn.execute("DELETE FROM views WHERE id = ?1", params![view_id])?;
    Ok(())
}

/// Delete every view of a project. Returns the number of views removed.
pub(crate) fn delete_project_views(conn: &Connection, project_id: i64) -> Result<usize> {
    let members = conn.execute(
        "DELETE FROM view_samples WHERE view_id IN (
             SELECT id FROM views WHERE project_id = ?1
         )",
        params![project_id],
    )?;
    let views = conn.execute("DELETE FROM views WHERE project_id = ?1", params![project_id])?;
    if views > 0 {
        debug!("Dropped {} views ({} memberships) of project {}", views, members, project_id);
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry_path::RegistryPath;
    use crate::store::projects::{insert_project, NewProject};
    use crate::store::samples::{delete_sample, find_sample_by_name, insert_sample};
    use crate::store::PepStore;
    use serde_json::{json, Map, Value};

    fn attrs(value: Value) -> SampleAttributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn project_with_samples(conn: &Connection, names: &[&str]) -> i64 {
        let key = RegistryPath::new("ns", "pep", "default");
        let config = Map::new();
        let id = insert_project(
            conn,
            &NewProject {
                key: &key,
                digest: "",
                config: &config,
                description: "",
                private: false,
                number_of_samples: names.len(),
                submission_date: "",
                last_update_date: "",
                schema_id: None,
                pop: false,
                forked_from_id: None,
            },
        )
        .unwrap();
        for (i, name) in names.iter().enumerate() {
            insert_sample(conn, id, &format!("g{i}"), &attrs(json!({"sample_name": name})), i, "sample_name")
                .unwrap();
        }
        id
    }

    #[test]
    fn test_members_follow_row_order() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let project_id = project_with_samples(tx, &["A", "B", "C"]);
                let view_id = insert_view(tx, project_id, "v", "")?.unwrap();
                assert!(insert_view(tx, project_id, "v", "again")?.is_none());

                for name in ["C", "A"] {
                    let sample_id = sample_id_by_name(tx, project_id, name)?.unwrap();
                    assert!(add_member(tx, view_id, sample_id)?);
                }
                let a = sample_id_by_name(tx, project_id, "A")?.unwrap();
                assert!(!add_member(tx, view_id, a)?);

                let members = load_members(tx, view_id, true)?;
                assert_eq!(members[0]["sample_name"], json!("A"));
                assert_eq!(members[0]["ph_id"], json!("g0"));
                assert_eq!(members[1]["sample_name"], json!("C"));

                assert!(remove_member(tx, view_id, a)?);
                assert!(!remove_member(tx, view_id, a)?);
                assert_eq!(count_members(tx, view_id)?, 1);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_deleting_a_sample_drops_its_memberships() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let project_id = project_with_samples(tx, &["A", "B"]);
                let view_id = insert_view(tx, project_id, "v", "")?.unwrap();
                let b = sample_id_by_name(tx, project_id, "B")?.unwrap();
                add_member(tx, view_id, b)?;

                let row = find_sample_by_name(tx, project_id, "B")?.unwrap();
                delete_sample(tx, project_id, &row)?;
                assert_eq!(count_members(tx, view_id)?, 0);

                assert_eq!(list_views(tx, project_id)?[0].number_of_samples, 0);
                assert_eq!(delete_project_views(tx, project_id)?, 1);
                assert!(find_view(tx, project_id, "v")?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
