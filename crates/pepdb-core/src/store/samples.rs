//! Sample and subsample rows.

use crate::config::PepConfig;
use crate::differ::{CurrentRow, SampleDiff};
use crate::error::Result;
use crate::identity::compute_digest;
use crate::models::{sample_name_of, SampleAttributes};
use crate::ordering::is_contiguous;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

/// Stored samples of a project in row order.
pub(crate) fn load_samples(conn: &Connection, project_id: i64) -> Result<Vec<CurrentRow>> {
    let mut stmt = conn.prepare(
        "SELECT guid, sample_json, row_number FROM samples
         WHERE project_id = ?1 ORDER BY row_number, id",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, usize>(2)?,
        ))
    })?;

    let mut samples = Vec::new();
    for row in rows {
        let (guid, sample_json, row_number) = row?;
        samples.push(CurrentRow {
            guid,
            attributes: serde_json::from_str(&sample_json)?,
            row_number,
        });
    }
    Ok(samples)
}

/// Attach the GUID to a row's attributes under the reserved key.
pub(crate) fn with_identifier(row: CurrentRow) -> SampleAttributes {
    let mut attributes = row.attributes;
    attributes.insert(PepConfig::SAMPLE_ID_KEY.to_string(), Value::String(row.guid));
    attributes
}

/// Stored sample attributes in row order, optionally carrying their GUIDs.
pub(crate) fn load_sample_table(
    conn: &Connection,
    project_id: i64,
    with_ids: bool,
) -> Result<Vec<SampleAttributes>> {
    let rows = load_samples(conn, project_id)?;
    Ok(if with_ids {
        rows.into_iter().map(with_identifier).collect()
    } else {
        rows.into_iter().map(|row| row.attributes).collect()
    })
}

/// First sample (by row order) whose name attribute equals `sample_name`.
pub(crate) fn find_sample_by_name(
    conn: &Connection,
    project_id: i64,
    sample_name: &str,
) -> Result<Option<CurrentRow>> {
    let found = conn
        .query_row(
            "SELECT guid, sample_json, row_number FROM samples
             WHERE project_id = ?1 AND sample_name = ?2
             ORDER BY row_number LIMIT 1",
            params![project_id, sample_name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, usize>(2)?,
                ))
            },
        )
        .optional()?;

    match found {
        Some((guid, sample_json, row_number)) => Ok(Some(CurrentRow {
            guid,
            attributes: serde_json::from_str(&sample_json)?,
            row_number,
        })),
        None => Ok(None),
    }
}

pub(crate) fn insert_sample(
    conn: &Connection,
    project_id: i64,
    guid: &str,
    attributes: &SampleAttributes,
    row_number: usize,
    name_key: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO samples (project_id, guid, sample_name, row_number, sample_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project_id,
            guid,
            sample_name_of(attributes, name_key),
            row_number,
            serde_json::to_string(attributes)?,
        ],
    )?;
    Ok(())
}

pub(crate) fn update_sample(
    conn: &Connection,
    project_id: i64,
    guid: &str,
    attributes: &SampleAttributes,
    name_key: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE samples SET sample_json = ?3, sample_name = ?4
         WHERE project_id = ?1 AND guid = ?2",
        params![
            project_id,
            guid,
            serde_json::to_string(attributes)?,
            sample_name_of(attributes, name_key),
        ],
    )?;
    Ok(())
}

/// Recompute the indexed sample name of every row, after the config
/// switched to a different name attribute.
pub(crate) fn reindex_sample_names(conn: &Connection, project_id: i64, name_key: &str) -> Result<()> {
    for row in load_samples(conn, project_id)? {
        update_sample(conn, project_id, &row.guid, &row.attributes, name_key)?;
    }
    Ok(())
}

/// Drop the view memberships of one sample; run before deleting its row.
fn detach_from_views(conn: &Connection, project_id: i64, guid: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM view_samples WHERE sample_id IN (
             SELECT id FROM samples WHERE project_id = ?1 AND guid = ?2
         )",
        params![project_id, guid],
    )?)
}

/// Remove one sample and close the gap it leaves in the row order.
pub(crate) fn delete_sample(conn: &Connection, project_id: i64, row: &CurrentRow) -> Result<()> {
    detach_from_views(conn, project_id, &row.guid)?;
    conn.execute(
        "DELETE FROM samples WHERE project_id = ?1 AND guid = ?2",
        params![project_id, row.guid],
    )?;
    conn.execute(
        "UPDATE samples SET row_number = row_number - 1
         WHERE project_id = ?1 AND row_number > ?2",
        params![project_id, row.row_number],
    )?;
    Ok(())
}

pub(crate) fn delete_all_samples(conn: &Connection, project_id: i64) -> Result<usize> {
    conn.execute(
        "DELETE FROM view_samples WHERE sample_id IN (
             SELECT id FROM samples WHERE project_id = ?1
         )",
        params![project_id],
    )?;
    Ok(conn.execute("DELETE FROM samples WHERE project_id = ?1", params![project_id])?)
}

pub(crate) fn count_samples(conn: &Connection, project_id: i64) -> Result<usize> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM samples WHERE project_id = ?1",
        params![project_id],
        |row| row.get(0),
    )?)
}

/// Digest and count of the stored sample table.
pub(crate) fn sample_table_summary(conn: &Connection, project_id: i64) -> Result<(String, usize)> {
    let table = load_sample_table(conn, project_id, false)?;
    Ok((compute_digest(&table), table.len()))
}

/// Apply a validated diff: deletions, then updates, then insertions, then
/// row-number rewrites.
pub(crate) fn apply_sample_diff(
    conn: &Connection,
    project_id: i64,
    diff: &SampleDiff,
    name_key: &str,
) -> Result<()> {
    {
        let mut delete = conn.prepare("DELETE FROM samples WHERE project_id = ?1 AND guid = ?2")?;
        for guid in &diff.deletions {
            detach_from_views(conn, project_id, guid)?;
            delete.execute(params![project_id, guid])?;
        }
    }

    for update in &diff.updates {
        update_sample(conn, project_id, &update.guid, &update.attributes, name_key)?;
    }

    for insert in &diff.insertions {
        insert_sample(
            conn,
            project_id,
            &insert.guid,
            &insert.attributes,
            insert.row_number,
            name_key,
        )?;
    }

    debug_assert!(is_contiguous(
        &diff.rows.iter().map(|row| row.row_number).collect::<Vec<_>>()
    ));
    let moves = diff.moves();
    {
        let mut renumber = conn.prepare(
            "UPDATE samples SET row_number = ?3 WHERE project_id = ?1 AND guid = ?2",
        )?;
        for row_move in &moves {
            renumber.execute(params![project_id, row_move.guid, row_move.to])?;
        }
    }

    debug!(
        "Applied sample diff to project {}: -{} ~{} +{} moved {}",
        project_id,
        diff.deletions.len(),
        diff.updates.len(),
        diff.insertions.len(),
        moves.len()
    );
    Ok(())
}

/// Subsample tables of a project, grouped by table and ordered by row.
pub(crate) fn load_subsamples(
    conn: &Connection,
    project_id: i64,
) -> Result<Vec<Vec<SampleAttributes>>> {
    let mut stmt = conn.prepare(
        "SELECT subsample_number, subsample_json FROM subsamples
         WHERE project_id = ?1 ORDER BY subsample_number, row_number",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((row.get::<_, usize>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut tables: Vec<Vec<SampleAttributes>> = Vec::new();
    let mut current_number: Option<usize> = None;
    for row in rows {
        let (number, json) = row?;
        if current_number != Some(number) {
            tables.push(Vec::new());
            current_number = Some(number);
        }
        if let Some(table) = tables.last_mut() {
            table.push(serde_json::from_str(&json)?);
        }
    }
    Ok(tables)
}

/// Drop all subsample rows of a project and insert `tables` in their place.
pub(crate) fn replace_subsamples(
    conn: &Connection,
    project_id: i64,
    tables: &[Vec<SampleAttributes>],
) -> Result<()> {
    conn.execute(
        "DELETE FROM subsamples WHERE project_id = ?1",
        params![project_id],
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO subsamples (project_id, subsample_number, row_number, subsample_json)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (subsample_number, table) in tables.iter().enumerate() {
        for (row_number, row) in table.iter().enumerate() {
            insert.execute(params![
                project_id,
                subsample_number,
                row_number,
                serde_json::to_string(row)?,
            ])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::{IdentityMode, SampleDiffer};
    use crate::registry_path::RegistryPath;
    use crate::store::projects::{insert_project, NewProject};
    use crate::store::PepStore;
    use serde_json::{json, Map};

    fn attrs(value: Value) -> SampleAttributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn project(conn: &Connection) -> i64 {
        let key = RegistryPath::new("ns", "pep", "default");
        let config = Map::new();
        insert_project(
            conn,
            &NewProject {
                key: &key,
                digest: "",
                config: &config,
                description: "",
                private: false,
                number_of_samples: 0,
                submission_date: "",
                last_update_date: "",
                schema_id: None,
                pop: false,
                forked_from_id: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_apply_diff_keeps_rows_contiguous() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let id = project(tx);
                for (i, (guid, name)) in [("1", "A"), ("2", "B"), ("3", "C")].iter().enumerate() {
                    insert_sample(tx, id, guid, &attrs(json!({"sample_name": name})), i, "sample_name")?;
                }

                let current = load_samples(tx, id)?;
                let desired = vec![
                    attrs(json!({"sample_name": "C", "ph_id": "3"})),
                    attrs(json!({"sample_name": "new", "ph_id": null})),
                    attrs(json!({"sample_name": "A2", "ph_id": "1"})),
                ];
                let diff = SampleDiffer::new(IdentityMode::Required).diff(&current, &desired)?;
                apply_sample_diff(tx, id, &diff, "sample_name")?;

                let stored = load_samples(tx, id)?;
                let names: Vec<_> = stored
                    .iter()
                    .map(|row| row.attributes["sample_name"].as_str().unwrap().to_string())
                    .collect();
                assert_eq!(names, vec!["C", "new", "A2"]);
                let numbers: Vec<usize> = stored.iter().map(|row| row.row_number).collect();
                assert!(is_contiguous(&numbers));
                assert_eq!(stored[2].guid, "1");

                let (digest, count) = sample_table_summary(tx, id)?;
                assert_eq!(count, 3);
                assert_eq!(digest, diff.digest());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_delete_sample_shifts_following_rows() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let id = project(tx);
                for (i, name) in ["A", "B", "C"].iter().enumerate() {
                    insert_sample(tx, id, &i.to_string(), &attrs(json!({"sample_name": name})), i, "sample_name")?;
                }
                let b = find_sample_by_name(tx, id, "B")?.unwrap();
                delete_sample(tx, id, &b)?;

                let stored = load_samples(tx, id)?;
                assert_eq!(stored.len(), 2);
                assert_eq!(stored[1].guid, "2");
                assert_eq!(stored[1].row_number, 1);
                assert_eq!(count_samples(tx, id)?, 2);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_subsamples_replace_and_group() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let id = project(tx);
                let tables = vec![
                    vec![attrs(json!({"s": 1})), attrs(json!({"s": 2}))],
                    vec![attrs(json!({"t": 1}))],
                ];
                replace_subsamples(tx, id, &tables)?;
                assert_eq!(load_subsamples(tx, id)?, tables);

                replace_subsamples(tx, id, &[])?;
                assert!(load_subsamples(tx, id)?.is_empty());
                Ok(())
            })
            .unwrap();
    }
}
