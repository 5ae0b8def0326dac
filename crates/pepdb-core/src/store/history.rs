//! History rows.
//!
//! Each entry holds the full project state before a change as one JSON
//! document, sample GUIDs included, so any entry can be restored on its own.

use crate::error::{PepDbError, Result};
use crate::models::{HistoryChange, Project};
use crate::store::projects::ProjectRow;
use crate::store::{now_timestamp, samples};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

/// Snapshot the current stored state of `project`.
pub(crate) fn capture_snapshot(conn: &Connection, project: &ProjectRow) -> Result<Project> {
    Ok(Project::new(
        project.config.clone(),
        samples::load_sample_table(conn, project.id, true)?,
        samples::load_subsamples(conn, project.id)?,
    ))
}

/// Append a history entry holding `snapshot` and advance the project's
/// change counter. Returns the new change id.
///
/// The caller must persist `project` afterwards so the counter survives.
pub(crate) fn record_change(
    conn: &Connection,
    project: &mut ProjectRow,
    snapshot: &Project,
    digest: &str,
    user: &str,
) -> Result<i64> {
    let change_id = project.next_change_id;
    conn.execute(
        "INSERT INTO history (project_id, change_id, user_name, digest, update_time, snapshot_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            project.id,
            change_id,
            user,
            digest,
            now_timestamp(),
            serde_json::to_string(snapshot)?,
        ],
    )?;
    project.next_change_id = change_id + 1;
    Ok(change_id)
}

/// Keep only the newest `max_entries` entries of a project.
pub(crate) fn prune(conn: &Connection, project_id: i64, max_entries: usize) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM history WHERE project_id = ?1 AND change_id NOT IN (
             SELECT change_id FROM history WHERE project_id = ?1
             ORDER BY change_id DESC LIMIT ?2
         )",
        params![project_id, max_entries],
    )?;
    if removed > 0 {
        debug!(
            "Evicted {} history entries of project {} beyond the cap of {}",
            removed, project_id, max_entries
        );
    }
    Ok(removed)
}

/// Entries of a project, newest first.
pub(crate) fn list_changes(conn: &Connection, project_id: i64) -> Result<Vec<HistoryChange>> {
    let mut stmt = conn.prepare(
        "SELECT change_id, update_time, user_name, digest FROM history
         WHERE project_id = ?1 ORDER BY change_id DESC",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok(HistoryChange {
            change_id: row.get(0)?,
            change_date: row.get(1)?,
            user: row.get(2)?,
            digest: row.get(3)?,
        })
    })?;

    let mut changes = Vec::new();
    for row in rows {
        changes.push(row?);
    }
    Ok(changes)
}

pub(crate) fn load_snapshot(
    conn: &Connection,
    project: &ProjectRow,
    change_id: i64,
) -> Result<Project> {
    let json: Option<String> = conn
        .query_row(
            "SELECT snapshot_json FROM history WHERE project_id = ?1 AND change_id = ?2",
            params![project.id, change_id],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Err(PepDbError::HistoryNotFound {
            registry_path: project.registry_path().to_string(),
            change_id,
        }),
    }
}

pub(crate) fn delete_change(conn: &Connection, project: &ProjectRow, change_id: i64) -> Result<()> {
    let removed = conn.execute(
        "DELETE FROM history WHERE project_id = ?1 AND change_id = ?2",
        params![project.id, change_id],
    )?;
    if removed == 0 {
        return Err(PepDbError::HistoryNotFound {
            registry_path: project.registry_path().to_string(),
            change_id,
        });
    }
    Ok(())
}

pub(crate) fn delete_all_changes(conn: &Connection, project_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM history WHERE project_id = ?1",
        params![project_id],
    )?)
}

/// Delete entries of every project recorded before `cutoff`.
pub(crate) fn delete_older_than(conn: &Connection, cutoff: &str) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM history WHERE update_time < ?1",
        params![cutoff],
    )?)
}
