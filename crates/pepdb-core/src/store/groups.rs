//! Group rows and project memberships.

use crate::error::{PepDbError, Result};
use crate::models::GroupInfo;
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(crate) const GROUP_SELECT: &str = "SELECT g.id, g.namespace, g.name, g.description, \
     g.private, g.last_update_date, \
     (SELECT COUNT(*) FROM group_projects gp WHERE gp.group_id = g.id) \
     FROM project_groups g";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroupRow {
    pub id: i64,
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub private: bool,
    pub last_update_date: String,
    pub number_of_projects: usize,
}

impl GroupRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            namespace: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            private: row.get(4)?,
            last_update_date: row.get(5)?,
            number_of_projects: row.get(6)?,
        })
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn into_info(self) -> GroupInfo {
        GroupInfo {
            namespace: self.namespace,
            name: self.name,
            description: self.description,
            is_private: self.private,
            number_of_projects: self.number_of_projects,
            last_update_date: self.last_update_date,
        }
    }
}

pub(crate) fn find_group(conn: &Connection, namespace: &str, name: &str) -> Result<Option<GroupRow>> {
    let sql = format!("{GROUP_SELECT} WHERE g.namespace = ?1 AND g.name = ?2");
    Ok(conn
        .query_row(&sql, params![namespace, name], GroupRow::from_row)
        .optional()?)
}

pub(crate) fn require_group(conn: &Connection, namespace: &str, name: &str) -> Result<GroupRow> {
    find_group(conn, namespace, name)?.ok_or_else(|| PepDbError::GroupNotFound {
        group: format!("{namespace}/{name}"),
    })
}

/// Insert a group row. A key collision is reported as `GroupAlreadyExists`.
pub(crate) fn insert_group(
    conn: &Connection,
    namespace: &str,
    name: &str,
    description: &str,
    private: bool,
    last_update_date: &str,
) -> Result<i64> {
    let inserted = conn.execute(
        "INSERT INTO project_groups (namespace, name, description, private, last_update_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![namespace, name, description, private, last_update_date],
    );

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if PepDbError::is_unique_violation(&e) => Err(PepDbError::GroupAlreadyExists {
            group: format!("{namespace}/{name}"),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Write the mutable columns of `group` back to its row.
pub(crate) fn save_group(conn: &Connection, group: &GroupRow) -> Result<()> {
    let updated = conn.execute(
        "UPDATE project_groups SET name = ?2, description = ?3, private = ?4, last_update_date = ?5
         WHERE id = ?1",
        params![
            group.id,
            group.name,
            group.description,
            group.private,
            group.last_update_date,
        ],
    );

    match updated {
        Ok(_) => Ok(()),
        Err(e) if PepDbError::is_unique_violation(&e) => Err(PepDbError::GroupAlreadyExists {
            group: group.path(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Returns false if the project was already a member.
pub(crate) fn add_member(conn: &Connection, group_id: i64, project_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO group_projects (group_id, project_id) VALUES (?1, ?2)",
        params![group_id, project_id],
    )?;
    Ok(inserted == 1)
}

/// Returns false if the project was not a member.
pub(crate) fn remove_member(conn: &Connection, group_id: i64, project_id: i64) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM group_projects WHERE group_id = ?1 AND project_id = ?2",
        params![group_id, project_id],
    )?;
    Ok(removed == 1)
}

pub(crate) fn delete_group(conn: &Connection, group_id: i64) -> Result<usize> {
    let members = conn.execute(
        "DELETE FROM group_projects WHERE group_id = ?1",
        params![group_id],
    )?;
    conn.execute("DELETE FROM project_groups WHERE id = ?1", params![group_id])?;
    Ok(members)
}
