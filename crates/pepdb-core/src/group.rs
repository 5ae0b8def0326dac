//! Groups: named, namespace-owned collections of projects.
//!
//! A group only references its projects. Deleting a group leaves them in
//! place and deleting a project removes it from every group.

use crate::annotation::{like_pattern, page_bound, push_visibility};
use crate::error::{PepDbError, Result};
use crate::models::{GroupInfo, GroupList, GroupUpdate};
use crate::registry_path::{validate_identifier, RegistryPath};
use crate::store::groups::{self, GroupRow, GROUP_SELECT};
use crate::store::{now_timestamp, projects, PepStore};
use rusqlite::Connection;
use tracing::info;

#[derive(Clone, Copy)]
pub struct GroupService<'a> {
    store: &'a PepStore,
}

/// A group as seen by `admin`; private groups of other namespaces are
/// reported as missing.
fn require_visible(conn: &Connection, namespace: &str, name: &str, admin: &[String]) -> Result<GroupRow> {
    match groups::find_group(conn, namespace, name)? {
        Some(group) if !group.private || admin.iter().any(|ns| ns == &group.namespace) => Ok(group),
        _ => Err(PepDbError::GroupNotFound {
            group: format!("{namespace}/{name}"),
        }),
    }
}

impl<'a> GroupService<'a> {
    pub(crate) fn new(store: &'a PepStore) -> Self {
        Self { store }
    }

    pub fn create(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
        is_private: bool,
    ) -> Result<GroupInfo> {
        validate_identifier("namespace", namespace)?;
        validate_identifier("name", name)?;
        let namespace = namespace.to_lowercase();
        let name = name.to_lowercase();

        let info = self.store.write(|tx| {
            groups::insert_group(tx, &namespace, &name, description, is_private, &now_timestamp())?;
            Ok(groups::require_group(tx, &namespace, &name)?.into_info())
        })?;
        info!("Created group {}/{}", namespace, name);
        Ok(info)
    }

    pub fn get(&self, namespace: &str, name: &str, admin: &[String]) -> Result<GroupInfo> {
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        self.store
            .read(|tx| Ok(require_visible(tx, &namespace, &name, admin)?.into_info()))
    }

    pub fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        self.store
            .read(|tx| Ok(groups::find_group(tx, &namespace, &name)?.is_some()))
    }

    /// Groups visible to `admin`, optionally limited to one namespace and
    /// to names or descriptions containing `query`. Newest changes first.
    pub fn list(
        &self,
        namespace: Option<&str>,
        query: Option<&str>,
        admin: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<GroupList> {
        let page_limit = page_bound("limit", limit)?;
        let page_offset = page_bound("offset", offset)?;
        let mut where_clause = String::from("WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(namespace) = namespace {
            where_clause.push_str(" AND g.namespace = ?");
            params_vec.push(Box::new(namespace.to_lowercase()));
        }
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            where_clause
                .push_str(" AND (g.name LIKE ? ESCAPE '\\' OR g.description LIKE ? ESCAPE '\\')");
            let pattern = like_pattern(query.trim());
            params_vec.push(Box::new(pattern.clone()));
            params_vec.push(Box::new(pattern));
        }
        push_visibility(&mut where_clause, &mut params_vec, "g", admin);

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let mut page_refs = params_refs.clone();
        page_refs.push(&page_limit);
        page_refs.push(&page_offset);

        let (count, results) = self.store.read(|tx| {
            let count: usize = tx.query_row(
                &format!("SELECT COUNT(*) FROM project_groups g {}", where_clause),
                params_refs.as_slice(),
                |row| row.get(0),
            )?;

            let sql = format!(
                "{GROUP_SELECT} {where_clause}
                 ORDER BY g.last_update_date DESC, g.namespace, g.name LIMIT ? OFFSET ?"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(page_refs.as_slice(), GroupRow::from_row)?;
            let mut results = Vec::new();
            for row in rows {
                results.push(row?.into_info());
            }
            Ok((count, results))
        })?;

        Ok(GroupList {
            count,
            limit,
            offset,
            results,
        })
    }

    /// Member projects visible to `admin`, ordered by registry path.
    pub fn projects(&self, namespace: &str, name: &str, admin: &[String]) -> Result<Vec<RegistryPath>> {
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        self.store.read(|tx| {
            let group = require_visible(tx, &namespace, &name, admin)?;

            let mut where_clause = String::from("WHERE gp.group_id = ?");
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(group.id)];
            push_visibility(&mut where_clause, &mut params_vec, "p", admin);
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();

            let sql = format!(
                "SELECT p.namespace, p.name, p.tag FROM group_projects gp
                 JOIN projects p ON p.id = gp.project_id {}
                 ORDER BY p.namespace, p.name, p.tag",
                where_clause
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_refs.as_slice(), |row| {
                Ok(RegistryPath {
                    namespace: row.get(0)?,
                    name: row.get(1)?,
                    tag: row.get(2)?,
                })
            })?;
            let mut members = Vec::new();
            for row in rows {
                members.push(row?);
            }
            Ok(members)
        })
    }

    pub fn add_project(&self, namespace: &str, name: &str, key: &RegistryPath) -> Result<()> {
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        self.store.write(|tx| {
            let mut group = groups::require_group(tx, &namespace, &name)?;
            let project = projects::require_project(tx, key)?;
            if !groups::add_member(tx, group.id, project.id)? {
                return Err(PepDbError::ProjectAlreadyInGroup {
                    group: group.path(),
                    registry_path: key.to_string(),
                });
            }
            group.last_update_date = now_timestamp();
            groups::save_group(tx, &group)
        })?;
        info!("Added {} to group {}/{}", key, namespace, name);
        Ok(())
    }

    pub fn remove_project(&self, namespace: &str, name: &str, key: &RegistryPath) -> Result<()> {
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        self.store.write(|tx| {
            let mut group = groups::require_group(tx, &namespace, &name)?;
            let project = projects::require_project(tx, key)?;
            if !groups::remove_member(tx, group.id, project.id)? {
                return Err(PepDbError::ProjectNotInGroup {
                    group: group.path(),
                    registry_path: key.to_string(),
                });
            }
            group.last_update_date = now_timestamp();
            groups::save_group(tx, &group)
        })?;
        info!("Removed {} from group {}/{}", key, namespace, name);
        Ok(())
    }

    /// Rename a group or change its description or visibility.
    pub fn update(&self, namespace: &str, name: &str, update: GroupUpdate) -> Result<GroupInfo> {
        update.validate()?;
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        if update.is_empty() {
            return self.store.read(|tx| Ok(groups::require_group(tx, &namespace, &name)?.into_info()));
        }

        let info = self.store.write(|tx| {
            let mut group = groups::require_group(tx, &namespace, &name)?;
            if let Some(new_name) = &update.name {
                group.name = new_name.to_lowercase();
            }
            if let Some(description) = &update.description {
                group.description = description.clone();
            }
            if let Some(private) = update.is_private {
                group.private = private;
            }
            group.last_update_date = now_timestamp();
            groups::save_group(tx, &group)?;
            Ok(group.into_info())
        })?;
        info!("Updated group {}/{}", info.namespace, info.name);
        Ok(info)
    }

    /// Delete a group. Its projects are not touched.
    pub fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let (namespace, name) = (namespace.to_lowercase(), name.to_lowercase());
        let members = self.store.write(|tx| {
            let group = groups::require_group(tx, &namespace, &name)?;
            groups::delete_group(tx, group.id)
        })?;
        info!("Deleted group {}/{} ({} memberships)", namespace, name, members);
        Ok(())
    }
}
