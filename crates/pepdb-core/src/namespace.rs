//! Namespace listing with project and sample counts.

use crate::annotation::{like_pattern, page_bound, push_visibility};
use crate::error::{PepDbError, Result};
use crate::models::{NamespaceInfo, NamespaceList};
use crate::store::PepStore;

#[derive(Clone, Copy)]
pub struct NamespaceService<'a> {
    store: &'a PepStore,
}

impl<'a> NamespaceService<'a> {
    pub(crate) fn new(store: &'a PepStore) -> Self {
        Self { store }
    }

    /// Namespaces with at least one visible project, busiest first.
    pub fn list(
        &self,
        query: Option<&str>,
        admin: &[String],
        limit: usize,
        offset: usize,
    ) -> Result<NamespaceList> {
        let mut where_clause = String::from("WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
            where_clause.push_str(" AND p.namespace LIKE ? ESCAPE '\\'");
            params_vec.push(Box::new(like_pattern(query.trim())));
        }
        push_visibility(&mut where_clause, &mut params_vec, "p", admin);

        let (count, results) = self.fetch(&where_clause, &params_vec, Some(limit), offset)?;
        Ok(NamespaceList {
            count,
            limit,
            offset,
            results,
        })
    }

    /// Counts for one namespace; `NamespaceNotFound` if it has no visible
    /// project.
    pub fn info(&self, namespace: &str, admin: &[String]) -> Result<NamespaceInfo> {
        let namespace = namespace.to_lowercase();
        let mut where_clause = String::from("WHERE p.namespace = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(namespace.clone())];
        push_visibility(&mut where_clause, &mut params_vec, "p", admin);

        let (_, results) = self.fetch(&where_clause, &params_vec, None, 0)?;
        results
            .into_iter()
            .next()
            .ok_or(PepDbError::NamespaceNotFound { namespace })
    }

    fn fetch(
        &self,
        where_clause: &str,
        params_vec: &[Box<dyn rusqlite::ToSql>],
        limit: Option<usize>,
        offset: usize,
    ) -> Result<(usize, Vec<NamespaceInfo>)> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = match limit {
            Some(limit) => page_bound("limit", limit)?,
            None => -1,
        };
        let offset = page_bound("offset", offset)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let mut page_refs = params_refs.clone();
        page_refs.push(&limit);
        page_refs.push(&offset);

        self.store.read(|tx| {
            let count: usize = tx.query_row(
                &format!(
                    "SELECT COUNT(DISTINCT p.namespace) FROM projects p {}",
                    where_clause
                ),
                params_refs.as_slice(),
                |row| row.get(0),
            )?;

            let sql = format!(
                "SELECT p.namespace, COUNT(*), COALESCE(SUM(p.number_of_samples), 0)
                 FROM projects p {} GROUP BY p.namespace
                 ORDER BY COUNT(*) DESC, p.namespace ASC LIMIT ? OFFSET ?",
                where_clause
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(page_refs.as_slice(), |row| {
                Ok(NamespaceInfo {
                    namespace: row.get(0)?,
                    number_of_projects: row.get(1)?,
                    number_of_samples: row.get(2)?,
                })
            })?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            Ok((count, results))
        })
    }
}
