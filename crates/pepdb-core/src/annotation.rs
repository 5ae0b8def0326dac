//! Project metadata listings.
//!
//! Private projects are listed only when their namespace is in the caller's
//! admin list.

use crate::config::QueryConfig;
use crate::error::{PepDbError, Result};
use crate::models::{Annotation, AnnotationList};
use crate::registry_path::RegistryPath;
use crate::store::PepStore;
use rusqlite::{Connection, Row};
use tracing::warn;

const ANNOTATION_SELECT: &str = "SELECT p.namespace, p.name, p.tag, p.private, \
     p.number_of_samples, p.description, p.last_update_date, p.submission_date, p.digest, \
     s.namespace, s.name, s.version, p.pop, f.namespace, f.name, f.tag \
     FROM projects p \
     LEFT JOIN schemas s ON s.id = p.schema_id \
     LEFT JOIN projects f ON f.id = p.forked_from_id";

/// Sort key for annotation listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnnotationOrder {
    #[default]
    UpdateDate,
    SubmissionDate,
    Name,
}

impl AnnotationOrder {
    fn column(self) -> &'static str {
        match self {
            AnnotationOrder::UpdateDate => "p.last_update_date",
            AnnotationOrder::SubmissionDate => "p.submission_date",
            AnnotationOrder::Name => "p.name",
        }
    }
}

/// Filter and paging for [`AnnotationService::get`].
#[derive(Debug, Clone)]
pub struct AnnotationFilter {
    pub namespace: Option<String>,
    /// Case-insensitive substring matched against name, tag and description.
    pub query: Option<String>,
    /// Namespaces whose private projects the caller may see.
    pub admin: Vec<String>,
    /// Only POPs (`Some(true)`) or only regular projects (`Some(false)`).
    pub pop: Option<bool>,
    pub order_by: AnnotationOrder,
    pub descending: bool,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AnnotationFilter {
    fn default() -> Self {
        Self {
            namespace: None,
            query: None,
            admin: Vec::new(),
            pop: None,
            order_by: AnnotationOrder::default(),
            descending: true,
            limit: QueryConfig::DEFAULT_LIMIT,
            offset: QueryConfig::DEFAULT_OFFSET,
        }
    }
}

/// `%query%` with LIKE wildcards in `query` escaped by `\`.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// A paging value as a SQL integer.
pub(crate) fn page_bound(field: &str, value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| PepDbError::Validation {
        field: field.to_string(),
        message: format!("must not exceed {}", i64::MAX),
    })
}

/// Append the visibility condition for `admin` to `where_clause`. `alias`
/// names a table with `private` and `namespace` columns.
pub(crate) fn push_visibility(
    where_clause: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
    alias: &str,
    admin: &[String],
) {
    if admin.is_empty() {
        where_clause.push_str(&format!(" AND {alias}.private = 0"));
    } else {
        let placeholders: Vec<_> = admin.iter().map(|_| "?").collect();
        where_clause.push_str(&format!(
            " AND ({alias}.private = 0 OR {alias}.namespace IN ({}))",
            placeholders.join(",")
        ));
        for namespace in admin {
            params.push(Box::new(namespace.clone()));
        }
    }
}

fn join_path(namespace: Option<String>, name: Option<String>, last: Option<String>) -> Option<String> {
    Some(format!("{}/{}:{}", namespace?, name?, last?))
}

fn row_to_annotation(row: &Row<'_>) -> rusqlite::Result<Annotation> {
    Ok(Annotation {
        namespace: row.get(0)?,
        name: row.get(1)?,
        tag: row.get(2)?,
        is_private: row.get(3)?,
        number_of_samples: row.get(4)?,
        description: row.get(5)?,
        last_update_date: row.get(6)?,
        submission_date: row.get(7)?,
        digest: row.get(8)?,
        pep_schema: join_path(row.get(9)?, row.get(10)?, row.get(11)?),
        pop: row.get(12)?,
        forked_from: join_path(row.get(13)?, row.get(14)?, row.get(15)?),
    })
}

/// Annotation queries over one store.
#[derive(Clone, Copy)]
pub struct AnnotationService<'a> {
    store: &'a PepStore,
}

impl<'a> AnnotationService<'a> {
    pub(crate) fn new(store: &'a PepStore) -> Self {
        Self { store }
    }

    /// Page of annotations matching `filter`. `count` is the number of
    /// matches before paging.
    pub fn get(&self, filter: &AnnotationFilter) -> Result<AnnotationList> {
        let (results, count) = self.store.read(|tx| Self::search(tx, filter))?;
        Ok(AnnotationList {
            count,
            limit: filter.limit,
            offset: filter.offset,
            results,
        })
    }

    fn search(conn: &Connection, filter: &AnnotationFilter) -> Result<(Vec<Annotation>, usize)> {
        let limit = page_bound("limit", filter.limit)?;
        let offset = page_bound("offset", filter.offset)?;
        let mut where_clause = String::from("WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(namespace) = &filter.namespace {
            where_clause.push_str(" AND p.namespace = ?");
            params_vec.push(Box::new(namespace.to_lowercase()));
        }
        if let Some(query) = filter.query.as_deref().filter(|q| !q.trim().is_empty()) {
            where_clause.push_str(
                " AND (p.name LIKE ? ESCAPE '\\' OR p.tag LIKE ? ESCAPE '\\' \
                 OR p.description LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(query.trim());
            for _ in 0..3 {
                params_vec.push(Box::new(pattern.clone()));
            }
        }
        if let Some(pop) = filter.pop {
            where_clause.push_str(" AND p.pop = ?");
            params_vec.push(Box::new(pop));
        }
        push_visibility(&mut where_clause, &mut params_vec, "p", &filter.admin);

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM projects p {}", where_clause);
        let total_count: usize =
            conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0))?;

        let sql = format!(
            "{} {} ORDER BY {} {}, p.id {} LIMIT ? OFFSET ?",
            ANNOTATION_SELECT,
            where_clause,
            filter.order_by.column(),
            if filter.descending { "DESC" } else { "ASC" },
            if filter.descending { "DESC" } else { "ASC" },
        );
        let mut page_refs = params_refs.clone();
        page_refs.push(&limit);
        page_refs.push(&offset);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(page_refs.as_slice(), row_to_annotation)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok((results, total_count))
    }

    fn find_visible(conn: &Connection, key: &RegistryPath, admin: &[String]) -> Result<Option<Annotation>> {
        let mut where_clause =
            String::from("WHERE p.namespace = ? AND p.name = ? AND p.tag = ?");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(key.namespace.clone()),
            Box::new(key.name.clone()),
            Box::new(key.tag.clone()),
        ];
        push_visibility(&mut where_clause, &mut params_vec, "p", admin);

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let sql = format!("{} {}", ANNOTATION_SELECT, where_clause);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params_refs.as_slice(), row_to_annotation)?;
        Ok(rows.next().transpose()?)
    }

    /// Annotation of one project. Hidden private projects are reported as
    /// missing.
    pub fn get_one(&self, key: &RegistryPath, admin: &[String]) -> Result<Annotation> {
        self.store
            .read(|tx| Self::find_visible(tx, key, admin))?
            .ok_or_else(|| PepDbError::ProjectNotFound {
                registry_path: key.to_string(),
            })
    }

    /// Annotations for a list of registry paths, in the order given.
    /// Malformed, missing and hidden paths are skipped.
    pub fn get_by_registry_paths(&self, paths: &[&str], admin: &[String]) -> Result<AnnotationList> {
        let keys: Vec<RegistryPath> = paths
            .iter()
            .filter_map(|path| match RegistryPath::parse(path) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("Skipping registry path: {}", e);
                    None
                }
            })
            .collect();

        let results = self.store.read(|tx| {
            let mut results = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(annotation) = Self::find_visible(tx, key, admin)? {
                    results.push(annotation);
                }
            }
            Ok(results)
        })?;

        Ok(AnnotationList {
            count: results.len(),
            limit: results.len(),
            offset: 0,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateOptions, Project};
    use crate::project::ProjectService;
    use serde_json::{json, Map};

    fn create(store: &PepStore, namespace: &str, name: &str, description: &str, private: bool) {
        let mut config = Map::new();
        config.insert("name".into(), json!(name));
        ProjectService::new(store, 10)
            .create(
                Project::new(config, vec![], vec![]),
                namespace,
                CreateOptions {
                    description: Some(description.to_string()),
                    is_private: private,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    fn seeded() -> PepStore {
        let store = PepStore::open_in_memory().unwrap();
        create(&store, "databio", "rnaseq", "RNA-seq of liver", false);
        create(&store, "databio", "atac", "chromatin 100%", false);
        create(&store, "databio", "secret", "hidden RNA", true);
        create(&store, "other", "rna_two", "", false);
        store
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a%b_c"), "%a\\%b\\_c%");
    }

    #[test]
    fn test_search_is_case_insensitive_and_hides_private() {
        let store = seeded();
        let service = AnnotationService::new(&store);

        let found = service
            .get(&AnnotationFilter {
                query: Some("RNA".into()),
                ..Default::default()
            })
            .unwrap();
        let names: Vec<_> = found.results.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(found.count, 2);
        assert!(names.contains(&"rnaseq") && names.contains(&"rna_two"));

        let admin = service
            .get(&AnnotationFilter {
                query: Some("rna".into()),
                admin: vec!["databio".into()],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(admin.count, 3);

        let literal = service
            .get(&AnnotationFilter {
                query: Some("100%".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(literal.count, 1);
    }

    #[test]
    fn test_paging_and_namespace() {
        let store = seeded();
        let service = AnnotationService::new(&store);

        let page = service
            .get(&AnnotationFilter {
                namespace: Some("databio".into()),
                order_by: AnnotationOrder::Name,
                descending: false,
                limit: 1,
                offset: 1,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.count, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].name, "rnaseq");
    }

    #[test]
    fn test_oversized_paging_is_a_validation_error() {
        let store = seeded();
        let service = AnnotationService::new(&store);

        let err = service
            .get(&AnnotationFilter {
                limit: usize::MAX,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PepDbError::Validation { ref field, .. } if field == "limit"));

        let err = service
            .get(&AnnotationFilter {
                offset: usize::MAX,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, PepDbError::Validation { ref field, .. } if field == "offset"));

        let all = service
            .get(&AnnotationFilter {
                limit: i64::MAX as usize,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all.results.len(), 3);
    }

    #[test]
    fn test_get_one_and_by_paths() {
        let store = seeded();
        let service = AnnotationService::new(&store);

        let secret = RegistryPath::new("databio", "secret", "default");
        assert!(service.get_one(&secret, &[]).unwrap_err().is_not_found());
        let visible = service.get_one(&secret, &["databio".to_string()]).unwrap();
        assert!(visible.is_private);
        assert_eq!(visible.pep_schema, None);

        let list = service
            .get_by_registry_paths(
                &["databio/atac:default", "broken", "databio/secret:default"],
                &[],
            )
            .unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.results[0].name, "atac");
    }
}
