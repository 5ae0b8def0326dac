//! Schema rows.

use crate::error::{PepDbError, Result};
use crate::models::SchemaRecord;
use crate::registry_path::SchemaRef;
use rusqlite::{params, Connection, OptionalExtension};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Order two version strings: semantic versions by precedence (a leading
/// `v` is ignored), anything else after them by plain text.
pub(crate) fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| semver::Version::parse(v.trim_start_matches('v')).ok();
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Resolve a schema reference to its row id. `latest` picks the highest
/// registered version.
pub(crate) fn resolve_schema_id(conn: &Connection, schema: &SchemaRef) -> Result<i64> {
    let not_found = || PepDbError::SchemaNotFound {
        schema: schema.to_string(),
    };

    if !schema.is_latest() {
        return conn
            .query_row(
                "SELECT id FROM schemas WHERE namespace = ?1 AND name = ?2 AND version = ?3",
                params![schema.namespace, schema.name, schema.version],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(not_found);
    }

    let mut stmt = conn.prepare("SELECT id, version FROM schemas WHERE namespace = ?1 AND name = ?2")?;
    let rows = stmt.query_map(params![schema.namespace, schema.name], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut latest: Option<(i64, String)> = None;
    for row in rows {
        let (id, version) = row?;
        let newer = match &latest {
            Some((_, best)) => compare_versions(&version, best) == Ordering::Greater,
            None => true,
        };
        if newer {
            latest = Some((id, version));
        }
    }
    latest.map(|(id, _)| id).ok_or_else(not_found)
}

pub(crate) fn insert_schema(conn: &Connection, record: &SchemaRecord) -> Result<i64> {
    let inserted = conn.execute(
        "INSERT INTO schemas (namespace, name, version, schema_json, description, last_update_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.namespace,
            record.name,
            record.version,
            serde_json::to_string(&record.schema)?,
            record.description,
            record.last_update_date,
        ],
    );

    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if PepDbError::is_unique_violation(&e) => Err(PepDbError::SchemaAlreadyExists {
            schema: format!("{}/{}:{}", record.namespace, record.name, record.version),
        }),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn load_schema(conn: &Connection, schema_id: i64) -> Result<Option<SchemaRecord>> {
    let found = conn
        .query_row(
            "SELECT namespace, name, version, schema_json, description, last_update_date
             FROM schemas WHERE id = ?1",
            params![schema_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    match found {
        Some((namespace, name, version, schema_json, description, last_update_date)) => {
            Ok(Some(SchemaRecord {
                namespace,
                name,
                version,
                schema: serde_json::from_str(&schema_json)?,
                description,
                last_update_date,
            }))
        }
        None => Ok(None),
    }
}

/// Overwrite the content columns of an existing schema row.
pub(crate) fn save_schema(conn: &Connection, schema_id: i64, record: &SchemaRecord) -> Result<()> {
    conn.execute(
        "UPDATE schemas SET schema_json = ?2, description = ?3, last_update_date = ?4
         WHERE id = ?1",
        params![
            schema_id,
            serde_json::to_string(&record.schema)?,
            record.description,
            record.last_update_date,
        ],
    )?;
    Ok(())
}

/// Tags of a schema version, by name.
pub(crate) fn list_tags(conn: &Connection, schema_id: i64) -> Result<BTreeMap<String, Option<String>>> {
    let mut stmt = conn.prepare("SELECT tag_name, tag_value FROM schema_tags WHERE schema_id = ?1")?;
    let rows = stmt.query_map(params![schema_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;
    let mut tags = BTreeMap::new();
    for row in rows {
        let (name, value) = row?;
        tags.insert(name, value);
    }
    Ok(tags)
}

/// Returns false if the schema already carries a tag with this name.
pub(crate) fn insert_tag(
    conn: &Connection,
    schema_id: i64,
    tag_name: &str,
    tag_value: Option<&str>,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO schema_tags (schema_id, tag_name, tag_value) VALUES (?1, ?2, ?3)",
        params![schema_id, tag_name, tag_value],
    )?;
    Ok(inserted == 1)
}

/// Returns false if the schema has no tag with this name.
pub(crate) fn delete_tag(conn: &Connection, schema_id: i64, tag_name: &str) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM schema_tags WHERE schema_id = ?1 AND tag_name = ?2",
        params![schema_id, tag_name],
    )?;
    Ok(removed == 1)
}

/// Versions registered under `namespace/name`, oldest first.
pub(crate) fn list_versions(conn: &Connection, namespace: &str, name: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schemas WHERE namespace = ?1 AND name = ?2")?;
    let rows = stmt.query_map(params![namespace, name], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    versions.sort_by(|a, b| compare_versions(a, b));
    Ok(versions)
}

/// Delete a schema row and its tags; projects that point at it lose their
/// pointer.
pub(crate) fn delete_schema(conn: &Connection, schema_id: i64) -> Result<usize> {
    let detached = conn.execute(
        "UPDATE projects SET schema_id = NULL WHERE schema_id = ?1",
        params![schema_id],
    )?;
    conn.execute("DELETE FROM schema_tags WHERE schema_id = ?1", params![schema_id])?;
    conn.execute("DELETE FROM schemas WHERE id = ?1", params![schema_id])?;
    Ok(detached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PepStore;
    use serde_json::json;

    fn record(version: &str) -> SchemaRecord {
        SchemaRecord {
            namespace: "databio".into(),
            name: "pep".into(),
            version: version.into(),
            schema: json!({"type": "object"}),
            description: String::new(),
            last_update_date: "2024-01-01T00:00:00.000000Z".into(),
        }
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("v2.0.0", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("dev", "1.0.0"), Ordering::Greater);
        assert_eq!(compare_versions("a", "b"), Ordering::Less);
    }

    #[test]
    fn test_resolve_latest_and_exact() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                insert_schema(tx, &record("1.9.0"))?;
                let newest = insert_schema(tx, &record("1.10.0"))?;

                let latest = SchemaRef::parse("databio/pep").unwrap();
                assert_eq!(resolve_schema_id(tx, &latest)?, newest);
                assert_eq!(load_schema(tx, newest)?.unwrap().version, "1.10.0");
                assert_eq!(list_versions(tx, "databio", "pep")?, vec!["1.9.0", "1.10.0"]);

                let missing = SchemaRef::parse("databio/pep:3.0.0").unwrap();
                assert!(resolve_schema_id(tx, &missing).unwrap_err().is_not_found());

                let err = insert_schema(tx, &record("1.9.0")).unwrap_err();
                assert!(matches!(err, PepDbError::SchemaAlreadyExists { .. }));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_tags_are_unique_per_version() {
        let store = PepStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                let old = insert_schema(tx, &record("1.0.0"))?;
                let new = insert_schema(tx, &record("2.0.0"))?;

                assert!(insert_tag(tx, old, "stable", None)?);
                assert!(!insert_tag(tx, old, "stable", Some("yes"))?);
                assert!(insert_tag(tx, new, "stable", Some("yes"))?);

                let tags = list_tags(tx, old)?;
                assert_eq!(tags.get("stable"), Some(&None));
                assert_eq!(list_tags(tx, new)?["stable"].as_deref(), Some("yes"));

                assert!(delete_tag(tx, old, "stable")?);
                assert!(!delete_tag(tx, old, "stable")?);

                delete_schema(tx, new)?;
                let orphaned: usize =
                    tx.query_row("SELECT COUNT(*) FROM schema_tags", [], |row| row.get(0))?;
                assert_eq!(orphaned, 0);
                Ok(())
            })
            .unwrap();
    }
}
