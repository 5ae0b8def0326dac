//! SQLite storage backend.
//!
//! One [`PepStore`] owns one connection. Every public agent operation runs
//! inside a single transaction obtained through [`PepStore::read`] or
//! [`PepStore::write`]; the transaction is rolled back when the closure
//! returns an error (or panics) and committed otherwise.
//!
//! Ownership cascades are not delegated to `ON DELETE CASCADE`: foreign keys
//! are declared and enforced, and [`projects::delete_project_cascade`]
//! removes owned rows explicitly inside the caller's transaction.

pub(crate) mod groups;
pub(crate) mod history;
pub(crate) mod projects;
pub(crate) mod samples;
pub(crate) mod schemas;
pub(crate) mod views;

use crate::config::StoreConfig;
use crate::error::{PepDbError, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Handle to the relational store.
///
/// Cloning is cheap; clones share the connection, so operations issued
/// through any clone are serialized.
#[derive(Debug, Clone)]
pub struct PepStore {
    db_path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl PepStore {
    /// Create or open a store at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PepDbError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened PEP store at {}", db_path.display());
        Ok(Self {
            db_path: Some(db_path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            db_path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys=ON;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA temp_store=MEMORY;",
            StoreConfig::BUSY_TIMEOUT.as_millis(),
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schemas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                schema_json TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                last_update_date TEXT NOT NULL,
                UNIQUE (namespace, name, version)
            );

            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                tag TEXT NOT NULL,
                digest TEXT NOT NULL,
                config_json TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                private INTEGER NOT NULL DEFAULT 0,
                number_of_samples INTEGER NOT NULL DEFAULT 0,
                submission_date TEXT NOT NULL,
                last_update_date TEXT NOT NULL,
                schema_id INTEGER REFERENCES schemas(id),
                pop INTEGER NOT NULL DEFAULT 0,
                forked_from_id INTEGER REFERENCES projects(id),
                next_change_id INTEGER NOT NULL DEFAULT 1,
                UNIQUE (namespace, name, tag)
            );

            CREATE INDEX IF NOT EXISTS idx_projects_namespace ON projects(namespace);
            CREATE INDEX IF NOT EXISTS idx_projects_updated ON projects(last_update_date);

            -- Sample order lives in row_number; it is rewritten, not inferred
            -- from insertion order.
            CREATE TABLE IF NOT EXISTS samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id),
                guid TEXT NOT NULL,
                sample_name TEXT,
                row_number INTEGER NOT NULL,
                sample_json TEXT NOT NULL,
                UNIQUE (project_id, guid)
            );

            CREATE INDEX IF NOT EXISTS idx_samples_order ON samples(project_id, row_number);
            CREATE INDEX IF NOT EXISTS idx_samples_name ON samples(project_id, sample_name);

            CREATE TABLE IF NOT EXISTS subsamples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id),
                subsample_number INTEGER NOT NULL,
                row_number INTEGER NOT NULL,
                subsample_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subsamples_project
                ON subsamples(project_id, subsample_number, row_number);

            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id),
                change_id INTEGER NOT NULL,
                user_name TEXT NOT NULL,
                digest TEXT NOT NULL,
                update_time TEXT NOT NULL,
                snapshot_json TEXT NOT NULL,
                UNIQUE (project_id, change_id)
            );

            CREATE INDEX IF NOT EXISTS idx_history_time ON history(update_time);

            CREATE TABLE IF NOT EXISTS schema_tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schema_id INTEGER NOT NULL REFERENCES schemas(id),
                tag_name TEXT NOT NULL,
                tag_value TEXT,
                UNIQUE (schema_id, tag_name)
            );

            -- A view is a named subset of one project's samples.
            CREATE TABLE IF NOT EXISTS views (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL REFERENCES projects(id),
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                UNIQUE (project_id, name)
            );

            CREATE TABLE IF NOT EXISTS view_samples (
                view_id INTEGER NOT NULL REFERENCES views(id),
                sample_id INTEGER NOT NULL REFERENCES samples(id),
                PRIMARY KEY (view_id, sample_id)
            );

            CREATE INDEX IF NOT EXISTS idx_view_samples_sample ON view_samples(sample_id);

            CREATE TABLE IF NOT EXISTS project_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                private INTEGER NOT NULL DEFAULT 0,
                last_update_date TEXT NOT NULL,
                UNIQUE (namespace, name)
            );

            CREATE TABLE IF NOT EXISTS group_projects (
                group_id INTEGER NOT NULL REFERENCES project_groups(id),
                project_id INTEGER NOT NULL REFERENCES projects(id),
                PRIMARY KEY (group_id, project_id)
            );

            CREATE INDEX IF NOT EXISTS idx_group_projects_project ON group_projects(project_id);
            "#,
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PepDbError::lock_poisoned())
    }

    /// Run `f` in a deferred transaction.
    pub fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` in an immediate (write-locked) transaction and commit if it
    /// succeeds. On error nothing `f` wrote is kept.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Database file, or `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Checkpoint the WAL file.
    pub fn checkpoint_wal(&self) -> Result<()> {
        if self.db_path.is_none() {
            return Ok(());
        }
        let conn = self.lock_conn()?;
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        debug!("Checkpointed WAL");
        Ok(())
    }
}

/// Current time as a fixed-width RFC 3339 UTC string, so stored timestamps
/// compare correctly as text.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("pepdb.sqlite");
        let store = PepStore::open(&path).unwrap();
        assert_eq!(store.db_path(), Some(path.as_path()));

        let tables: Vec<String> = store
            .read(|tx| {
                let mut stmt = tx.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                let mut names = Vec::new();
                for row in rows {
                    names.push(row?);
                }
                Ok(names)
            })
            .unwrap();
        assert_eq!(
            tables,
            vec![
                "group_projects",
                "history",
                "project_groups",
                "projects",
                "samples",
                "schema_tags",
                "schemas",
                "subsamples",
                "view_samples",
                "views",
            ]
        );
        store.checkpoint_wal().unwrap();
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = PepStore::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            tx.execute(
                "INSERT INTO schemas (namespace, name, version, schema_json, last_update_date)
                 VALUES ('ns', 's', '1', '{}', 'now')",
                [],
            )?;
            Err(PepDbError::Config {
                message: "abort".into(),
            })
        });
        assert!(result.is_err());

        let count: usize = store
            .read(|tx| Ok(tx.query_row("SELECT COUNT(*) FROM schemas", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let a = now_timestamp();
        let b = now_timestamp();
        assert!(a <= b);
        assert!(a.ends_with('Z'));
    }
}
