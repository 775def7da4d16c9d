//! SQLite storage implementation
//!
//! This module provides a SQLite-based [`PageSink`] that also records crawl
//! runs.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{PageSink, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite page sink
pub struct SqlitePageSink {
    conn: Mutex<Connection>,
}

impl SqlitePageSink {
    /// Opens (or creates) the page database at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a new crawl run and returns its ID
    pub fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Marks a run finished with its final status and stored page count
    pub fn finish_run(&self, run_id: i64, status: RunStatus, pages_stored: u64) -> StorageResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, pages_stored = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, pages_stored as i64, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, pages_stored
                 FROM runs WHERE id = ?1",
                params![run_id],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                            .unwrap_or(RunStatus::Running),
                        pages_stored: row.get::<_, i64>(5)? as u64,
                    })
                },
            )
            .optional()?;

        run.ok_or(StorageError::RunNotFound(run_id))
    }

    /// Returns the stored content for `url`, if any
    pub fn get_page(&self, url: &str) -> StorageResult<Option<String>> {
        let conn = self.lock()?;
        let content = conn
            .query_row(
                "SELECT content FROM pages WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(content)
    }

    /// Gets total page count
    pub fn count_pages(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

impl PageSink for SqlitePageSink {
    fn store(&self, url: &str, content: &str) -> StorageResult<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT INTO pages (url, content, stored_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO NOTHING",
            params![url, content, now],
        )?;

        if inserted == 0 {
            tracing::debug!("Page already stored: {}", url);
        }
        Ok(())
    }
}
