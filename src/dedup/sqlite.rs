//! SQLite-backed authoritative dedup store

use crate::dedup::store::DedupStore;
use crate::dedup::{DedupError, DedupResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const DEDUP_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS dedup_keys (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Durable dedup store kept in a SQLite database file
pub struct SqliteDedupStore {
    conn: Connection,
}

impl SqliteDedupStore {
    /// Opens (or creates) the store at `path`
    ///
    /// Fails if the database cannot be opened or the schema cannot be created.
    pub fn open(path: &Path) -> DedupResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            DedupError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        conn.execute_batch(DEDUP_SCHEMA_SQL)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory store
    pub fn open_in_memory() -> DedupResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(DEDUP_SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

impl DedupStore for SqliteDedupStore {
    fn ping(&self) -> DedupResult<()> {
        self.conn
            .query_row("SELECT COUNT(*) FROM dedup_keys", [], |row| row.get::<_, i64>(0))
            .map_err(|e| DedupError::Unavailable(e.to_string()))?;
        Ok(())
    }

    fn exists(&self, key: &str) -> DedupResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM dedup_keys WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn set(&mut self, key: &str, value: &str) -> DedupResult<()> {
        self.conn.execute(
            "INSERT INTO dedup_keys (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn batch_exists(&self, keys: &[String]) -> DedupResult<Vec<bool>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT 1 FROM dedup_keys WHERE key = ?1")?;

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            let found: Option<i64> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
            results.push(found.is_some());
        }
        Ok(results)
    }

    fn scan_prefix(&self, prefix: &str) -> DedupResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM dedup_keys WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;

        let keys = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn set_batch(&mut self, keys: &[String]) -> DedupResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO dedup_keys (key, value) VALUES (?1, '1')
                 ON CONFLICT(key) DO NOTHING",
            )?;
            for key in keys {
                stmt.execute(params![key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
