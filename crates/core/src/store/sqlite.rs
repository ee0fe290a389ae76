//! SQLite-backed processing store.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{processing_key, ProcessingStore, StoreError};
use crate::scraper::SearchResult;

/// SQLite-backed processing store. Result sets are stored as JSON.
pub struct SqliteProcessingStore {
    conn: Mutex<Connection>,
}

impl SqliteProcessingStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scraped_results (
                key TEXT PRIMARY KEY,
                results TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn load(conn: &Connection, key: &str) -> Result<Option<Vec<SearchResult>>, StoreError> {
        let json: Option<String> = conn
            .query_row(
                "SELECT results FROM scraped_results WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        json.map(|j| serde_json::from_str(&j).map_err(|e| StoreError::Serialization(e.to_string())))
            .transpose()
    }
}

impl ProcessingStore for SqliteProcessingStore {
    fn save_results(
        &self,
        key: &str,
        results: &[SearchResult],
        replace_existing: bool,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let merged = if replace_existing {
            results.to_vec()
        } else {
            let mut merged = Self::load(&conn, key)?.unwrap_or_default();
            let mut seen: HashSet<String> = merged.iter().map(|r| r.hash.clone()).collect();
            merged.extend(
                results
                    .iter()
                    .filter(|r| seen.insert(r.hash.clone()))
                    .cloned(),
            );
            merged
        };

        let json =
            serde_json::to_string(&merged).map_err(|e| StoreError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO scraped_results (key, results, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                results = excluded.results,
                updated_at = excluded.updated_at",
            params![key, &json, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(key = key, count = merged.len(), "Saved scrape results");
        Ok(())
    }

    fn get_results(&self, key: &str) -> Result<Option<Vec<SearchResult>>, StoreError> {
        let conn = self.lock()?;
        Self::load(&conn, key)
    }

    fn mark_done(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM scraped_results WHERE key = ?",
            params![processing_key(key)],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn is_processing(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM scraped_results WHERE key = ?",
                params![processing_key(key)],
                |_| Ok(true),
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(exists.unwrap_or(false))
    }
}
