//! SQLite-based cache backend
//!
//! Persists cache entries in a single key/value table so cached conversations
//! survive restarts. An optional byte quota emulates the capacity limits of
//! browser storage; a full disk is reported the same way.

use crate::{
    storage::{
        settings::Settings,
        store::{KeyValueStore, StoreError},
    },
    Error, Result,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;

/// SQLite-backed key/value store
pub struct SqliteStore {
    conn: Connection,
    quota_bytes: Option<usize>,
}

impl SqliteStore {
    /// Create a new store with a database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        let mut store = Self { conn, quota_bytes: None };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store instance (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        let mut store = Self { conn, quota_bytes: None };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a database file with the quota configured in `settings`
    pub fn open_with_settings<P: AsRef<Path>>(path: P, settings: &Settings) -> Result<Self> {
        let store = Self::new(path)?;
        Ok(match settings.storage_quota_bytes {
            Some(quota) => store.with_quota(quota),
            None => store,
        })
    }

    /// Reject writes that would push total usage beyond `quota_bytes`
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    /// Initialize database schema
    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Bytes used by all entries except `key`
    fn used_bytes_excluding(&self, key: &str) -> std::result::Result<usize, StoreError> {
        let used: i64 = self
            .conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                 FROM kv_store WHERE key != ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(backend_error)?;
        Ok(used.max(0) as usize)
    }

    /// Number of stored entries
    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        self.conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(backend_error)
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        if let Some(quota) = self.quota_bytes {
            if self.used_bytes_excluding(key)? + key.len() + value.len() > quota {
                return Err(StoreError::QuotaExceeded);
            }
        }
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(backend_error)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> std::result::Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .map_err(backend_error)?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> std::result::Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_store WHERE substr(key, 1, ?2) = ?1 ORDER BY key")
            .map_err(backend_error)?;

        let keys = stmt
            .query_map(params![prefix, prefix.chars().count() as i64], |row| row.get(0))
            .map_err(backend_error)?
            .collect::<std::result::Result<Vec<String>, _>>()
            .map_err(backend_error)?;

        Ok(keys)
    }
}

/// Map SQLite failures, treating a full database as quota pressure
fn backend_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(code, _) if code.code == ErrorCode::DiskFull => {
            StoreError::QuotaExceeded
        }
        _ => StoreError::Backend(err.to_string()),
    }
}
