//! Durable key-value storage for AI settings.
//!
//! The resolver only ever reads and writes whole values under fixed keys, so
//! the seam is a plain string map. The SQLite implementation keeps values in
//! the `app_settings` table and audits every write to the event log.

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};
use thiserror::Error;
use time::OffsetDateTime;

use crate::db::DbPool;
use crate::logging::log_event;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings store unavailable: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("settings store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("settings store lock poisoned")]
    Poisoned,
}

/// Host storage primitive with per-key read-after-write consistency.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct SqliteSettingsStore {
    pool: DbPool,
}

impl SqliteSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        conn.execute(
            "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        let _ = log_event(
            &conn,
            "info",
            Some("AI-0001"),
            "ai.settings",
            &format!("setting '{key}' updated"),
            Some("AI configuration updated"),
            None,
        );
        Ok(())
    }
}

/// Process-local store, mostly useful for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;
    use crate::logging::recent_events;

    #[test]
    fn sqlite_store_overwrites_and_audits_without_value() {
        let pool = init_in_memory().unwrap();
        let store = SqliteSettingsStore::new(pool.clone());

        assert_eq!(store.get("strudel-ai-api-key").unwrap(), None);
        store.set("strudel-ai-api-key", "sk-one").unwrap();
        store.set("strudel-ai-api-key", "sk-two").unwrap();
        assert_eq!(
            store.get("strudel-ai-api-key").unwrap().as_deref(),
            Some("sk-two")
        );

        let conn = pool.get().unwrap();
        let events = recent_events(&conn, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.message.contains("sk-")));
    }

    #[test]
    fn memory_store_keeps_empty_values() {
        let store = MemorySettingsStore::new();
        store.set("k", "").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(""));
    }
}
