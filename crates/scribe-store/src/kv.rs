//! Persistent key-value store.
//!
//! Backs Scribe's storage port: the "prefer free model" flag and the
//! serialized agent memory live here so they survive restarts.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use scribe_core::{KeyValueStore, Result as CoreResult};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// String key-value pairs in a single SQLite table.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Database::open(path).map(Self::new)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Database::open_in_memory().map(Self::new)
    }

    /// Get a value by key on the blocking pool.
    #[instrument(skip(self))]
    pub async fn get_async(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_owned();
        self.db.execute(move |conn| select(conn, &key)).await
    }

    /// Set a value on the blocking pool.
    #[instrument(skip(self, value))]
    pub async fn set_async(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.db.execute(move |conn| upsert(conn, &key, &value)).await
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.db.with_conn(|conn| select(conn, key))?)
    }

    fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        Ok(self.db.with_conn(|conn| upsert(conn, key, value))?)
    }
}

fn select(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM kv WHERE key = ?1",
            rusqlite::params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn upsert(conn: &Connection, key: &str, value: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![key, value, chrono::Utc::now().timestamp()],
    )?;
    debug!(key = %key, len = value.len(), "kv updated");
    Ok(())
}
