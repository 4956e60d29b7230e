//! SQLite key-value store implementation.
//!
//! Features:
//! - WAL mode for concurrent readers
//! - One row per key, values stored as TEXT
//! - Watch via in-memory channels (per-process)

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::store::{validate_key, KeyValueStore};
use crate::watch::{WatchEvent, WatchSender, WatchStream};

/// SQLite implementation of [`KeyValueStore`].
///
/// Watch notifications are in-process only (not shared across processes).
pub struct SqliteStore {
    pool: SqlitePool,
    watcher: WatchSender,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening SQLite store at {:?}", path);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));
        Self::connect(options, SqlitePoolOptions::new().max_connections(5)).await
    }

    /// A private in-memory database, gone when the store is dropped.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        // each connection would get its own in-memory database, and a
        // recycled connection would lose it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);
        Self::connect(options, pool).await
    }

    async fn connect(options: SqliteConnectOptions, pool: SqlitePoolOptions) -> Result<Self> {
        let pool = pool
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("cannot open database: {}", e)))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_items (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        debug!("SQLite schema initialized");

        Ok(Self {
            pool,
            watcher: WatchSender::default(),
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;

        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_items WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        validate_key(key)?;

        // Previous value is only needed for the watch event
        let previous = self.get_item(key).await?;

        sqlx::query(
            r#"
            INSERT INTO kv_items (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!(key, bytes = value.len(), "kv item written");
        self.watcher.send(WatchEvent::for_write(key, previous, value));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let existing = self.get_item(key).await?;

        sqlx::query("DELETE FROM kv_items WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        if let Some(old) = existing {
            self.watcher.send(WatchEvent::deleted(key, old));
        }

        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM kv_items ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    fn watch(&self, pattern: &str) -> Result<WatchStream> {
        Ok(self.watcher.subscribe(pattern))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        info!("SQLite store closed");
        Ok(())
    }
}
