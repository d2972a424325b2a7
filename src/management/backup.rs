use std::{collections::HashSet, sync::Mutex, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::BackupRow;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Backup store unavailable: {0}")]
    Unavailable(String),

    #[error("Backup call cancelled")]
    Cancelled,
}

/// Durable record of tracks before they are removed.
///
/// Writes are insert-if-absent on the track id: a row that already exists is
/// left untouched and is not counted. A cancelled call writes nothing.
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Returns the number of rows actually written.
    async fn insert_if_absent(
        &self,
        rows: &[BackupRow],
        cancel: &CancellationToken,
    ) -> Result<u64, BackupError>;

    async fn count(&self, cancel: &CancellationToken) -> Result<u64, BackupError>;
}

/// Used when no backup database is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackup;

#[async_trait]
impl BackupStore for NoopBackup {
    async fn insert_if_absent(
        &self,
        _rows: &[BackupRow],
        _cancel: &CancellationToken,
    ) -> Result<u64, BackupError> {
        Ok(0)
    }

    async fn count(&self, _cancel: &CancellationToken) -> Result<u64, BackupError> {
        Ok(0)
    }
}

/// In-process store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryBackup {
    inner: Mutex<MemoryBackupInner>,
}

#[derive(Debug, Default)]
struct MemoryBackupInner {
    rows: Vec<BackupRow>,
    ids: HashSet<String>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<BackupRow> {
        self.inner
            .lock()
            .map(|inner| inner.rows.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BackupStore for MemoryBackup {
    async fn insert_if_absent(
        &self,
        rows: &[BackupRow],
        cancel: &CancellationToken,
    ) -> Result<u64, BackupError> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| BackupError::Unavailable(e.to_string()))?;
        let mut written = 0;
        for row in rows {
            if inner.ids.insert(row.id.clone()) {
                inner.rows.push(row.clone());
                written += 1;
            }
        }
        Ok(written)
    }

    async fn count(&self, cancel: &CancellationToken) -> Result<u64, BackupError> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }
        let inner = self
            .inner
            .lock()
            .map_err(|e| BackupError::Unavailable(e.to_string()))?;
        Ok(inner.rows.len() as u64)
    }
}

/// SQLite-backed store with a unique index on the track id.
#[derive(Clone)]
pub struct SqliteBackup {
    pool: SqlitePool,
}

impl SqliteBackup {
    /// Opens `url` and creates the `track_backup` table if needed.
    ///
    /// In-memory URLs get a single connection so every query sees the same
    /// database.
    pub async fn connect(url: &str) -> Result<Self, BackupError> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Connected to backup database");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), BackupError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS track_backup (
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT NOT NULL,
                uri TEXT NOT NULL,
                url TEXT NOT NULL,
                backed_up_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_track_backup_id ON track_backup (id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Writes `rows` in one transaction. Dropping the future rolls it back.
    async fn write_rows(&self, rows: &[BackupRow]) -> Result<u64, BackupError> {
        let backed_up_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO track_backup (id, name, artist, album, uri, url, backed_up_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.name)
            .bind(&row.artist)
            .bind(&row.album)
            .bind(&row.uri)
            .bind(&row.url)
            .bind(&backed_up_at)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        debug!(requested = rows.len(), written, "backup rows stored");
        Ok(written)
    }
}

#[async_trait]
impl BackupStore for SqliteBackup {
    async fn insert_if_absent(
        &self,
        rows: &[BackupRow],
        cancel: &CancellationToken,
    ) -> Result<u64, BackupError> {
        if rows.is_empty() {
            return Ok(0);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BackupError::Cancelled),
            res = self.write_rows(rows) => res,
        }
    }

    async fn count(&self, cancel: &CancellationToken) -> Result<u64, BackupError> {
        let query = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM track_backup")
            .fetch_one(&self.pool);
        let count = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackupError::Cancelled),
            res = query => res?,
        };
        Ok(count as u64)
    }
}
