//! SQLite archive backend for ChainRelay.
//!
//! One row per `(kind, flush window)` in `archive_records`. `timestamp` holds
//! Unix milliseconds (UTC). Uses `sqlx` with
//! WAL mode so the HTTP archive endpoint can read while the relay writes.
//!
//! # Usage
//! ```rust,no_run
//! use chainrelay_storage::sqlite::SqliteArchive;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let archive = SqliteArchive::open("./relay.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let archive = SqliteArchive::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::DateTime;
use indexmap::IndexMap;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainrelay_core::{Archive, ArchiveRecord, EventKind, RelayError};

fn write_err(e: sqlx::Error) -> RelayError {
    RelayError::ArchiveWriteFailure {
        reason: e.to_string(),
    }
}

fn read_err(e: sqlx::Error) -> RelayError {
    RelayError::ArchiveReadFailure {
        reason: e.to_string(),
    }
}

/// SQLite-backed `Archive`.
pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./relay.db"`) or a full
    /// SQLite URL (`"sqlite:./relay.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, RelayError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(read_err)?;
        let archive = Self { pool };
        archive.init_schema().await?;
        Ok(archive)
    }

    /// Open an in-memory SQLite database.
    ///
    /// A single connection: every pooled connection would otherwise get its
    /// own empty database.
    pub async fn in_memory() -> Result<Self, RelayError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(read_err)?;

        let archive = Self { pool };
        archive.init_schema().await?;
        Ok(archive)
    }

    /// Create the table and enable WAL mode.
    async fn init_schema(&self) -> Result<(), RelayError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(read_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS archive_records (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                type         TEXT    NOT NULL,
                times        INTEGER NOT NULL,
                timestamp    INTEGER NOT NULL
            );",
        )
        .execute(&self.pool)
        .await
        .map_err(read_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_archive_type ON archive_records (type);")
            .execute(&self.pool)
            .await
            .map_err(read_err)?;

        Ok(())
    }

    /// Sum of `times` per kind over the whole archive, ordered by kind.
    pub async fn totals(&self) -> Result<IndexMap<EventKind, u64>, RelayError> {
        let rows = sqlx::query(
            "SELECT type, SUM(times) AS total FROM archive_records GROUP BY type ORDER BY type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let kind: String = row.get("type");
                let total: i64 = row.get("total");
                (EventKind::new(kind), total as u64)
            })
            .collect())
    }

    /// Number of stored records.
    pub async fn record_count(&self) -> Result<u64, RelayError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM archive_records")
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;

        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

#[async_trait]
impl Archive for SqliteArchive {
    async fn record(&self, record: &ArchiveRecord) -> Result<(), RelayError> {
        sqlx::query("INSERT INTO archive_records (type, times, timestamp) VALUES (?, ?, ?)")
            .bind(record.kind.as_str())
            .bind(record.times as i64)
            .bind(record.timestamp.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(write_err)?;

        debug!(kind = %record.kind, times = record.times, "archive record stored");
        Ok(())
    }

    async fn records(&self, kind: Option<&EventKind>) -> Result<Vec<ArchiveRecord>, RelayError> {
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    "SELECT type, times, timestamp FROM archive_records WHERE type = ? ORDER BY id",
                )
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT type, times, timestamp FROM archive_records ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(read_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.get("type");
            let times: i64 = row.get("times");
            let ms: i64 = row.get("timestamp");
            let timestamp = DateTime::from_timestamp_millis(ms).ok_or_else(|| RelayError::Other(format!(
                "archive row for '{kind}' has out-of-range timestamp {ms}"
            )))?;
            records.push(ArchiveRecord::new(EventKind::new(kind), times as u64, timestamp));
        }
        Ok(records)
    }
}
