//! SQLite journal backend.
//!
//! One table, `turns`, append-only. Timestamps are stored as RFC 3339 text.

use async_trait::async_trait;
use chrono::Utc;
use madoguchi_core::error::JournalError;
use madoguchi_core::journal::{TurnJournal, TurnRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed turn journal.
pub struct SqliteJournal {
    pool: SqlitePool,
}

impl SqliteJournal {
    /// Open (or create) a journal database at `path`.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, JournalError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| JournalError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // A single connection keeps ":memory:" databases coherent.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| JournalError::Storage(format!("Failed to open SQLite: {e}")))?;

        let journal = Self { pool };
        journal.run_migrations().await?;
        info!("SQLite journal initialized at {path}");
        Ok(journal)
    }

    async fn run_migrations(&self) -> Result<(), JournalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      TEXT NOT NULL,
                user_message TEXT NOT NULL,
                reply        TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_user ON turns(user_id, created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| JournalError::MigrationFailed(format!("user index: {e}")))?;

        debug!("SQLite journal migrations complete");
        Ok(())
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<TurnRecord>, JournalError> {
        let rows = sqlx::query(
            "SELECT user_id, user_message, reply, created_at FROM turns ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| JournalError::Storage(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<TurnRecord, JournalError> {
        let column = |name: &str| -> Result<String, JournalError> {
            row.try_get(name)
                .map_err(|e| JournalError::Storage(format!("{name} column: {e}")))
        };

        let timestamp = chrono::DateTime::parse_from_rfc3339(&column("created_at")?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(TurnRecord {
            user_id: column("user_id")?,
            user_message: column("user_message")?,
            reply: column("reply")?,
            timestamp,
        })
    }
}

#[async_trait]
impl TurnJournal for SqliteJournal {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, record: TurnRecord) -> Result<(), JournalError> {
        sqlx::query(
            "INSERT INTO turns (user_id, user_message, reply, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&record.user_id)
        .bind(&record.user_message)
        .bind(&record.reply)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::Storage(format!("INSERT failed: {e}")))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, JournalError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM turns")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| JournalError::Storage(format!("COUNT failed: {e}")))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_and_count() {
        let journal = SqliteJournal::new(":memory:").await.unwrap();
        assert_eq!(journal.count().await.unwrap(), 0);

        journal
            .append(TurnRecord::new("U1", "児童手当について", "児童手当は…"))
            .await
            .unwrap();
        journal
            .append(TurnRecord::new("U2", "一時保育", "一時保育は…"))
            .await
            .unwrap();

        assert_eq!(journal.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn recent_is_newest_first() {
        let journal = SqliteJournal::new(":memory:").await.unwrap();
        let first = TurnRecord::new("U1", "first", "r1");
        journal.append(first.clone()).await.unwrap();
        journal.append(TurnRecord::new("U1", "second", "r2")).await.unwrap();

        let recent = journal.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].user_message, "second");
        assert_eq!(recent[1].user_message, first.user_message);
        assert_eq!(recent[1].timestamp.timestamp(), first.timestamp.timestamp());
    }

    #[tokio::test]
    async fn file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.db");
        let url = format!("sqlite://{}", path.display());

        {
            let journal = SqliteJournal::new(&url).await.unwrap();
            journal.append(TurnRecord::new("U1", "q", "a")).await.unwrap();
        }

        let reopened = SqliteJournal::new(&url).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
