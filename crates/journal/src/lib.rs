//! Turn journal backends for Madoguchi.
//!
//! The journal is a write-only sink for completed turns. Backends:
//! - `none` — [`NoopJournal`]
//! - `file` — [`FileJournal`], JSON lines
//! - `sqlite` — [`SqliteJournal`] (feature `sqlite`, on by default)
//!
//! [`InMemoryJournal`] is available for tests and embedding.

pub mod file;
pub mod in_memory;
pub mod noop;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::FileJournal;
pub use in_memory::InMemoryJournal;
pub use noop::NoopJournal;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteJournal;

use madoguchi_config::AppConfig;
use madoguchi_core::error::JournalError;
use madoguchi_core::journal::TurnJournal;
use std::sync::Arc;
use tracing::info;

/// Open the journal backend named in `[journal]`.
pub async fn build_from_config(config: &AppConfig) -> Result<Arc<dyn TurnJournal>, JournalError> {
    let journal: Arc<dyn TurnJournal> = match config.journal.backend.as_str() {
        "none" => Arc::new(NoopJournal),
        "file" => Arc::new(FileJournal::new(config.journal_path())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let path = config.journal_path();
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .map_err(|e| JournalError::Storage(format!("create dir failed: {e}")))?;
            }
            let url = format!("sqlite://{}", path.display());
            Arc::new(SqliteJournal::new(&url).await?)
        }
        other => {
            return Err(JournalError::Storage(format!(
                "journal backend '{other}' is not available in this build"
            )));
        }
    };

    info!(backend = journal.name(), "Turn journal ready");
    Ok(journal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_is_noop() {
        let journal = build_from_config(&AppConfig::default()).await.unwrap();
        assert_eq!(journal.name(), "none");
    }

    #[tokio::test]
    async fn file_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.journal.backend = "file".into();
        config.journal.path = Some(dir.path().join("turns.jsonl"));

        let journal = build_from_config(&config).await.unwrap();
        assert_eq!(journal.name(), "file");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.journal.backend = "sqlite".into();
        config.journal.path = Some(dir.path().join("db").join("turns.db"));

        let journal = build_from_config(&config).await.unwrap();
        assert_eq!(journal.name(), "sqlite");
        assert_eq!(journal.count().await.unwrap(), 0);
    }
}
