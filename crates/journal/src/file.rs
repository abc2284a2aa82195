//! JSON-lines journal — one `TurnRecord` per line, appended in place.
//!
//! Human-inspectable and dependency-free. Appends are serialized through a
//! mutex so concurrent turns never interleave partial lines.

use async_trait::async_trait;
use madoguchi_core::error::JournalError;
use madoguchi_core::journal::{TurnJournal, TurnRecord};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct FileJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileJournal {
    /// Journal at `path`. The file and its parent directory are created on
    /// first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every well-formed record back. Corrupted lines are skipped.
    pub async fn read_all(&self) -> Result<Vec<TurnRecord>, JournalError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JournalError::Storage(format!("read failed: {e}"))),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<TurnRecord>(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted journal line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl TurnJournal for FileJournal {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, record: TurnRecord) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(&record)
            .map_err(|e| JournalError::Storage(format!("serialize failed: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| JournalError::Storage(format!("create dir failed: {e}")))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| JournalError::Storage(format!("open failed: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| JournalError::Storage(format!("write failed: {e}")))?;
        file.flush()
            .await
            .map_err(|e| JournalError::Storage(format!("flush failed: {e}")))?;

        debug!(path = %self.path.display(), "Journal line appended");
        Ok(())
    }

    async fn count(&self) -> Result<usize, JournalError> {
        Ok(self.read_all().await?.len())
    }
}
