//! No-op journal — for deployments that keep no turn history.

use async_trait::async_trait;
use madoguchi_core::error::JournalError;
use madoguchi_core::journal::{TurnJournal, TurnRecord};

/// Discards every record.
pub struct NoopJournal;

#[async_trait]
impl TurnJournal for NoopJournal {
    fn name(&self) -> &str {
        "none"
    }

    async fn append(&self, _record: TurnRecord) -> Result<(), JournalError> {
        Ok(())
    }

    async fn count(&self) -> Result<usize, JournalError> {
        Ok(0)
    }
}
