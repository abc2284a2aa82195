//! In-memory journal. Lost on restart; used in tests and the console chat.

use async_trait::async_trait;
use madoguchi_core::error::JournalError;
use madoguchi_core::journal::{TurnJournal, TurnRecord};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct InMemoryJournal {
    records: Arc<RwLock<Vec<TurnRecord>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far, oldest first.
    pub async fn records(&self) -> Vec<TurnRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl TurnJournal for InMemoryJournal {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append(&self, record: TurnRecord) -> Result<(), JournalError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn count(&self) -> Result<usize, JournalError> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_in_order() {
        let journal = InMemoryJournal::new();
        journal.append(TurnRecord::new("U1", "one", "r1")).await.unwrap();
        journal.append(TurnRecord::new("U2", "two", "r2")).await.unwrap();

        let records = journal.records().await;
        assert_eq!(journal.count().await.unwrap(), 2);
        assert_eq!(records[0].user_message, "one");
        assert_eq!(records[1].user_id, "U2");
    }

    #[tokio::test]
    async fn clones_share_storage() {
        let journal = InMemoryJournal::new();
        let handle = journal.clone();
        handle.append(TurnRecord::new("U1", "q", "a")).await.unwrap();
        assert_eq!(journal.count().await.unwrap(), 1);
    }
}
