//! Journal trait — append-only log of completed turns.
//!
//! The journal is a passive sink: the orchestrator writes to it after the
//! reply is computed and never reads from it. A failing journal must not
//! change what the user receives.

use crate::error::JournalError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub user_id: String,
    pub user_message: String,
    pub reply: String,
    pub timestamp: DateTime<Utc>,
}

impl TurnRecord {
    pub fn new(
        user_id: impl Into<String>,
        user_message: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_message: user_message.into(),
            reply: reply.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The core TurnJournal trait.
///
/// Implementations: SQLite, JSONL file, none (no-op).
#[async_trait]
pub trait TurnJournal: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "none").
    fn name(&self) -> &str;

    /// Append a turn record.
    async fn append(&self, record: TurnRecord) -> std::result::Result<(), JournalError>;

    /// Total number of records written.
    async fn count(&self) -> std::result::Result<usize, JournalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_record_serialization() {
        let record = TurnRecord::new("U1", "児童手当は？", "児童手当とは…");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("user_id"));
        assert!(json.contains("児童手当は？"));
        let parsed: TurnRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
