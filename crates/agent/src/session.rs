//! Session store — one conversation transcript per user.
//!
//! Sessions are created lazily on a user's first turn and live until the
//! process exits or the user resets. There is no eviction; [`SessionStore::len`]
//! is the gauge to watch.
//!
//! Each session sits behind its own `tokio::sync::Mutex`. The orchestrator
//! holds that lock across "read transcript → call model → append", which
//! serializes turns for one user while different users proceed in parallel.
//! A reset takes the same lock, so it lands after any turn already in flight.

use madoguchi_core::message::{Conversation, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Shared handle to one user's session.
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// A user's ongoing conversation with the model.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub user_id: String,
    /// Behavioral instructions this session was created with
    pub instructions: Arc<str>,
    pub transcript: Conversation,
}

impl ConversationSession {
    fn new(user_id: &str, instructions: Arc<str>) -> Self {
        Self {
            user_id: user_id.to_string(),
            instructions,
            transcript: Conversation::new(),
        }
    }

    /// Record a completed exchange.
    pub fn record_exchange(&mut self, user_message: &str, reply: &str) {
        self.transcript.push(Message::user(user_message));
        self.transcript.push(Message::assistant(reply));
    }

    /// Number of completed exchanges.
    pub fn turns(&self) -> usize {
        self.transcript.len() / 2
    }
}

/// Process-wide map from user id to session.
pub struct SessionStore {
    instructions: Arc<str>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    /// New sessions are bound to `instructions` (the persona).
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: Arc::from(instructions.into()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// The session for `user_id`, creating an empty one on first use.
    pub async fn get_or_create(&self, user_id: &str) -> SessionHandle {
        if let Some(session) = self.sessions.read().await.get(user_id) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id, "Creating conversation session");
                Arc::new(Mutex::new(ConversationSession::new(
                    user_id,
                    self.instructions.clone(),
                )))
            })
            .clone()
    }

    /// Discard the user's history. Returns whether a session existed.
    ///
    /// Waits for the user's in-flight turn, if any, to finish first.
    pub async fn reset(&self, user_id: &str) -> bool {
        let Some(session) = self.sessions.read().await.get(user_id).cloned() else {
            return false;
        };
        let _turn = session.lock().await;

        let mut sessions = self.sessions.write().await;
        let removed = match sessions.get(user_id) {
            Some(current) if Arc::ptr_eq(current, &session) => sessions.remove(user_id).is_some(),
            _ => false,
        };
        if removed {
            debug!(user_id, "Conversation session reset");
        }
        removed
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_call_creates_empty_session() {
        let store = SessionStore::new("persona");
        assert!(store.is_empty().await);

        let session = store.get_or_create("U1").await;
        let session = session.lock().await;
        assert_eq!(session.user_id, "U1");
        assert!(session.transcript.is_empty());
        assert_eq!(&*session.instructions, "persona");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn same_user_gets_same_session() {
        let store = SessionStore::new("persona");
        store
            .get_or_create("U1")
            .await
            .lock()
            .await
            .record_exchange("こんにちは", "こんにちは！");

        let again = store.get_or_create("U1").await;
        assert_eq!(again.lock().await.turns(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = SessionStore::new("persona");
        store
            .get_or_create("U1")
            .await
            .lock()
            .await
            .record_exchange("秘密の相談", "はい");

        let other = store.get_or_create("U2").await;
        assert!(other.lock().await.transcript.is_empty());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn reset_starts_fresh() {
        let store = SessionStore::new("persona");
        store
            .get_or_create("U1")
            .await
            .lock()
            .await
            .record_exchange("q", "a");

        assert!(store.reset("U1").await);
        assert!(!store.reset("U1").await);
        assert!(store.is_empty().await);

        let fresh = store.get_or_create("U1").await;
        assert_eq!(fresh.lock().await.turns(), 0);
    }

    #[tokio::test]
    async fn reset_waits_for_in_flight_turn() {
        let store = Arc::new(SessionStore::new("persona"));
        let session = store.get_or_create("U1").await;
        let mut turn = session.lock().await;

        let resetting = {
            let store = store.clone();
            tokio::spawn(async move { store.reset("U1").await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!resetting.is_finished());
        assert_eq!(store.len().await, 1);

        turn.record_exchange("q", "a");
        drop(turn);

        assert!(resetting.await.unwrap());
        assert!(store.is_empty().await);
        assert_eq!(store.get_or_create("U1").await.lock().await.turns(), 0);
    }

    #[tokio::test]
    async fn concurrent_first_calls_share_one_session() {
        let store = Arc::new(SessionStore::new("persona"));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.get_or_create("U1").await }));
        }

        let mut sessions = Vec::new();
        for h in handles {
            sessions.push(h.await.unwrap());
        }
        assert!(sessions.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(store.len().await, 1);
    }
}
