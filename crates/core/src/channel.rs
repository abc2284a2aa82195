//! Channel types — the abstraction over the messaging platform.
//!
//! Inbound parsing and signature checks happen in the channel crate; by the
//! time a message reaches the orchestrator it is an [`InboundMessage`]. The
//! orchestrator answers through a [`ReplyChannel`], exactly once per message.

use crate::error::ChannelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque token addressing a reply (LINE reply token, console session, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyHandle(pub String);

impl std::fmt::Display for ReplyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A text message received from the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-specific user ID
    pub user_id: String,

    /// The text content
    pub text: String,

    /// Where the reply goes
    pub reply_handle: ReplyHandle,
}

/// Outbound delivery of a single text reply.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Human-readable channel name (e.g., "line", "console").
    fn name(&self) -> &str;

    /// Deliver `text` to the addressee of `handle`.
    async fn reply(&self, handle: &ReplyHandle, text: &str) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_message_creation() {
        let msg = InboundMessage {
            user_id: "U1234".into(),
            text: "こんにちは".into(),
            reply_handle: ReplyHandle("token-1".into()),
        };
        assert_eq!(msg.user_id, "U1234");
        assert_eq!(msg.reply_handle.to_string(), "token-1");
    }
}
