//! Console channel — interactive terminal chat.
//!
//! Reads lines from stdin and prints replies to stdout. Used by
//! `madoguchi chat` to drive the orchestrator without LINE.

use async_trait::async_trait;
use madoguchi_core::channel::{InboundMessage, ReplyChannel, ReplyHandle};
use madoguchi_core::error::ChannelError;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Interactive console channel for one local user.
pub struct ConsoleChannel {
    user_id: String,
}

impl ConsoleChannel {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Spawn a stdin reader. The receiver closes on EOF or an exit command.
    pub fn start(&self) -> mpsc::Receiver<InboundMessage> {
        let (tx, rx) = mpsc::channel(32);
        let user_id = self.user_id.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(io::stdin()).lines();
            let mut seq: u64 = 0;

            while let Ok(Some(line)) = lines.next_line().await {
                let Some(message) = to_message(&user_id, &line, seq) else {
                    if is_exit(&line) {
                        break;
                    }
                    continue;
                };
                seq += 1;
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        rx
    }
}

impl Default for ConsoleChannel {
    fn default() -> Self {
        Self::new("local_user")
    }
}

fn is_exit(line: &str) -> bool {
    EXIT_COMMANDS.contains(&line.trim())
}

/// Turn a console line into an inbound message; blank and exit lines yield `None`.
fn to_message(user_id: &str, line: &str, seq: u64) -> Option<InboundMessage> {
    let text = line.trim();
    if text.is_empty() || is_exit(text) {
        return None;
    }
    Some(InboundMessage {
        user_id: user_id.to_string(),
        text: text.to_string(),
        reply_handle: ReplyHandle(format!("console-{seq}")),
    })
}

#[async_trait]
impl ReplyChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn reply(&self, _handle: &ReplyHandle, text: &str) -> Result<(), ChannelError> {
        println!();
        println!("  窓口 > {text}");
        println!();
        Ok(())
    }
}
