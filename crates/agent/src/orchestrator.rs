//! Dialogue turn orchestrator.
//!
//! One inbound message moves through
//! `Received → Ranked → Assembled → ModelCalled → Replied`, or
//! `ModelCalled → Degraded → Replied` when the model call fails or outlives
//! the turn budget. Nothing raised inside a turn escapes: every message gets
//! exactly one reply.

use crate::catalog::Catalog;
use crate::context::{PersonaBuilder, PromptAssembler};
use crate::ranker;
use crate::session::SessionStore;
use madoguchi_config::{AppConfig, PromptMode};
use madoguchi_core::channel::{InboundMessage, ReplyChannel};
use madoguchi_core::journal::{TurnJournal, TurnRecord};
use madoguchi_core::message::Message;
use madoguchi_core::provider::{Provider, ProviderRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sent in place of a model reply when the model call fails.
pub const DEGRADED_REPLY: &str =
    "ごめんなさい、今ちょっと考えがまとまらないみたいです。少し時間を置いてからもう一度試してみてください。";

/// Sent after a reset command.
pub const RESET_REPLY: &str = "会話の履歴をリセットしました。新しいご相談をどうぞ。";

/// Where a turn is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Ranked,
    Assembled,
    ModelCalled,
    Degraded,
    Replied,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Ranked => "ranked",
            Self::Assembled => "assembled",
            Self::ModelCalled => "model_called",
            Self::Degraded => "degraded",
            Self::Replied => "replied",
        };
        f.write_str(s)
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnKind {
    /// The model answered
    Answered,
    /// The model failed; the fixed apology was used
    Degraded,
    /// The user asked to reset; the model was not called
    Reset,
}

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub kind: TurnKind,
    /// Number of ranked services offered to the model
    pub matches: usize,
}

impl TurnOutcome {
    pub fn is_degraded(&self) -> bool {
        self.kind == TurnKind::Degraded
    }
}

/// Coordinates catalog ranking, prompt assembly, the model call, and the
/// per-user transcript for each inbound message.
pub struct TurnOrchestrator {
    provider: Arc<dyn Provider>,
    catalog: Arc<Catalog>,
    sessions: Arc<SessionStore>,
    assembler: PromptAssembler,

    /// Optional logging sink, written after successful turns
    journal: Option<Arc<dyn TurnJournal>>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    mode: PromptMode,
    limit: usize,
    reset_commands: Vec<String>,

    /// Upper bound on the model call, retries included
    turn_budget: Duration,
}

impl TurnOrchestrator {
    /// Orchestrator with default dialogue settings and the built-in persona.
    pub fn new(provider: Arc<dyn Provider>, catalog: Arc<Catalog>) -> Self {
        let config = AppConfig::default();
        Self::from_config(&config, provider, catalog)
    }

    /// Orchestrator configured from `[model]`, `[catalog]`, and `[dialogue]`.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, catalog: Arc<Catalog>) -> Self {
        let dialogue = &config.dialogue;
        let persona = PersonaBuilder::new(dialogue.help_line.clone())
            .with_override(dialogue.persona.clone())
            .build();

        Self {
            provider,
            catalog,
            sessions: Arc::new(SessionStore::new(persona)),
            assembler: PromptAssembler::new(dialogue.max_reply_chars, dialogue.help_line.clone()),
            journal: None,
            model: config.model.name.clone(),
            temperature: config.model.temperature,
            max_tokens: Some(config.model.max_output_tokens),
            mode: dialogue.mode,
            limit: config.catalog.limit,
            reset_commands: dialogue.reset_commands.clone(),
            turn_budget: Duration::from_secs(config.model.turn_budget_secs),
        }
    }

    /// Attach a turn journal.
    pub fn with_journal(mut self, journal: Arc<dyn TurnJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the maximum number of ranked services per turn.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Bound the model call (retries included) for each turn.
    pub fn with_turn_budget(mut self, budget: Duration) -> Self {
        self.turn_budget = budget;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn mode(&self) -> PromptMode {
        self.mode
    }

    fn is_reset_command(&self, text: &str) -> bool {
        let text = text.trim();
        self.reset_commands
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(text))
    }

    /// Run one turn and deliver its reply through `channel`.
    ///
    /// Delivery failures are logged; the outcome is returned either way.
    pub async fn handle_message(
        &self,
        message: &InboundMessage,
        channel: &dyn ReplyChannel,
    ) -> TurnOutcome {
        let outcome = self.handle_turn(&message.user_id, &message.text).await;

        match channel.reply(&message.reply_handle, &outcome.reply).await {
            Ok(()) => debug!(
                user_id = %message.user_id,
                channel = channel.name(),
                state = %TurnState::Replied,
                "Reply delivered"
            ),
            Err(e) => error!(
                user_id = %message.user_id,
                channel = channel.name(),
                error = %e,
                "Reply delivery failed"
            ),
        }

        outcome
    }

    /// Run one turn for `user_id` and return the reply text. Never fails.
    pub async fn handle_turn(&self, user_id: &str, text: &str) -> TurnOutcome {
        debug!(user_id, state = %TurnState::Received, "Turn started");

        if self.is_reset_command(text) {
            self.sessions.reset(user_id).await;
            info!(user_id, "Conversation reset by user");
            return TurnOutcome {
                reply: RESET_REPLY.to_string(),
                kind: TurnKind::Reset,
                matches: 0,
            };
        }

        let matches = ranker::rank(text, self.catalog.records(), self.limit);
        debug!(
            user_id,
            state = %TurnState::Ranked,
            matches = matches.len(),
            top = matches.first().map(|m| m.record.name.as_str()).unwrap_or(""),
            "Services ranked"
        );

        let instruction = self.assembler.assemble(text, &matches, self.mode);
        debug!(user_id, state = %TurnState::Assembled, mode = %self.mode, "Instruction assembled");

        // Held until the transcript is updated: one turn per user at a time.
        let session = self.sessions.get_or_create(user_id).await;
        let mut session = session.lock().await;

        let mut messages = session.transcript.messages.clone();
        messages.push(Message::user(instruction));

        let request = ProviderRequest {
            model: self.model.clone(),
            system: Some(session.instructions.to_string()),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let Ok(result) = tokio::time::timeout(self.turn_budget, self.provider.complete(request)).await
        else {
            warn!(
                user_id,
                state = %TurnState::Degraded,
                provider = self.provider.name(),
                budget_secs = self.turn_budget.as_secs(),
                "Model call exceeded the turn budget, sending degraded reply"
            );
            return self.degraded(matches.len());
        };
        debug!(user_id, state = %TurnState::ModelCalled, ok = result.is_ok(), "Model call finished");

        let reply = match result {
            Ok(response) if !response.message.content.trim().is_empty() => response.message.content,
            Ok(_) => {
                warn!(user_id, state = %TurnState::Degraded, "Model returned an empty reply");
                return self.degraded(matches.len());
            }
            Err(e) => {
                warn!(
                    user_id,
                    state = %TurnState::Degraded,
                    provider = self.provider.name(),
                    error = %e,
                    "Model call failed, sending degraded reply"
                );
                return self.degraded(matches.len());
            }
        };

        session.record_exchange(text, &reply);
        let turns = session.turns();
        drop(session);

        info!(user_id, matches = matches.len(), turns, "Turn answered");
        self.journal_turn(user_id, text, &reply).await;

        TurnOutcome {
            reply,
            kind: TurnKind::Answered,
            matches: matches.len(),
        }
    }

    fn degraded(&self, matches: usize) -> TurnOutcome {
        TurnOutcome {
            reply: DEGRADED_REPLY.to_string(),
            kind: TurnKind::Degraded,
            matches,
        }
    }

    async fn journal_turn(&self, user_id: &str, text: &str, reply: &str) {
        let Some(journal) = &self.journal else {
            return;
        };
        if let Err(e) = journal.append(TurnRecord::new(user_id, text, reply)).await {
            warn!(user_id, journal = journal.name(), error = %e, "Journal write failed");
        }
    }
}
