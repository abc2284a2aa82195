//! The dialogue turn pipeline for Madoguchi.
//!
//! For each inbound message:
//!
//! 1. **Rank** catalog services against the message ([`ranker`])
//! 2. **Assemble** the per-turn instruction ([`context`])
//! 3. **Call the model** inside the user's session ([`session`])
//! 4. **Reply**, substituting a fixed apology if the model fails
//!    ([`orchestrator`])
//!
//! The catalog is loaded once and shared read-only.

pub mod catalog;
pub mod context;
pub mod orchestrator;
pub mod ranker;
pub mod session;

pub use catalog::Catalog;
pub use context::{DEFAULT_PERSONA, PersonaBuilder, PromptAssembler, Section};
pub use orchestrator::{
    DEGRADED_REPLY, RESET_REPLY, TurnKind, TurnOrchestrator, TurnOutcome, TurnState,
};
pub use ranker::rank;
pub use session::{ConversationSession, SessionHandle, SessionStore};
