//! Instruction assembly for one turn.
//!
//! The assembled instruction is built from named sections. Each
//! [`PromptMode`](madoguchi_config::PromptMode) is a fixed, ordered list of
//! sections; one builder renders them all.
//!
//! | Section | Content |
//! |---------|---------|
//! | Consultation | The user's message, restated |
//! | Categories | Intent categories (classify mode only) |
//! | Tasks | Ordered task list, with fallback wording when nothing matched |
//! | Services | Matched services, verbatim name / description / URL |
//! | Style | Tone, length ceiling, hand-off for clinical topics |
//! | Grounding | Never invent URLs; unknown URLs stated as unknown |

pub mod assembler;
pub mod persona;

pub use assembler::{PromptAssembler, Section, sections_for};
pub use persona::{DEFAULT_PERSONA, PersonaBuilder};
