//! # Madoguchi Core
//!
//! Domain types, traits, and error definitions for the Madoguchi relay.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every outside collaborator is a trait here. Implementations live in their
//! respective crates:
//! - [`Provider`] — the external generative model (`madoguchi-providers`)
//! - [`ReplyChannel`] — outbound message delivery (`madoguchi-channels`)
//! - [`TurnJournal`] — the optional logging sink (`madoguchi-journal`)

pub mod channel;
pub mod error;
pub mod journal;
pub mod message;
pub mod provider;
pub mod service;

// Re-export key types at crate root for ergonomics
pub use channel::{InboundMessage, ReplyChannel, ReplyHandle};
pub use error::{CatalogError, ChannelError, JournalError, ProviderError};
pub use journal::{TurnJournal, TurnRecord};
pub use message::{Conversation, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use service::{RankedMatch, ServiceRecord};
