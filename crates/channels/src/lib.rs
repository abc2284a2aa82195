//! Messaging channel implementations for Madoguchi.
//!
//! Available channels:
//! - **LINE** — Messaging API webhook verification, event parsing, replies
//! - **Console** — Interactive terminal chat (stdin/stdout)

pub mod console;
pub mod line;

pub use console::ConsoleChannel;
pub use line::{LineChannel, SIGNATURE_HEADER};
