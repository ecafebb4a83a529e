//! The agent layer on top of the provider abstraction.
//!
//! - [`ResilientAgentClient`] -- quota-aware OpenRouter client with inline tools.
//! - [`LocalModel`] / [`Simulator`] -- offline answers.
//! - [`ToolTagScanner`] / [`ToolDispatcher`] -- the `[tool:NAME]ARG[/tool]`
//!   sub-protocol.
//! - [`MemoryBook`] -- persisted memory items.

pub mod client;
pub mod memory;
pub mod quota;
pub mod scanner;
pub mod session;
pub mod simulator;
pub mod tools;

pub use client::{ModelTier, ResilientAgentClient};
pub use memory::MemoryBook;
pub use quota::QuotaDetector;
pub use scanner::ToolTagScanner;
pub use session::TurnSession;
pub use simulator::{LocalModel, SimulatedReply, Simulator};
pub use tools::ToolDispatcher;

use crate::types::MemoryItem;

/// Tag of the item recorded at the end of every turn with content.
pub const CONVERSATION_TAG: &str = "conversation";

/// Record a finished turn in memory, unless it produced no text.
pub(crate) fn remember_turn(memory: &MemoryBook, prompt: &str, answer: &str) {
    if answer.trim().is_empty() {
        return;
    }
    memory.append(MemoryItem::new(
        format!("Q: {prompt}\nA: {answer}"),
        [CONVERSATION_TAG],
    ));
}
