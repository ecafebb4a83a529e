//! Offline answers.
//!
//! The simulator is the last tier of the fallback chain and the whole of the
//! `local` provider.  It never touches the network: it runs tools the prompt
//! asks for, either through an explicit tag or a recognised intent, and
//! otherwise acknowledges the prompt in word-sized chunks.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::config::ResilienceConfig;
use crate::error::Result;
use crate::ports::{ChatListener, DocumentSink};
use crate::provider::{ChatModel, resolve_prompt};
use crate::types::{MemoryItem, MessageStatus, ToolInvocation, ToolKind};

use super::memory::MemoryBook;
use super::scanner::ToolTagScanner;
use super::remember_turn;
use super::session::TurnSession;
use super::tools::ToolDispatcher;

static SEARCH_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)^\s*(?:please\s+)?",
        r"(?:search(?:\s+the\s+web)?(?:\s+for)?|look\s+up|find)",
        r"\s+(.+?)[\s?.!]*$",
    ))
    .expect("search intent pattern compiles")
});

static CODE_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)\b(?:write|generate)\s+(?:me\s+)?(?:some\s+|a\s+|the\s+)?",
        r"(?:code|function|script|program)\b",
        r"(?:\s+(?:for|to|that)\s+(.+?))?[\s?.!]*$",
    ))
    .expect("code intent pattern compiles")
});

static REMEMBER_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(?:please\s+)?remember(?:\s+that)?\s+(.+?)[\s.!]*$")
        .expect("remember intent pattern compiles")
});

/// What the simulator will do for a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedReply {
    /// Run these tools, in order.
    Tools(Vec<ToolInvocation>),
    /// Acknowledge the prompt with this text.
    Acknowledge(String),
}

/// Produces answers without a vendor.
#[derive(Debug, Clone)]
pub struct Simulator {
    chunk_delay: Duration,
}

impl Simulator {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }

    /// Decide how to answer `prompt`: explicit tags first, then intents,
    /// then a plain acknowledgement.
    pub fn plan(prompt: &str) -> SimulatedReply {
        let tagged = ToolTagScanner::scan_all(prompt);
        if !tagged.is_empty() {
            return SimulatedReply::Tools(tagged);
        }
        if let Some(invocation) = detect_intent(prompt) {
            return SimulatedReply::Tools(vec![invocation]);
        }
        SimulatedReply::Acknowledge(acknowledgement(prompt))
    }

    /// Answer `prompt` through `session`.  Returns the content the closing
    /// FINAL should carry: the whole acknowledgement, or nothing after tools.
    pub async fn respond(
        &self,
        prompt: &str,
        session: &mut TurnSession<'_>,
        tools: &ToolDispatcher,
    ) -> Option<String> {
        match Self::plan(prompt) {
            SimulatedReply::Tools(invocations) => {
                debug!(count = invocations.len(), "simulating tool turn");
                for invocation in &invocations {
                    tools.dispatch(invocation, session).await;
                }
                None
            }
            SimulatedReply::Acknowledge(text) => {
                debug!(len = text.len(), "simulating acknowledgement");
                for (i, word) in text.split_inclusive(' ').enumerate() {
                    let status = if i == 0 {
                        MessageStatus::Start
                    } else {
                        MessageStatus::Continue
                    };
                    session.absorb(word);
                    session.emit(word, status);
                    if !self.chunk_delay.is_zero() {
                        tokio::time::sleep(self.chunk_delay).await;
                    }
                }
                Some(text)
            }
        }
    }
}

/// Map a natural-language request onto a tool.
fn detect_intent(prompt: &str) -> Option<ToolInvocation> {
    if let Some(caps) = REMEMBER_INTENT.captures(prompt) {
        return Some(ToolInvocation::new(ToolKind::Memory.as_str(), caps[1].trim()));
    }
    if let Some(caps) = SEARCH_INTENT.captures(prompt) {
        return Some(ToolInvocation::new(ToolKind::Search.as_str(), caps[1].trim()));
    }
    if let Some(caps) = CODE_INTENT.captures(prompt) {
        let task = caps.get(1).map_or(prompt, |m| m.as_str());
        return Some(ToolInvocation::new(ToolKind::Code.as_str(), task.trim()));
    }
    None
}

fn acknowledgement(prompt: &str) -> String {
    format!(
        "I can't reach a language model right now, so this is an offline reply. \
         You asked: \"{prompt}\". I'll give a full answer once a model is available again."
    )
}

// ---------------------------------------------------------------------------
// Local provider
// ---------------------------------------------------------------------------

/// The `local` provider: every turn is simulated.
pub struct LocalModel {
    name: String,
    simulator: Simulator,
    tools: ToolDispatcher,
    memory: Arc<MemoryBook>,
    sink: Arc<dyn DocumentSink>,
}

impl LocalModel {
    /// `memory` is shared with any other model persisting to the same key.
    pub fn new(
        name: impl Into<String>,
        memory: Arc<MemoryBook>,
        sink: Arc<dyn DocumentSink>,
        resilience: &ResilienceConfig,
    ) -> Self {
        Self {
            name: name.into(),
            simulator: Simulator::new(resilience.chunk_delay()),
            tools: ToolDispatcher::new(Arc::clone(&memory), resilience.tool_latency()),
            memory,
            sink,
        }
    }

    pub fn memories(&self) -> Vec<MemoryItem> {
        self.memory.items()
    }

    pub fn known_agents(&self) -> Vec<String> {
        self.tools.known_agents()
    }
}

#[async_trait]
impl ChatModel for LocalModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(
        &self,
        selected_text: &str,
        prompt_template: &str,
        listener: Arc<dyn ChatListener>,
    ) -> Result<()> {
        let prompt = resolve_prompt(selected_text, prompt_template);
        listener.on_start();

        let mut session = TurnSession::new(listener.as_ref(), self.sink.as_ref());
        let closing = self.simulator.respond(&prompt, &mut session, &self.tools).await;
        remember_turn(&self.memory, &prompt, session.content());
        session.finish(closing.unwrap_or_default());

        listener.on_stop();
        Ok(())
    }

    fn stop(&self) {
        debug!(provider = %self.name, "stop requested on local model, nothing in flight");
    }
}
