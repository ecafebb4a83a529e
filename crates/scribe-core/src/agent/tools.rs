//! Handlers for inline tool invocations.
//!
//! Every handler is a small simulated sub-turn: it narrates what it does
//! through the session, optionally waits a pretend execution latency, and
//! reports a result.  Handler failures are caught here and never abort the
//! surrounding turn.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Result, ScribeError};
use crate::types::{MemoryItem, ToolInvocation, ToolKind};

use super::memory::MemoryBook;
use super::session::TurnSession;

/// Routes invocations to the handler for their tool name.
pub struct ToolDispatcher {
    memory: Arc<MemoryBook>,
    known_agents: Mutex<BTreeSet<String>>,
    latency: Duration,
}

impl ToolDispatcher {
    pub fn new(memory: Arc<MemoryBook>, latency: Duration) -> Self {
        Self {
            memory,
            known_agents: Mutex::new(BTreeSet::new()),
            latency,
        }
    }

    /// Sub-agents registered through `delegate`, sorted.
    pub fn known_agents(&self) -> Vec<String> {
        self.known_agents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn memory(&self) -> &MemoryBook {
        &self.memory
    }

    /// Run the handler for `invocation`, reporting through `session`.
    pub async fn dispatch(&self, invocation: &ToolInvocation, session: &mut TurnSession<'_>) {
        let Some(kind) = invocation.kind() else {
            warn!(tool = %invocation.name, "unknown tool requested");
            session.say(format!(
                "I don't know how to use the `{}` tool.",
                invocation.name
            ));
            return;
        };

        info!(tool = %kind, "dispatching tool");
        if let Err(e) = self.run(kind, invocation.argument.trim(), session).await {
            warn!(tool = %kind, error = %e, "tool handler failed");
            session.say(format!("The {kind} tool could not finish: {e}"));
        }
    }

    async fn run(
        &self,
        kind: ToolKind,
        argument: &str,
        session: &mut TurnSession<'_>,
    ) -> Result<()> {
        match kind {
            ToolKind::Search => {
                let query = required(kind, argument)?;
                session.say(format!("Searching the web for \"{query}\"..."));
                self.pause().await;
                session.say(format!(
                    "Search finished: no live search backend is connected, so there are no \
                     fresh results for \"{query}\"."
                ));
            }
            ToolKind::Code => {
                let code = required(kind, argument)?;
                let lines = code.lines().count();
                session.say(format!("Running a {lines}-line snippet in the sandbox..."));
                self.pause().await;
                session.say("Execution finished (simulated sandbox, no output captured).");
            }
            ToolKind::Terminal => {
                let command = required(kind, argument)?;
                session.say(format!("$ {command}"));
                self.pause().await;
                session.say("Command completed with exit code 0 (simulated terminal).");
            }
            ToolKind::Memory => {
                let fact = required(kind, argument)?;
                self.memory.append(MemoryItem::new(fact, ["memory", "tool"]));
                session.say(format!("Saved to memory: {fact}"));
            }
            ToolKind::Delegate => {
                let (agent, task) = parse_delegation(argument)?;
                self.known_agents
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(agent.to_owned());
                if task.is_empty() {
                    session.say(format!("Registered sub-agent `{agent}`."));
                } else {
                    session.say(format!("Delegated to sub-agent `{agent}`: {task}"));
                }
            }
            ToolKind::Browser => {
                let url = normalize_url(required(kind, argument)?);
                session.say(format!("Opening {url}..."));
                self.pause().await;
                session.say(format!("Loaded {url} (simulated browser)."));
            }
        }
        Ok(())
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn required(kind: ToolKind, argument: &str) -> Result<&str> {
    if argument.is_empty() {
        return Err(ScribeError::Tool {
            tool: kind.to_string(),
            reason: "missing argument".into(),
        });
    }
    Ok(argument)
}

/// `"agent: task"` or just `"agent"`.
fn parse_delegation(argument: &str) -> Result<(&str, &str)> {
    let (agent, task) = match argument.split_once(':') {
        Some((agent, task)) => (agent.trim(), task.trim()),
        None => (argument.trim(), ""),
    };
    if agent.is_empty() {
        return Err(ScribeError::Tool {
            tool: ToolKind::Delegate.to_string(),
            reason: "missing sub-agent name".into(),
        });
    }
    Ok((agent, task))
}

fn normalize_url(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_owned()
    } else {
        format!("https://{raw}")
    }
}
