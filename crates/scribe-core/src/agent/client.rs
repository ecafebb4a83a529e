//! Resilient agent client.
//!
//! Streams from OpenRouter and degrades when credits run out: the first
//! quota error on the configured model switches to the free model for one
//! retry (and remembers that choice), a quota error on the free model drops
//! to the local simulator.  Streamed text is scanned for inline tool tags,
//! which are dispatched as the stream goes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::ResilienceConfig;
use crate::error::{Result, ScribeError};
use crate::ports::{ChatListener, DocumentSink, KeyValueStore};
use crate::provider::{
    ChatModel, OpenRouterAdapter, ProviderAdapter, UrlResolver, resolve_prompt, resolve_url,
};
use crate::transport::{Flow, HttpBackend, SseClient, SseHandler, StreamEnd};
use crate::types::{MemoryItem, MessageStatus};

use super::memory::MemoryBook;
use super::quota::QuotaDetector;
use super::remember_turn;
use super::session::TurnSession;
use super::simulator::Simulator;
use super::tools::ToolDispatcher;

// ---------------------------------------------------------------------------
// Turn state machine
// ---------------------------------------------------------------------------

/// Which model a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// The configured model.
    Primary,
    /// The configured free model.
    Free,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Requesting(ModelTier),
    QuotaError(ModelTier),
    Exhausted,
    Simulating,
    Done,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The `openrouter` provider.
pub struct ResilientAgentClient {
    name: String,
    adapter: OpenRouterAdapter,
    backend: Arc<dyn HttpBackend>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn DocumentSink>,
    resilience: ResilienceConfig,
    quota: QuotaDetector,
    memory: Arc<MemoryBook>,
    tools: ToolDispatcher,
    simulator: Simulator,
    prefer_free: AtomicBool,
    resolver: Option<Arc<dyn UrlResolver>>,
    active: Mutex<Option<Arc<SseClient>>>,
}

impl ResilientAgentClient {
    /// Build the client and read the persisted free-model flag.  `memory`
    /// is shared with any other model persisting to the same key.
    pub fn new(
        name: impl Into<String>,
        adapter: OpenRouterAdapter,
        backend: Arc<dyn HttpBackend>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn DocumentSink>,
        memory: Arc<MemoryBook>,
        resilience: ResilienceConfig,
    ) -> Self {
        let name = name.into();
        let prefer_free = match store.get(&resilience.prefer_free_key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                warn!(provider = %name, error = %e, "failed to read free-model flag");
                false
            }
        };

        debug!(
            provider = %name,
            model = adapter.primary_model(),
            prefer_free,
            memories = memory.len(),
            "resilient agent client ready"
        );

        Self {
            quota: QuotaDetector::new(&resilience.quota_phrases),
            tools: ToolDispatcher::new(Arc::clone(&memory), resilience.tool_latency()),
            simulator: Simulator::new(resilience.chunk_delay()),
            name,
            adapter,
            backend,
            store,
            sink,
            resilience,
            memory,
            prefer_free: AtomicBool::new(prefer_free),
            resolver: None,
            active: Mutex::new(None),
        }
    }

    /// Resolve the request URL through `resolver` on every attempt.
    pub fn with_url_resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Snapshot of the memory list, oldest first.
    pub fn memories(&self) -> Vec<MemoryItem> {
        self.memory.items()
    }

    /// Sub-agents registered through the `delegate` tool.
    pub fn known_agents(&self) -> Vec<String> {
        self.tools.known_agents()
    }

    /// Whether turns start on the free model.
    pub fn prefers_free_model(&self) -> bool {
        self.prefer_free.load(Ordering::Relaxed)
    }

    fn initial_state(&self) -> TurnState {
        if self.adapter.config().api_key().is_none() {
            info!(provider = %self.name, "no API key configured, answering offline");
            return TurnState::Simulating;
        }
        let primary_is_free = self.adapter.primary_model() == self.resilience.free_model_id;
        if self.prefers_free_model() || primary_is_free {
            TurnState::Requesting(ModelTier::Free)
        } else {
            TurnState::Requesting(ModelTier::Primary)
        }
    }

    /// Drive the state machine.  Returns the content of the closing FINAL.
    ///
    /// Each network attempt's output is held in the session until the
    /// attempt ends; a quota failure discards it so the fallback answer is
    /// not spliced onto a partial one.
    async fn run_turn(
        &self,
        prompt: &str,
        session: &mut TurnSession<'_>,
    ) -> Result<Option<String>> {
        let mut state = self.initial_state();
        let mut closing = None;

        loop {
            debug!(provider = %self.name, state = ?state, "agent turn state");
            state = match state {
                TurnState::Requesting(tier) => {
                    session.begin_attempt();
                    match self.attempt(tier, prompt, session).await {
                        Ok(()) => {
                            session.commit_attempt();
                            TurnState::Done
                        }
                        Err(e) if self.quota.is_quota_error(&e) => {
                            session.discard_attempt();
                            warn!(
                                provider = %self.name,
                                tier = ?tier,
                                error = %e,
                                "model out of credits"
                            );
                            TurnState::QuotaError(tier)
                        }
                        Err(e) => {
                            session.commit_attempt();
                            return Err(e);
                        }
                    }
                }
                TurnState::QuotaError(ModelTier::Primary) => {
                    self.persist_prefer_free();
                    info!(
                        provider = %self.name,
                        model = %self.resilience.free_model_id,
                        "retrying on the free model"
                    );
                    TurnState::Requesting(ModelTier::Free)
                }
                TurnState::QuotaError(ModelTier::Free) => TurnState::Exhausted,
                TurnState::Exhausted => {
                    info!(provider = %self.name, "free model exhausted, answering offline");
                    TurnState::Simulating
                }
                TurnState::Simulating => {
                    closing = self.simulator.respond(prompt, session, &self.tools).await;
                    TurnState::Done
                }
                TurnState::Done => break,
            };
        }

        Ok(closing)
    }

    /// One streaming request on `tier`.
    async fn attempt(
        &self,
        tier: ModelTier,
        prompt: &str,
        session: &mut TurnSession<'_>,
    ) -> Result<()> {
        let payload = self.payload_for(tier, prompt);
        let url = resolve_url(&self.adapter, self.resolver.as_deref()).await?;
        debug!(
            provider = %self.name,
            url = %url,
            model = %payload["model"],
            "sending LLM request"
        );

        let client = Arc::new(self.adapter.build_client(url, Arc::clone(&self.backend)));
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&client));

        let mut handler = AgentStreamHandler {
            adapter: &self.adapter,
            tools: &self.tools,
            session,
            vendor_error: None,
        };
        let end = client.start(serde_json::to_string(&payload)?, &mut handler).await;

        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_ref().is_some_and(|c| Arc::ptr_eq(c, &client)) {
                *active = None;
            }
        }

        let end = end?;
        if let Some(message) = handler.vendor_error.take() {
            return Err(ScribeError::Vendor { message });
        }
        debug!(provider = %self.name, end = ?end, "stream finished");
        Ok(())
    }

    /// The request body for `tier`.  The free tier swaps the model and
    /// halves the token budget, capped at `free_max_tokens`.
    fn payload_for(&self, tier: ModelTier, prompt: &str) -> Value {
        let mut payload = self.adapter.wrap_payload(prompt);
        if tier == ModelTier::Free {
            let cap = self.resilience.free_max_tokens;
            let budget = match self.adapter.config().max_tokens {
                Some(max) => (max / 2).max(1).min(cap),
                None => cap,
            };
            payload["model"] = json!(self.resilience.free_model_id);
            payload["max_tokens"] = json!(budget);
        }
        payload
    }

    fn persist_prefer_free(&self) {
        self.prefer_free.store(true, Ordering::Relaxed);
        if let Err(e) = self.store.set(&self.resilience.prefer_free_key, "true") {
            warn!(provider = %self.name, error = %e, "failed to persist free-model flag");
        }
    }
}

#[async_trait]
impl ChatModel for ResilientAgentClient {
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
        let outcome = self.run_turn(&prompt, &mut session).await;
        remember_turn(&self.memory, &prompt, session.content());

        let result = match outcome {
            Ok(closing) => {
                session.finish(closing.unwrap_or_default());
                Ok(())
            }
            Err(e) => {
                warn!(provider = %self.name, error = %e, "agent turn failed");
                session.fail(&e);
                Err(e)
            }
        };

        listener.on_stop();
        result
    }

    fn stop(&self) {
        let active = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(client) = active {
            client.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// Stream handling
// ---------------------------------------------------------------------------

/// Feeds one request's chunks into the turn session.
///
/// Text, stop chunk included, goes out as CONTINUE in stream order, ahead of
/// the tool output it triggers.  The turn's FINAL is sent by `chat` once
/// tools and memory writes are done.
struct AgentStreamHandler<'h, 'a> {
    adapter: &'h OpenRouterAdapter,
    tools: &'h ToolDispatcher,
    session: &'h mut TurnSession<'a>,
    vendor_error: Option<String>,
}

#[async_trait]
impl SseHandler for AgentStreamHandler<'_, '_> {
    async fn on_data(&mut self, data: &str) -> Result<Flow> {
        let chunk = self.adapter.decode_chunk(data)?;

        if let Some(message) = chunk.error {
            self.vendor_error = Some(message);
            return Ok(Flow::Stop);
        }
        if let Some(tokens) = chunk.total_tokens {
            debug!(total_tokens = tokens, "usage reported");
        }

        let content = chunk.content.unwrap_or_default();
        let invocations = self.session.absorb(&content);
        if !content.is_empty() {
            self.session.emit(content, MessageStatus::Continue);
        }

        for invocation in &invocations {
            self.tools.dispatch(invocation, &mut *self.session).await;
        }
        Ok(Flow::Continue)
    }

    fn on_stop(&mut self, end: StreamEnd) {
        debug!(end = ?end, "agent stream closed");
    }
}
