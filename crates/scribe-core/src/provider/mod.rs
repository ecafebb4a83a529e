//! Provider abstraction.
//!
//! - [`ProviderAdapter`] -- the per-vendor capability set: URL, headers,
//!   payload, client construction, and chunk decoding.
//! - [`ChatModel`] -- what callers (and the registry) talk to.
//! - [`StreamingModel`] -- the generic `chat` flow over any adapter.
//! - [`openai`] / [`openrouter`] -- the vendor adapters.
//! - [`wire`] -- OpenAI-style chunk decoding shared by the adapters.

pub mod openai;
pub mod openrouter;
pub mod wire;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ScribeError};
use crate::ports::ChatListener;
use crate::transport::{Flow, HttpBackend, SseClient, SseHandler, StreamEnd};
use crate::turn::TurnEmitter;
use crate::types::ProviderConfig;

pub use openai::OpenAiAdapter;
pub use openrouter::OpenRouterAdapter;
pub use wire::{VendorChunk, parse_chunk};

/// Placeholder replaced by the selected text in prompt templates.
pub const CONTENT_TOKEN: &str = "{content}";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The capability set every vendor implements.
pub trait ProviderAdapter: Send + Sync {
    /// Short vendor tag used in logs.
    fn vendor(&self) -> &'static str;

    /// The configuration the adapter was built from.
    fn config(&self) -> &ProviderConfig;

    /// The vendor endpoint, honoring a configured override.
    fn build_url(&self) -> String;

    /// Authentication and vendor headers.
    fn build_headers(&self) -> Vec<(String, String)>;

    /// The request body for `prompt`, with streaming forced on.
    fn wrap_payload(&self, prompt: &str) -> Value;

    /// Decode one `data:` payload.
    fn decode_chunk(&self, data: &str) -> Result<VendorChunk> {
        parse_chunk(data)
    }

    /// A transport aimed at `url`, carrying this vendor's headers.
    fn build_client(&self, url: String, backend: Arc<dyn HttpBackend>) -> SseClient {
        SseClient::new(backend, url, self.build_headers())
    }
}

/// The uniform "prompt in, incremental answer out" contract.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Registry name of this model.
    fn name(&self) -> &str;

    /// Run one turn.
    ///
    /// The listener sees exactly one `on_start` / `on_stop` pair and a FINAL
    /// last message.  Transport failures are delivered as that FINAL message
    /// and also returned as `Err`.
    async fn chat(
        &self,
        selected_text: &str,
        prompt_template: &str,
        listener: Arc<dyn ChatListener>,
    ) -> Result<()>;

    /// Abort the in-flight request, if any.
    fn stop(&self);
}

/// Runtime URL negotiation (signed URLs and the like).
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Produce the URL to use, given the adapter's default.
    async fn resolve(&self, default_url: &str) -> Result<String>;
}

/// Build the final prompt from the selection and a template.
///
/// A `{content}` token is replaced by the selection; otherwise the two are
/// joined with a newline (the template alone when nothing is selected).
pub fn resolve_prompt(selected_text: &str, prompt_template: &str) -> String {
    if prompt_template.contains(CONTENT_TOKEN) {
        prompt_template.replacen(CONTENT_TOKEN, selected_text, 1)
    } else if selected_text.is_empty() {
        prompt_template.to_owned()
    } else if prompt_template.is_empty() {
        selected_text.to_owned()
    } else {
        format!("{selected_text}\n{prompt_template}")
    }
}

/// The adapter's URL, or what `resolver` makes of it.
pub(crate) async fn resolve_url(
    adapter: &dyn ProviderAdapter,
    resolver: Option<&dyn UrlResolver>,
) -> Result<String> {
    let default_url = adapter.build_url();
    match resolver {
        Some(resolver) => {
            resolver
                .resolve(&default_url)
                .await
                .map_err(|e| ScribeError::UrlResolution {
                    reason: e.to_string(),
                })
        }
        None => Ok(default_url),
    }
}

// ---------------------------------------------------------------------------
// Generic streaming model
// ---------------------------------------------------------------------------

/// A [`ChatModel`] that streams one request per turn through an adapter.
pub struct StreamingModel<A> {
    name: String,
    adapter: A,
    backend: Arc<dyn HttpBackend>,
    resolver: Option<Arc<dyn UrlResolver>>,
    active: Mutex<Option<Arc<SseClient>>>,
}

impl<A: ProviderAdapter> StreamingModel<A> {
    pub fn new(name: impl Into<String>, adapter: A, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            name: name.into(),
            adapter,
            backend,
            resolver: None,
            active: Mutex::new(None),
        }
    }

    /// Resolve the URL through `resolver` on every turn.
    pub fn with_url_resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    async fn stream_turn(&self, prompt: &str, handler: &mut StreamingHandler<'_, A>) -> Result<()> {
        let url = resolve_url(&self.adapter, self.resolver.as_deref()).await?;
        let payload = serde_json::to_string(&self.adapter.wrap_payload(prompt))?;

        debug!(
            provider = %self.name,
            vendor = self.adapter.vendor(),
            url = %url,
            "starting chat turn"
        );

        let client = Arc::new(self.adapter.build_client(url, Arc::clone(&self.backend)));
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&client));

        let end = client.start(payload, handler).await;

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
        debug!(provider = %self.name, end = ?end, "chat turn finished");
        Ok(())
    }
}

#[async_trait]
impl<A: ProviderAdapter + 'static> ChatModel for StreamingModel<A> {
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

        let mut handler = StreamingHandler::new(&self.adapter, listener.as_ref());
        let result = self.stream_turn(&prompt, &mut handler).await;
        match &result {
            Ok(()) => handler.turn.finish(),
            Err(e) => {
                tracing::warn!(provider = %self.name, error = %e, "chat turn failed");
                handler.turn.fail(e);
            }
        }

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

/// Translates vendor chunks into listener messages for one turn.
struct StreamingHandler<'a, A> {
    adapter: &'a A,
    turn: TurnEmitter<'a>,
    vendor_error: Option<String>,
}

impl<'a, A: ProviderAdapter> StreamingHandler<'a, A> {
    fn new(adapter: &'a A, listener: &'a dyn ChatListener) -> Self {
        Self {
            adapter,
            turn: TurnEmitter::new(listener),
            vendor_error: None,
        }
    }
}

#[async_trait]
impl<A: ProviderAdapter> SseHandler for StreamingHandler<'_, A> {
    async fn on_data(&mut self, data: &str) -> Result<Flow> {
        let chunk = self.adapter.decode_chunk(data)?;

        if let Some(message) = chunk.error {
            self.vendor_error = Some(message);
            return Ok(Flow::Stop);
        }
        if let Some(tokens) = chunk.total_tokens {
            debug!(vendor = self.adapter.vendor(), total_tokens = tokens, "usage reported");
        }

        if let Some(message) = chunk.into_message(self.turn.emitted()) {
            self.turn.emit(message.content, message.status);
        }
        Ok(Flow::Continue)
    }

    fn on_stop(&mut self, end: StreamEnd) {
        debug!(vendor = self.adapter.vendor(), end = ?end, "stream closed");
    }
}
