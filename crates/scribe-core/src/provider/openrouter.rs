//! OpenRouter adapter.
//!
//! OpenRouter speaks the OpenAI wire format and adds attribution headers.
//! Its quota errors arrive in-band, which is why the resilient agent client
//! wraps this adapter rather than the generic streaming model.

use serde_json::Value;

use crate::provider::ProviderAdapter;
use crate::provider::openai::{bearer_headers, chat_completion_payload};
use crate::types::{LegacyModelField, ProviderConfig};

/// Default OpenRouter chat-completions endpoint.
pub const OPENROUTER_CHAT_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used when the configuration names none.
pub const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Adapter for the OpenRouter API.
#[derive(Debug, Clone)]
pub struct OpenRouterAdapter {
    config: ProviderConfig,
    app_title: String,
    referer: String,
}

impl OpenRouterAdapter {
    pub fn new(mut config: ProviderConfig) -> Self {
        config.normalize(LegacyModelField::Model);
        Self {
            config,
            app_title: "Scribe".to_owned(),
            referer: "https://github.com/scribe-rs/scribe".to_owned(),
        }
    }

    /// Override the attribution headers.
    pub fn with_attribution(
        mut self,
        title: impl Into<String>,
        referer: impl Into<String>,
    ) -> Self {
        self.app_title = title.into();
        self.referer = referer.into();
        self
    }

    /// The configured (primary) model.
    pub fn primary_model(&self) -> &str {
        self.config
            .model_name()
            .unwrap_or(OPENROUTER_DEFAULT_MODEL)
    }
}

impl ProviderAdapter for OpenRouterAdapter {
    fn vendor(&self) -> &'static str {
        "openrouter"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_url(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| OPENROUTER_CHAT_URL.to_owned())
    }

    fn build_headers(&self) -> Vec<(String, String)> {
        let mut headers = bearer_headers(&self.config);
        headers.push(("HTTP-Referer".to_owned(), self.referer.clone()));
        headers.push(("X-Title".to_owned(), self.app_title.clone()));
        headers
    }

    fn wrap_payload(&self, prompt: &str) -> Value {
        chat_completion_payload(&self.config, OPENROUTER_DEFAULT_MODEL, prompt)
    }
}
