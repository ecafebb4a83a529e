//! OpenAI Chat Completions adapter.
//!
//! Also serves any OpenAI-compatible server (Ollama, vLLM, Together) when
//! the configuration carries an explicit endpoint.

use serde_json::{Value, json};

use crate::error::{Result, ScribeError};
use crate::provider::ProviderAdapter;
use crate::types::{LegacyModelField, ProviderConfig};

/// Default OpenAI chat-completions endpoint.
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Model used when the configuration names none.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Adapter for the OpenAI Chat Completions API.
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    config: ProviderConfig,
}

impl OpenAiAdapter {
    pub fn new(mut config: ProviderConfig) -> Self {
        config.normalize(LegacyModelField::Model);
        Self { config }
    }

    /// An adapter for an OpenAI-compatible server; the endpoint is required.
    pub fn compatible(provider: &str, config: ProviderConfig) -> Result<Self> {
        if config.endpoint.as_deref().is_none_or(str::is_empty) {
            return Err(ScribeError::MissingEndpoint {
                provider: provider.to_owned(),
            });
        }
        Ok(Self::new(config))
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn vendor(&self) -> &'static str {
        "openai"
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_url(&self) -> String {
        self.config
            .endpoint
            .clone()
            .unwrap_or_else(|| OPENAI_CHAT_URL.to_owned())
    }

    fn build_headers(&self) -> Vec<(String, String)> {
        bearer_headers(&self.config)
    }

    fn wrap_payload(&self, prompt: &str) -> Value {
        chat_completion_payload(&self.config, OPENAI_DEFAULT_MODEL, prompt)
    }
}

/// `Authorization: Bearer <key>` when a key is configured.
pub(crate) fn bearer_headers(config: &ProviderConfig) -> Vec<(String, String)> {
    config
        .api_key()
        .map(|key| vec![("Authorization".to_owned(), format!("Bearer {key}"))])
        .unwrap_or_default()
}

/// Build an OpenAI-style streaming chat-completions body.
pub(crate) fn chat_completion_payload(
    config: &ProviderConfig,
    default_model: &str,
    prompt: &str,
) -> Value {
    let mut body = json!({
        "model": config.model_name().unwrap_or(default_model),
        "messages": [{"role": "user", "content": prompt}],
        "stream": true,
    });

    if let Some(temperature) = config.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = config.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_forces_streaming_and_merges_parameters() {
        let mut config = ProviderConfig::new("sk-test", "gpt-4o").with_max_tokens(512);
        config.temperature = Some(0.5);
        let adapter = OpenAiAdapter::new(config);

        let body = adapter.wrap_payload("hello");

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let adapter = OpenAiAdapter::new(ProviderConfig::default());
        assert_eq!(adapter.build_url(), OPENAI_CHAT_URL);
        assert!(adapter.build_headers().is_empty());

        let body = adapter.wrap_payload("x");
        assert_eq!(body["model"], OPENAI_DEFAULT_MODEL);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn bearer_header_is_injected() {
        let adapter = OpenAiAdapter::new(ProviderConfig::new("sk-abc", "m"));
        assert_eq!(
            adapter.build_headers(),
            vec![("Authorization".to_owned(), "Bearer sk-abc".to_owned())]
        );
    }

    #[test]
    fn compatible_adapter_requires_endpoint() {
        let err = OpenAiAdapter::compatible("custom", ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, ScribeError::MissingEndpoint { .. }));

        let adapter = OpenAiAdapter::compatible(
            "custom",
            ProviderConfig::default().with_endpoint("http://localhost:11434/v1/chat/completions"),
        )
        .unwrap();
        assert_eq!(
            adapter.build_url(),
            "http://localhost:11434/v1/chat/completions"
        );
    }
}
