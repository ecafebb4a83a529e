//! Configuration records.
//!
//! [`ScribeConfig`] is loaded from TOML by the composition root.  The core
//! never reads the process environment itself: overrides arrive through
//! [`ScribeConfig::apply_env_overrides`] as an explicit iterator.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScribeError};
use crate::types::{LegacyModelField, ProviderConfig};

/// Storage key of the "prefer free model" flag.
pub const PREFER_FREE_MODEL_KEY: &str = "scribe.prefer_free_model";

/// Storage key of the serialized memory list.
pub const MEMORY_KEY: &str = "scribe.agent_memory";

/// Prefix of recognised environment overrides.
const ENV_PREFIX: &str = "SCRIBE_";

// ---------------------------------------------------------------------------
// Resilience
// ---------------------------------------------------------------------------

/// Tuning of the quota fallback chain and the local simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Model switched to after the first quota error.
    pub free_model_id: String,
    /// Upper bound of the token budget on the free model.
    pub free_max_tokens: u32,
    /// Case-insensitive phrases that identify quota exhaustion.
    pub quota_phrases: Vec<String>,
    /// Pause between simulated word chunks.
    pub chunk_delay_ms: u64,
    /// Pretend execution latency of tool handlers.
    pub tool_latency_ms: u64,
    /// Storage key for the "prefer free model" flag.
    pub prefer_free_key: String,
    /// Storage key for the memory list.
    pub memory_key: String,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            free_model_id: "meta-llama/llama-3.1-8b-instruct:free".to_owned(),
            free_max_tokens: 1024,
            quota_phrases: [
                "insufficient credits",
                "requires more credits",
                "insufficient_quota",
                "exceeded your current quota",
                "quota exceeded",
                "credit balance is too low",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            chunk_delay_ms: 30,
            tool_latency_ms: 400,
            prefer_free_key: PREFER_FREE_MODEL_KEY.to_owned(),
            memory_key: MEMORY_KEY.to_owned(),
        }
    }
}

impl ResilienceConfig {
    /// Defaults with every artificial delay removed.
    pub fn without_delays() -> Self {
        Self {
            chunk_delay_ms: 0,
            tool_latency_ms: 0,
            ..Self::default()
        }
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }

    pub fn tool_latency(&self) -> Duration {
        Duration::from_millis(self.tool_latency_ms)
    }
}

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

/// One `[[providers]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedProvider {
    pub name: String,
    #[serde(flatten)]
    pub config: ProviderConfig,
}

/// Everything the composition root needs to build a registry.
///
/// Providers are an ordered list so that `"auto"` deterministically means
/// the first one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScribeConfig {
    /// Provider used when the caller names none.
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub providers: Vec<NamedProvider>,
}

impl ScribeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(text).map_err(|e| ScribeError::Config {
            reason: format!("invalid TOML: {e}"),
        })?;
        for entry in &mut config.providers {
            entry.config.normalize(legacy_field_for(&entry.name));
        }
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScribeError::Config {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(
            path = %path.display(),
            providers = config.providers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject empty or duplicate provider names and an empty free model.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for entry in &self.providers {
            if entry.name.trim().is_empty() {
                return Err(ScribeError::Config {
                    reason: "provider name must not be empty".into(),
                });
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ScribeError::Config {
                    reason: format!("duplicate provider `{}`", entry.name),
                });
            }
        }
        if self.resilience.free_model_id.trim().is_empty() {
            return Err(ScribeError::Config {
                reason: "resilience.free_model_id must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Look up a provider entry by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.config)
    }

    /// Apply `SCRIBE_<NAME>_API_KEY`, `SCRIBE_<NAME>_ENDPOINT` and
    /// `SCRIBE_<NAME>_MODEL` overrides.  Names are upper-cased with `-`
    /// mapped to `_`.  Returns how many values were applied.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut applied = 0;
        for (key, value) in vars {
            let Some(rest) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.into();
            for entry in &mut self.providers {
                let env_name = entry.name.to_ascii_uppercase().replace('-', "_");
                let Some(setting) = rest
                    .strip_prefix(env_name.as_str())
                    .and_then(|r| r.strip_prefix('_'))
                else {
                    continue;
                };
                let matched = match setting {
                    "API_KEY" => {
                        entry.config.api_key = Some(value.clone());
                        true
                    }
                    "ENDPOINT" => {
                        entry.config.endpoint = Some(value.clone());
                        true
                    }
                    "MODEL" => {
                        entry
                            .config
                            .set_model_id(legacy_field_for(&entry.name), value.clone());
                        true
                    }
                    _ => false,
                };
                if matched {
                    debug!(provider = %entry.name, setting, "applied environment override");
                    applied += 1;
                }
            }
        }
        applied
    }
}

/// The legacy model field a provider name keeps in sync with `model_id`.
pub fn legacy_field_for(provider: &str) -> LegacyModelField {
    match provider {
        "spark" | "wenxin" => LegacyModelField::Version,
        _ => LegacyModelField::Model,
    }
}
