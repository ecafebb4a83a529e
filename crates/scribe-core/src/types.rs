//! Plain data records shared by every component.
//!
//! These types carry no behavior beyond construction helpers and the
//! `model_id` / legacy-field synchronization of [`ProviderConfig`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input from the human user.
    User,
    /// Output from the model (or the local simulator).
    Assistant,
    /// System-level instructions.
    System,
}

/// Lifecycle position of a message within one turn.
///
/// Serialized as its integer value (`0`, `1`, `2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MessageStatus {
    /// First message of a turn.  Only emitted by sources that track a local
    /// counter; callers treat it like [`MessageStatus::Continue`].
    Start = 0,
    /// An intermediate message.
    Continue = 1,
    /// The last message of a turn, successful or not.
    Final = 2,
}

impl From<MessageStatus> for u8 {
    fn from(status: MessageStatus) -> Self {
        status as u8
    }
}

impl TryFrom<u8> for MessageStatus {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Start),
            1 => Ok(Self::Continue),
            2 => Ok(Self::Final),
            other => Err(format!("invalid message status: {other}")),
        }
    }
}

/// One incremental message delivered to a [`crate::ChatListener`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who produced the message.
    pub role: Role,
    /// The text fragment carried by this message.
    #[serde(default)]
    pub content: String,
    /// Position within the turn; never decreases.
    pub index: u32,
    /// Lifecycle position.
    pub status: MessageStatus,
}

impl ChatMessage {
    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>, index: u32, status: MessageStatus) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            index,
            status,
        }
    }

    /// Whether this message closes the turn.
    pub fn is_final(&self) -> bool {
        self.status == MessageStatus::Final
    }
}

// ---------------------------------------------------------------------------
// Provider configuration
// ---------------------------------------------------------------------------

/// Which vendor-specific legacy field mirrors `model_id` for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyModelField {
    /// OpenAI-style vendors historically used `model`.
    Model,
    /// Versioned vendors (e.g. Spark) historically used `version`.
    Version,
}

/// Plain per-provider configuration record.
///
/// `model_id` is the vendor-neutral model name.  The legacy `model` /
/// `version` fields are kept for backward compatibility and must agree with
/// `model_id` for the field the provider uses: use [`Self::set_model_id`] or
/// [`Self::set_legacy_model`] rather than writing the fields directly, and
/// call [`Self::normalize`] after deserializing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key; injected as a header by the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Full endpoint URL overriding the vendor default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Vendor-neutral model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    /// Legacy model field (OpenAI-style vendors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Legacy version field (versioned vendors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens per response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    /// Create a config with an API key and model.
    pub fn new(api_key: impl Into<String>, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        Self {
            api_key: Some(api_key.into()),
            model_id: Some(model_id.clone()),
            model: Some(model_id),
            ..Self::default()
        }
    }

    /// Builder-style endpoint override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Builder-style max token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Write `model_id` and propagate it to the provider's legacy field.
    pub fn set_model_id(&mut self, field: LegacyModelField, model_id: impl Into<String>) {
        let model_id = model_id.into();
        *self.legacy_slot(field) = Some(model_id.clone());
        self.model_id = Some(model_id);
    }

    /// Write the provider's legacy field and propagate it to `model_id`.
    pub fn set_legacy_model(&mut self, field: LegacyModelField, value: impl Into<String>) {
        let value = value.into();
        self.model_id = Some(value.clone());
        *self.legacy_slot(field) = Some(value);
    }

    /// Reconcile `model_id` and the legacy field after deserialization.
    ///
    /// An explicit `model_id` wins; otherwise the legacy value is adopted.
    pub fn normalize(&mut self, field: LegacyModelField) {
        match (self.model_id.clone(), self.legacy_slot(field).clone()) {
            (Some(id), _) => *self.legacy_slot(field) = Some(id),
            (None, Some(legacy)) => self.model_id = Some(legacy),
            (None, None) => {}
        }
    }

    /// The effective model name, if any.
    pub fn model_name(&self) -> Option<&str> {
        self.model_id
            .as_deref()
            .or(self.model.as_deref())
            .or(self.version.as_deref())
    }

    /// The API key, if present and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    fn legacy_slot(&mut self, field: LegacyModelField) -> &mut Option<String> {
        match field {
            LegacyModelField::Model => &mut self.model,
            LegacyModelField::Version => &mut self.version,
        }
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// A persisted memory owned by the resilient agent client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier.
    pub id: String,
    /// Remembered text.
    pub content: String,
    /// When the memory was recorded (RFC 3339 on the wire).
    pub timestamp: DateTime<Utc>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl MemoryItem {
    /// Create a memory stamped with the current time and a fresh id.
    pub fn new<I, T>(content: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            id: Uuid::now_v7().to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool invocations
// ---------------------------------------------------------------------------

/// The fixed set of tools a model may invoke inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Search,
    Code,
    Terminal,
    Memory,
    Delegate,
    Browser,
}

impl ToolKind {
    /// Every known tool, in canonical order.
    pub const ALL: [ToolKind; 6] = [
        ToolKind::Search,
        ToolKind::Code,
        ToolKind::Terminal,
        ToolKind::Memory,
        ToolKind::Delegate,
        ToolKind::Browser,
    ];

    /// The lowercase tag name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Search => "search",
            ToolKind::Code => "code",
            ToolKind::Terminal => "terminal",
            ToolKind::Memory => "memory",
            ToolKind::Delegate => "delegate",
            ToolKind::Browser => "browser",
        }
    }

    /// Case-sensitive lookup by tag name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool request parsed out of message text.  Ephemeral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tag name as written by the model.
    pub name: String,
    /// Argument text, trimmed.
    pub argument: String,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: argument.into(),
        }
    }

    /// The known tool this invocation targets, if any.
    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.name)
    }
}
