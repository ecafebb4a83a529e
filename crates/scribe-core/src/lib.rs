//! Provider abstraction core for Scribe.
//!
//! Scribe turns "send a prompt, receive an incrementally typed answer" into
//! one contract over several incompatible vendor streaming protocols.  When
//! a vendor runs out of credits the resilient client degrades to a free
//! model and finally to a local simulator.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌───────────┐
//! │   Registry   │────>│  ChatModel  │────>│ SseClient │──> vendor
//! │ (name→model) │     │ (per turn)  │     │  (SSE)    │
//! └──────────────┘     └──────┬──────┘     └───────────┘
//!                             │
//!                 ┌───────────┴───────────┐
//!                 │ ResilientAgentClient  │
//!                 │ quota → free → local  │
//!                 │ tool tags, memory     │
//!                 └───────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`registry`] -- named models, `"auto"` selection, change events.
//! - [`provider`] -- the adapter trait, the generic streaming model, vendors.
//! - [`transport`] -- SSE line splitting over an injectable HTTP backend.
//! - [`agent`] -- resilient client, simulator, tool tags, memory.
//! - [`ports`] -- storage, document sink, and listener seams.
//! - [`config`] -- TOML configuration and environment overrides.
//! - [`error`] -- the crate error type.

pub mod agent;
pub mod config;
pub mod error;
pub mod ports;
pub mod provider;
pub mod registry;
pub mod transport;
pub mod turn;
pub mod types;

// Re-export the most commonly used types at the crate root.
pub use agent::{LocalModel, MemoryBook, ResilientAgentClient, ToolTagScanner};
pub use config::{MEMORY_KEY, NamedProvider, PREFER_FREE_MODEL_KEY, ResilienceConfig, ScribeConfig};
pub use error::{Result, ScribeError};
pub use ports::{ChatListener, DocumentSink, InMemoryStore, KeyValueStore, NullSink, WriteOptions};
pub use provider::{
    ChatModel, OpenAiAdapter, OpenRouterAdapter, ProviderAdapter, StreamingModel, UrlResolver,
    resolve_prompt,
};
pub use registry::{
    AUTO_PROVIDER, ProviderContext, ProviderFactory, ProviderRegistry, RegistryEvent,
};
pub use transport::{HttpBackend, ReqwestBackend, SseClient, SseHandler, SseRequest};
pub use types::{
    ChatMessage, LegacyModelField, MemoryItem, MessageStatus, ProviderConfig, Role,
    ToolInvocation, ToolKind,
};
