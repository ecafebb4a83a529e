//! Provider registry.
//!
//! Maps provider names to [`ChatModel`]s in registration order.  The
//! registry is owned by the composition root and shared by reference; every
//! change is announced on a [`tokio::sync::broadcast`] channel so that
//! front-ends can refresh their provider lists without polling.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::agent::{LocalModel, MemoryBook, ResilientAgentClient};
use crate::config::{ResilienceConfig, ScribeConfig};
use crate::error::{Result, ScribeError};
use crate::ports::{DocumentSink, InMemoryStore, KeyValueStore, NullSink};
use crate::provider::{ChatModel, OpenAiAdapter, OpenRouterAdapter, StreamingModel};
use crate::transport::HttpBackend;
use crate::types::ProviderConfig;

/// Name that selects the first registered model.
pub const AUTO_PROVIDER: &str = "auto";

/// Capacity of the change channel.
const EVENT_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A change to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A new name was added.
    Registered { name: String },
    /// An existing name got a new model.
    Replaced { name: String },
}

// ---------------------------------------------------------------------------
// Construction context
// ---------------------------------------------------------------------------

/// The collaborators every model is built with.
///
/// All models built from one context share a single [`MemoryBook`], so
/// providers writing the same storage key never clobber each other.
#[derive(Clone)]
pub struct ProviderContext {
    pub backend: Arc<dyn HttpBackend>,
    pub store: Arc<dyn KeyValueStore>,
    pub sink: Arc<dyn DocumentSink>,
    pub resilience: ResilienceConfig,
    memory: Arc<OnceLock<Arc<MemoryBook>>>,
}

impl ProviderContext {
    /// A context with an in-memory store, a discarding sink, and default
    /// resilience settings.
    pub fn new(backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            backend,
            store: Arc::new(InMemoryStore::new()),
            sink: Arc::new(NullSink),
            resilience: ResilienceConfig::default(),
            memory: Arc::new(OnceLock::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self.memory = Arc::new(OnceLock::new());
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DocumentSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self.memory = Arc::new(OnceLock::new());
        self
    }

    /// The shared memory book, loaded from the store on first use.
    pub fn memory(&self) -> Arc<MemoryBook> {
        let book = self.memory.get_or_init(|| {
            Arc::new(MemoryBook::load(
                Arc::clone(&self.store),
                self.resilience.memory_key.clone(),
            ))
        });
        Arc::clone(book)
    }
}

/// Builds models for provider names outside the built-in mapping.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        name: &str,
        config: &ProviderConfig,
        context: &ProviderContext,
    ) -> Result<Arc<dyn ChatModel>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Named, ordered collection of chat models.  Entries are never removed.
pub struct ProviderRegistry {
    context: ProviderContext,
    factory: Option<Arc<dyn ProviderFactory>>,
    entries: RwLock<Vec<(String, Arc<dyn ChatModel>)>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl ProviderRegistry {
    pub fn new(context: ProviderContext) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            context,
            factory: None,
            entries: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Resolve unknown provider names through `factory`.
    pub fn with_factory(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Register every provider of `config`, in order.
    pub fn register_all(&self, config: &ScribeConfig) -> Result<()> {
        for entry in &config.providers {
            self.register(&entry.name, entry.config.clone())?;
        }
        info!(count = config.providers.len(), "providers registered");
        Ok(())
    }

    /// Build the model for `name` and store it.  A name registered before
    /// keeps its position and gets the new model.
    pub fn register(&self, name: &str, config: ProviderConfig) -> Result<Arc<dyn ChatModel>> {
        let model = self.build_model(name, config)?;
        self.set(name, Arc::clone(&model));
        Ok(model)
    }

    /// The model registered as `name`.  Empty or `"auto"` selects the first
    /// registered model.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChatModel>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if name.is_empty() || name == AUTO_PROVIDER {
            return entries.first().map(|(_, model)| Arc::clone(model));
        }
        entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, model)| Arc::clone(model))
    }

    /// Store `model` under `name`, overwriting in place or appending.
    pub fn set(&self, name: &str, model: Arc<dyn ChatModel>) {
        let event = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            match entries.iter_mut().find(|(entry, _)| entry == name) {
                Some(slot) => {
                    slot.1 = model;
                    RegistryEvent::Replaced {
                        name: name.to_owned(),
                    }
                }
                None => {
                    entries.push((name.to_owned(), model));
                    RegistryEvent::Registered {
                        name: name.to_owned(),
                    }
                }
            }
        };
        debug!(event = ?event, "registry changed");
        self.publish(event);
    }

    /// Receive every future change.  Past changes are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn publish(&self, event: RegistryEvent) {
        match self.events.send(event) {
            Ok(receivers) => trace!(receivers, "registry event published"),
            Err(_) => trace!("registry event published but no active receivers"),
        }
    }

    fn build_model(&self, name: &str, config: ProviderConfig) -> Result<Arc<dyn ChatModel>> {
        let ctx = &self.context;
        let model: Arc<dyn ChatModel> = match name {
            "openai" => Arc::new(StreamingModel::new(
                name,
                OpenAiAdapter::new(config),
                Arc::clone(&ctx.backend),
            )),
            "custom" => Arc::new(StreamingModel::new(
                name,
                OpenAiAdapter::compatible(name, config)?,
                Arc::clone(&ctx.backend),
            )),
            "openrouter" => Arc::new(ResilientAgentClient::new(
                name,
                OpenRouterAdapter::new(config),
                Arc::clone(&ctx.backend),
                Arc::clone(&ctx.store),
                Arc::clone(&ctx.sink),
                ctx.memory(),
                ctx.resilience.clone(),
            )),
            "local" => Arc::new(LocalModel::new(
                name,
                ctx.memory(),
                Arc::clone(&ctx.sink),
                &ctx.resilience,
            )),
            other => match &self.factory {
                Some(factory) => factory.create(other, &config, ctx)?,
                None => {
                    return Err(ScribeError::UnknownProvider {
                        name: other.to_owned(),
                    });
                }
            },
        };
        debug!(provider = %name, "model built");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ByteStream, SseRequest};
    use async_trait::async_trait;

    struct NoNetwork;

    #[async_trait]
    impl HttpBackend for NoNetwork {
        async fn post_stream(&self, request: &SseRequest) -> Result<ByteStream> {
            Err(ScribeError::Request {
                reason: format!("unexpected request to {}", request.url),
            })
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(ProviderContext::new(Arc::new(NoNetwork)))
    }

    #[test]
    fn unknown_name_without_factory_fails() {
        let err = match registry().register("spark", ProviderConfig::default()) {
            Err(e) => e,
            Ok(_) => panic!("spark should not be built without a factory"),
        };
        assert!(matches!(err, ScribeError::UnknownProvider { name } if name == "spark"));
    }

    #[test]
    fn custom_requires_endpoint() {
        let reg = registry();
        assert!(matches!(
            reg.register("custom", ProviderConfig::new("k", "llama3")),
            Err(ScribeError::MissingEndpoint { .. })
        ));
        assert!(reg.is_empty());

        let config = ProviderConfig::new("k", "llama3")
            .with_endpoint("http://localhost:11434/v1/chat/completions");
        assert!(reg.register("custom", config).is_ok());
        assert_eq!(reg.names(), vec!["custom"]);
    }

    #[test]
    fn auto_and_empty_select_first() {
        let reg = registry();
        reg.register("local", ProviderConfig::default()).unwrap();
        reg.register("openai", ProviderConfig::new("k", "gpt-4o")).unwrap();

        assert_eq!(reg.get("auto").unwrap().name(), "local");
        assert_eq!(reg.get("").unwrap().name(), "local");
        assert_eq!(reg.get("openai").unwrap().name(), "openai");
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn reregistering_keeps_position() {
        let reg = registry();
        reg.register("openai", ProviderConfig::new("k", "a")).unwrap();
        reg.register("local", ProviderConfig::default()).unwrap();
        let replacement = reg.register("openai", ProviderConfig::new("k", "b")).unwrap();

        assert_eq!(reg.names(), vec!["openai", "local"]);
        assert!(Arc::ptr_eq(&reg.get("auto").unwrap(), &replacement));
    }

    #[tokio::test]
    async fn changes_are_broadcast() {
        let reg = registry();
        let mut rx = reg.subscribe();

        reg.register("local", ProviderConfig::default()).unwrap();
        reg.register("local", ProviderConfig::default()).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::Registered { name: "local".into() }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            RegistryEvent::Replaced { name: "local".into() }
        );
    }

    #[test]
    fn context_hands_out_one_memory_book() {
        let ctx = ProviderContext::new(Arc::new(NoNetwork));
        assert!(Arc::ptr_eq(&ctx.memory(), &ctx.clone().memory()));

        let rebuilt = ctx.clone().with_store(Arc::new(InMemoryStore::new()));
        assert!(!Arc::ptr_eq(&ctx.memory(), &rebuilt.memory()));
    }
}
