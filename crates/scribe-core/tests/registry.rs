//! Registry wiring with a caller-supplied factory.

mod common;

use std::sync::Arc;

use common::{RecordingListener, ScriptedBackend, memory_store, streamed};
use scribe_core::{
    ChatModel, KeyValueStore, LocalModel, MEMORY_KEY, MemoryItem, ProviderConfig,
    ProviderContext, ProviderFactory, ProviderRegistry, RegistryEvent, ResilienceConfig, Result,
    ScribeConfig, ScribeError,
};

/// Builds every unknown provider as a local model under its own name.
struct OfflineFactory;

impl ProviderFactory for OfflineFactory {
    fn create(
        &self,
        name: &str,
        _config: &ProviderConfig,
        context: &ProviderContext,
    ) -> Result<Arc<dyn ChatModel>> {
        if name == "broken" {
            return Err(ScribeError::Config {
                reason: "no adapter for broken".into(),
            });
        }
        Ok(Arc::new(LocalModel::new(
            name,
            context.memory(),
            Arc::clone(&context.sink),
            &context.resilience,
        )))
    }
}

fn registry(backend: Arc<ScriptedBackend>) -> ProviderRegistry {
    registry_with_store(backend, memory_store())
}

fn registry_with_store(
    backend: Arc<ScriptedBackend>,
    store: Arc<dyn KeyValueStore>,
) -> ProviderRegistry {
    let context = ProviderContext::new(backend)
        .with_store(store)
        .with_resilience(ResilienceConfig::without_delays());
    ProviderRegistry::new(context).with_factory(Arc::new(OfflineFactory))
}

#[test]
fn auto_is_first_registered_every_time() {
    let reg = registry(ScriptedBackend::new(Vec::new()));
    reg.register("spark", ProviderConfig::default()).unwrap();
    reg.register("openai", ProviderConfig::new("sk", "gpt-4o")).unwrap();

    for _ in 0..5 {
        assert_eq!(reg.get("auto").unwrap().name(), "spark");
    }
    assert_eq!(reg.names(), vec!["spark", "openai"]);
}

#[test]
fn factory_errors_propagate_and_register_nothing() {
    let reg = registry(ScriptedBackend::new(Vec::new()));
    assert!(matches!(
        reg.register("broken", ProviderConfig::default()),
        Err(ScribeError::Config { .. })
    ));
    assert!(reg.names().is_empty());
}

#[tokio::test]
async fn set_overwrites_and_publishes() {
    let reg = registry(ScriptedBackend::new(Vec::new()));
    let mut rx = reg.subscribe();

    let first = reg.register("wenxin", ProviderConfig::default()).unwrap();
    let replacement = reg.register("local", ProviderConfig::default()).unwrap();
    reg.set("wenxin", Arc::clone(&replacement));

    assert!(!Arc::ptr_eq(&reg.get("wenxin").unwrap(), &first));
    assert!(Arc::ptr_eq(&reg.get("wenxin").unwrap(), &replacement));

    let events = [
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
    ];
    assert_eq!(
        events,
        [
            RegistryEvent::Registered { name: "wenxin".into() },
            RegistryEvent::Registered { name: "local".into() },
            RegistryEvent::Replaced { name: "wenxin".into() },
        ]
    );
}

#[tokio::test]
async fn configured_providers_register_in_order() {
    let config = ScribeConfig::from_toml_str(
        r#"
[[providers]]
name = "openrouter"
api_key = "or-key"
model_id = "openai/gpt-4o"

[[providers]]
name = "local"
"#,
    )
    .unwrap();
    let backend = ScriptedBackend::new(vec![streamed(&["routed"])]);
    let reg = registry(backend.clone());

    reg.register_all(&config).unwrap();

    assert_eq!(reg.names(), vec!["openrouter", "local"]);
    let listener = RecordingListener::new();
    reg.get("").unwrap().chat("", "hi", listener.clone()).await.unwrap();
    listener.assert_complete_turn();
    assert_eq!(listener.contents()[0], "routed");
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn local_provider_answers_offline() {
    let backend = ScriptedBackend::new(Vec::new());
    let reg = registry(backend.clone());
    reg.register("local", ProviderConfig::default()).unwrap();

    let listener = RecordingListener::new();
    reg.get("local")
        .unwrap()
        .chat("", "remember that tea beats coffee", listener.clone())
        .await
        .unwrap();

    listener.assert_complete_turn();
    assert_eq!(backend.request_count(), 0);
    assert!(
        listener
            .contents()
            .contains(&"Saved to memory: tea beats coffee".to_owned())
    );
}

#[tokio::test]
async fn providers_sharing_a_store_keep_each_others_memories() {
    let store = memory_store();
    let backend = ScriptedBackend::new(vec![streamed(&["Paris"])]);
    let reg = registry_with_store(backend, Arc::clone(&store));
    reg.register("openrouter", ProviderConfig::new("or-key", "openai/gpt-4o"))
        .unwrap();
    reg.register("local", ProviderConfig::default()).unwrap();

    reg.get("openrouter")
        .unwrap()
        .chat("", "capital of France?", RecordingListener::new())
        .await
        .unwrap();
    reg.get("local")
        .unwrap()
        .chat("", "remember that tea beats coffee", RecordingListener::new())
        .await
        .unwrap();

    let raw = store.get(MEMORY_KEY).unwrap().unwrap();
    let persisted: Vec<MemoryItem> = serde_json::from_str(&raw).unwrap();
    let contents: Vec<&str> = persisted.iter().map(|m| m.content.as_str()).collect();
    assert!(
        contents.iter().any(|c| c.contains("Paris")),
        "openrouter conversation was overwritten: {contents:?}"
    );
    assert!(contents.contains(&"tea beats coffee"));
}
