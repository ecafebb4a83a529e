//! Shared fixtures for the integration tests: a scripted HTTP backend and
//! recording listener / sink / store doubles.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Value, json};

use scribe_core::transport::ByteStream;
use scribe_core::{
    ChatListener, ChatMessage, DocumentSink, HttpBackend, InMemoryStore, KeyValueStore,
    MEMORY_KEY, MemoryBook, MessageStatus, OpenRouterAdapter, ProviderConfig, ResilienceConfig,
    ResilientAgentClient, Result, ScribeError, SseRequest, WriteOptions,
};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// One scripted response.
pub enum Reply {
    /// A successful streaming body, delivered in these network chunks.
    Stream(Vec<String>),
    /// A non-success status with a body.
    Status(u16, String),
    /// A body that never produces a byte.
    Pending,
}

/// Replays scripted replies in order and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<SseRequest>>,
}

impl ScriptedBackend {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<SseRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Request bodies parsed as JSON.
    pub fn bodies(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|r| serde_json::from_str(&r.body).unwrap())
            .collect()
    }
}

#[async_trait]
impl HttpBackend for ScriptedBackend {
    async fn post_stream(&self, request: &SseRequest) -> Result<ByteStream> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Stream(chunks)) => {
                let chunks: Vec<Result<Vec<u8>>> =
                    chunks.into_iter().map(|c| Ok(c.into_bytes())).collect();
                Ok(futures::stream::iter(chunks).boxed())
            }
            Some(Reply::Status(status, body)) => Err(ScribeError::HttpStatus { status, body }),
            Some(Reply::Pending) => Ok(futures::stream::pending().boxed()),
            None => Err(ScribeError::Request {
                reason: "script exhausted".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// SSE helpers
// ---------------------------------------------------------------------------

/// An OpenAI-style delta chunk.
pub fn delta(content: &str, finish_reason: Option<&str>) -> String {
    json!({
        "choices": [{ "delta": { "content": content }, "finish_reason": finish_reason }]
    })
    .to_string()
}

/// An in-band error chunk.
pub fn error_chunk(message: &str) -> String {
    json!({ "error": { "message": message } }).to_string()
}

/// `data:` lines for `payloads`, followed by the sentinel.
pub fn sse_body(payloads: &[String]) -> String {
    let mut body = String::new();
    for payload in payloads {
        body.push_str("data: ");
        body.push_str(payload);
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// A streamed reply of `parts` followed by a stop chunk, one network chunk
/// per line.
pub fn streamed(parts: &[&str]) -> Reply {
    let mut payloads: Vec<String> = parts.iter().map(|p| delta(p, None)).collect();
    payloads.push(delta("", Some("stop")));
    Reply::Stream(
        sse_body(&payloads)
            .split_inclusive("\n\n")
            .map(String::from)
            .collect(),
    )
}

pub const QUOTA_BODY: &str = concat!(
    r#"{"error":{"message":"Insufficient credits. "#,
    r#"Add more using https://openrouter.ai/credits","code":402}}"#
);

pub fn quota_reply() -> Reply {
    Reply::Status(402, QUOTA_BODY.to_owned())
}

// ---------------------------------------------------------------------------
// Recording doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingListener {
    starts: AtomicUsize,
    stops: AtomicUsize,
    messages: Mutex<Vec<ChatMessage>>,
}

impl ChatListener for RecordingListener {
    fn on_start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_message(&self, message: ChatMessage) {
        self.messages.lock().unwrap().push(message);
    }

    fn on_stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.content).collect()
    }

    pub fn last(&self) -> ChatMessage {
        self.messages().last().cloned().expect("no messages received")
    }

    /// One start/stop pair, non-decreasing indices, exactly one FINAL and
    /// it comes last.
    pub fn assert_complete_turn(&self) {
        assert_eq!(self.starts.load(Ordering::SeqCst), 1, "on_start count");
        assert_eq!(self.stops.load(Ordering::SeqCst), 1, "on_stop count");

        let messages = self.messages();
        assert!(!messages.is_empty(), "turn produced no messages");
        for pair in messages.windows(2) {
            assert!(pair[0].index <= pair[1].index, "indices went backwards");
        }
        let finals = messages.iter().filter(|m| m.is_final()).count();
        assert_eq!(finals, 1, "expected exactly one FINAL");
        assert_eq!(messages.last().unwrap().status, MessageStatus::Final);
    }
}

#[derive(Default)]
pub struct RecordingSink {
    text: Mutex<String>,
}

impl DocumentSink for RecordingSink {
    fn write(&self, text: &str, _options: &WriteOptions) -> bool {
        self.text.lock().unwrap().push_str(text);
        true
    }
}

impl RecordingSink {
    pub fn text(&self) -> String {
        self.text.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(InMemoryStore::new())
}

/// A resilient client without artificial delays, with memory loaded from
/// `store`.
pub fn resilient(
    backend: Arc<ScriptedBackend>,
    store: Arc<dyn KeyValueStore>,
    sink: Arc<dyn DocumentSink>,
    config: ProviderConfig,
) -> ResilientAgentClient {
    let memory = Arc::new(MemoryBook::load(Arc::clone(&store), MEMORY_KEY));
    ResilientAgentClient::new(
        "openrouter",
        OpenRouterAdapter::new(config),
        backend,
        store,
        sink,
        memory,
        ResilienceConfig::without_delays(),
    )
}
