//! Streaming transport for server-sent-event chat completions.
//!
//! The [`SseClient`] issues one POST per [`SseClient::start`], splits the
//! streamed body into lines, and hands every `data:` payload (except the
//! `[DONE]` sentinel) to a caller-supplied [`SseHandler`].  The actual HTTP
//! work sits behind the [`HttpBackend`] trait so tests can script vendor
//! responses without a network; [`ReqwestBackend`] is the production one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::future::{AbortHandle, Abortable};
use futures::stream::BoxStream;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, trace, warn};

use crate::error::{Result, ScribeError};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Prefix of every SSE line that carries a payload.
pub const DATA_MARKER: &str = "data:";

/// Payload that terminates an OpenAI-style stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Connect timeout for the production HTTP client.  The read side has no
/// timeout; callers cancel through [`SseClient::stop`].
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// A raw response body delivered in network-sized chunks.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// One outbound streaming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Opens a streaming POST.  A non-success status must be reported as
/// [`ScribeError::HttpStatus`] carrying the response body.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn post_stream(&self, request: &SseRequest) -> Result<ByteStream>;
}

/// [`HttpBackend`] on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    http: reqwest::Client,
}

impl ReqwestBackend {
    /// Build a backend with the default client settings.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ScribeError::Request {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn post_stream(&self, request: &SseRequest) -> Result<ByteStream> {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ScribeError::Request {
                    reason: format!("invalid header name `{name}`: {e}"),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| ScribeError::Request {
                reason: format!("invalid value for header `{name}`: {e}"),
            })?;
            headers.insert(header_name, header_value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!(url = %request.url, "opening SSE stream");

        let resp = self
            .http
            .post(&request.url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScribeError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let stream = resp.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ScribeError::Stream {
                    reason: format!("stream read error: {e}"),
                })
        });
        Ok(stream.boxed())
    }
}

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// What the transport should do after a payload was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop reading; the stream ends with [`StreamEnd::Handler`].
    Stop,
}

/// Why a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The `[DONE]` sentinel arrived.
    Sentinel,
    /// The body ended without a sentinel.
    Eof,
    /// The handler asked to stop.
    Handler,
    /// [`SseClient::stop`] aborted the request.
    Cancelled,
    /// The request or the body failed.
    Failed,
}

/// Caller-supplied decoder for `data:` payloads.
#[async_trait]
pub trait SseHandler: Send {
    /// Decode one payload.  An `Err` is logged and the line skipped.
    async fn on_data(&mut self, data: &str) -> Result<Flow>;

    /// Called exactly once per [`SseClient::start`].
    fn on_stop(&mut self, _end: StreamEnd) {}
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A configured, restartable SSE request.
pub struct SseClient {
    backend: Arc<dyn HttpBackend>,
    url: String,
    headers: Vec<(String, String)>,
    abort: Mutex<Option<AbortHandle>>,
}

impl SseClient {
    pub fn new(
        backend: Arc<dyn HttpBackend>,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            backend,
            url: url.into(),
            headers,
            abort: Mutex::new(None),
        }
    }

    /// POST `payload` and feed the streamed lines to `handler` until the
    /// stream ends.
    ///
    /// `handler.on_stop` fires exactly once, whatever the outcome.  A
    /// cancelled stream returns `Ok(StreamEnd::Cancelled)`; request and body
    /// failures are returned as errors.
    pub async fn start(&self, payload: String, handler: &mut dyn SseHandler) -> Result<StreamEnd> {
        let (handle, registration) = AbortHandle::new_pair();
        *self.abort.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        let request = SseRequest {
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: payload,
        };

        let outcome = Abortable::new(
            pump(self.backend.as_ref(), &request, &mut *handler),
            registration,
        )
        .await;

        self.abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let result = match outcome {
            Ok(result) => result,
            Err(_aborted) => {
                debug!(url = %self.url, "SSE stream cancelled");
                Ok(StreamEnd::Cancelled)
            }
        };

        let end = match &result {
            Ok(end) => *end,
            Err(_) => StreamEnd::Failed,
        };
        handler.on_stop(end);
        result
    }

    /// Abort the in-flight request.  No-op when idle; safe to repeat.
    pub fn stop(&self) {
        let handle = self
            .abort
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for SseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// Drive one request to completion.
async fn pump(
    backend: &dyn HttpBackend,
    request: &SseRequest,
    handler: &mut dyn SseHandler,
) -> Result<StreamEnd> {
    let mut stream = backend.post_stream(request).await?;
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        lines.extend(&chunk?);
        while let Some(line) = lines.next_line() {
            if let Some(end) = dispatch_line(&line, handler).await {
                return Ok(end);
            }
        }
    }

    if let Some(line) = lines.finish() {
        if let Some(end) = dispatch_line(&line, handler).await {
            return Ok(end);
        }
    }

    Ok(StreamEnd::Eof)
}

/// Route one complete line.  Returns `Some` when the stream should end.
async fn dispatch_line(line: &str, handler: &mut dyn SseHandler) -> Option<StreamEnd> {
    let Some(data) = line.strip_prefix(DATA_MARKER) else {
        if !line.is_empty() {
            trace!(line, "ignoring non-data SSE line");
        }
        return None;
    };

    let data = data.trim();
    if data == DONE_SENTINEL {
        return Some(StreamEnd::Sentinel);
    }
    if data.is_empty() {
        return None;
    }

    match handler.on_data(data).await {
        Ok(Flow::Continue) => None,
        Ok(Flow::Stop) => Some(StreamEnd::Handler),
        Err(e) => {
            warn!(error = %e, "skipping undecodable SSE line");
            None
        }
    }
}

/// Reassembles lines that span network chunks.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pop the next complete line, without its terminator.
    fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        Some(into_line(line))
    }

    /// Whatever is left after the body ended.
    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        Some(into_line(std::mem::take(&mut self.pending)))
    }
}

fn into_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays fixed chunks, or fails with a fixed status.
    struct FixedBackend {
        chunks: Vec<&'static str>,
        status: Option<(u16, &'static str)>,
    }

    #[async_trait]
    impl HttpBackend for FixedBackend {
        async fn post_stream(&self, _request: &SseRequest) -> Result<ByteStream> {
            if let Some((status, body)) = self.status {
                return Err(ScribeError::HttpStatus {
                    status,
                    body: body.into(),
                });
            }
            let chunks: Vec<Result<Vec<u8>>> = self
                .chunks
                .iter()
                .map(|c| Ok(c.as_bytes().to_vec()))
                .collect();
            Ok(futures::stream::iter(chunks).boxed())
        }
    }

    /// Never yields a byte; used for cancellation.
    struct PendingBackend;

    #[async_trait]
    impl HttpBackend for PendingBackend {
        async fn post_stream(&self, _request: &SseRequest) -> Result<ByteStream> {
            Ok(futures::stream::pending().boxed())
        }
    }

    #[derive(Default)]
    struct Collect {
        payloads: Vec<String>,
        stops: Vec<StreamEnd>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SseHandler for Collect {
        async fn on_data(&mut self, data: &str) -> Result<Flow> {
            if self.fail_on == Some(data) {
                return Err(ScribeError::Parse {
                    reason: "bad".into(),
                });
            }
            self.payloads.push(data.to_owned());
            Ok(Flow::Continue)
        }

        fn on_stop(&mut self, end: StreamEnd) {
            self.stops.push(end);
        }
    }

    fn client(backend: impl HttpBackend + 'static) -> SseClient {
        SseClient::new(Arc::new(backend), "http://test/chat", Vec::new())
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let sse = client(FixedBackend {
            chunks: vec!["data: {\"a\"", ":1}\r\n\ndata: {\"b\":2}\n", "data: [DONE]\n"],
            status: None,
        });
        let mut handler = Collect::default();

        let end = sse.start("{}".into(), &mut handler).await.unwrap();

        assert_eq!(end, StreamEnd::Sentinel);
        assert_eq!(handler.payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
        assert_eq!(handler.stops, vec![StreamEnd::Sentinel]);
    }

    #[tokio::test]
    async fn decode_failures_are_skipped() {
        let sse = client(FixedBackend {
            chunks: vec!["data: bad\ndata: good\n: keepalive\nevent: x\n"],
            status: None,
        });
        let mut handler = Collect {
            fail_on: Some("bad"),
            ..Collect::default()
        };

        let end = sse.start("{}".into(), &mut handler).await.unwrap();

        assert_eq!(end, StreamEnd::Eof);
        assert_eq!(handler.payloads, vec!["good"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_delivered() {
        let sse = client(FixedBackend {
            chunks: vec!["data: last"],
            status: None,
        });
        let mut handler = Collect::default();
        sse.start("{}".into(), &mut handler).await.unwrap();
        assert_eq!(handler.payloads, vec!["last"]);
    }

    #[tokio::test]
    async fn http_failure_still_stops_once() {
        let sse = client(FixedBackend {
            chunks: Vec::new(),
            status: Some((500, "boom")),
        });
        let mut handler = Collect::default();

        let err = sse.start("{}".into(), &mut handler).await.unwrap_err();

        assert!(matches!(err, ScribeError::HttpStatus { status: 500, .. }));
        assert_eq!(handler.stops, vec![StreamEnd::Failed]);
    }

    #[tokio::test]
    async fn stop_cancels_in_flight_stream() {
        let sse = Arc::new(client(PendingBackend));
        let stopper = Arc::clone(&sse);
        let task = tokio::spawn(async move {
            let mut handler = Collect::default();
            let end = stopper.start("{}".into(), &mut handler).await.unwrap();
            (end, handler.stops)
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        sse.stop();
        sse.stop();

        let (end, stops) = task.await.unwrap();
        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(stops, vec![StreamEnd::Cancelled]);
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let sse = client(PendingBackend);
        sse.stop();
    }
}
