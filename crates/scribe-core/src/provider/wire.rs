//! Decoding of OpenAI-style streaming chunks.
//!
//! Vendors disagree on where the text of a chunk lives, so the decoder
//! tries, in order: `delta.content`, `delta.text`, `choices[0].text`,
//! `choices[0].content`, `choices[0].message.content`.

use serde_json::Value;

use crate::error::{Result, ScribeError};
use crate::types::{ChatMessage, MessageStatus};

/// The fields of one SSE chunk the core actually reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendorChunk {
    /// Text carried by the chunk, if any.
    pub content: Option<String>,
    /// `choices[0].finish_reason`.
    pub finish_reason: Option<String>,
    /// Message of an in-band `{error: {...}}` object.
    pub error: Option<String>,
    /// `usage.total_tokens`, when the vendor reports it.
    pub total_tokens: Option<u64>,
}

impl VendorChunk {
    /// `"stop"` closes the turn; any other reason (or none) continues it.
    pub fn status(&self) -> MessageStatus {
        match self.finish_reason.as_deref() {
            Some("stop") => MessageStatus::Final,
            _ => MessageStatus::Continue,
        }
    }

    /// Translate into a listener message.  `None` when the chunk carries
    /// neither text nor a stop signal.
    pub fn into_message(self, index: u32) -> Option<ChatMessage> {
        let status = self.status();
        match self.content {
            Some(content) => Some(ChatMessage::assistant(content, index, status)),
            None if status == MessageStatus::Final => {
                Some(ChatMessage::assistant(String::new(), index, status))
            }
            None => None,
        }
    }
}

/// Parse one `data:` payload.
pub fn parse_chunk(data: &str) -> Result<VendorChunk> {
    let v: Value = serde_json::from_str(data).map_err(|e| ScribeError::Parse {
        reason: format!("invalid JSON in SSE data: {e}"),
    })?;

    if let Some(error) = v.get("error").filter(|e| !e.is_null()) {
        let message = error["message"]
            .as_str()
            .or_else(|| error.as_str())
            .map(String::from)
            .unwrap_or_else(|| error.to_string());
        return Ok(VendorChunk {
            error: Some(message),
            ..VendorChunk::default()
        });
    }

    let choice = &v["choices"][0];
    let content = [
        &choice["delta"]["content"],
        &choice["delta"]["text"],
        &choice["text"],
        &choice["content"],
        &choice["message"]["content"],
    ]
    .into_iter()
    .find_map(Value::as_str)
    .map(String::from);

    Ok(VendorChunk {
        content,
        finish_reason: choice["finish_reason"].as_str().map(String::from),
        error: None,
        total_tokens: v["usage"]["total_tokens"].as_u64(),
    })
}
