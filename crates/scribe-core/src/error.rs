//! Core error types.
//!
//! Every subsystem of the crate surfaces failures through [`ScribeError`].
//! Only transport failures ever reach a caller as an explicit error; the
//! other variants are recovered locally (see the resilient agent client)
//! but still need a typed representation for logging.

/// Unified error type for providers, transport, storage and configuration.
#[derive(Debug, thiserror::Error)]
pub enum ScribeError {
    // -- Transport errors ----------------------------------------------------
    /// The vendor answered with a non-success HTTP status.
    #[error("API returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The HTTP request could not be sent or completed.
    #[error("request failed: {reason}")]
    Request { reason: String },

    /// The streaming body was interrupted or produced invalid bytes.
    #[error("stream error: {reason}")]
    Stream { reason: String },

    /// A vendor payload could not be parsed.
    #[error("parse error: {reason}")]
    Parse { reason: String },

    /// The vendor reported an in-band error inside the stream.
    #[error("vendor error: {message}")]
    Vendor { message: String },

    // -- Provider errors -----------------------------------------------------
    /// No adapter is known for the given provider name.
    #[error("unknown provider: {name}")]
    UnknownProvider { name: String },

    /// The provider needs an explicit endpoint and none was configured.
    #[error("provider `{provider}` requires an endpoint")]
    MissingEndpoint { provider: String },

    /// A caller-supplied URL resolver failed.
    #[error("url resolution failed: {reason}")]
    UrlResolution { reason: String },

    // -- Local subsystems ----------------------------------------------------
    /// The key-value storage port failed.
    #[error("storage error: {reason}")]
    Storage { reason: String },

    /// A tool handler could not complete.
    #[error("tool `{tool}` failed: {reason}")]
    Tool { tool: String, reason: String },

    /// Configuration loading or validation failed.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScribeError>;

impl From<reqwest::Error> for ScribeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            reason: err.to_string(),
        }
    }
}

impl ScribeError {
    /// The human-readable text a quota classifier should inspect.
    ///
    /// For HTTP failures this is the response body; for in-band vendor
    /// errors it is the vendor message; otherwise the display string.
    pub fn vendor_text(&self) -> String {
        match self {
            Self::HttpStatus { body, .. } => body.clone(),
            Self::Vendor { message } => message.clone(),
            other => other.to_string(),
        }
    }
}
