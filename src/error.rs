//! Crate-level error type.
//!
//! The first three variants are the provider-side failures the accumulator
//! absorbs into a `failed` turn. The rest are raised to callers of the
//! controller and config layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport failure, timeout, or a 5xx from the vendor.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The vendor refused the request (credentials, quota, bad input).
    #[error("provider rejected request (HTTP {status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// The fragment stream failed after some text had already been published.
    #[error("stream interrupted after {received} fragment(s): {source}")]
    StreamInterrupted {
        received: usize,
        #[source]
        source: Box<ChatError>,
    },

    /// A body or SSE payload that could not be decoded.
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("{0} not set. Export it or pass via environment.")]
    MissingApiKey(&'static str),

    #[error("configuration error: {0}")]
    Config(String),

    /// A turn is still pending; the send-lock refuses new prompts.
    #[error("a reply is still in progress")]
    Busy,

    #[error("prompt is empty")]
    EmptyPrompt,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Classify an HTTP status and body returned by a vendor.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 {
            ChatError::ProviderUnavailable(format!("HTTP {status}: {message}"))
        } else {
            ChatError::ProviderRejected { status, message }
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ChatError::MalformedResponse(e.to_string());
        }
        match e.status() {
            Some(status) => ChatError::from_status(status.as_u16(), e.to_string()),
            None => ChatError::ProviderUnavailable(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::MalformedResponse(e.to_string())
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(e: toml::de::Error) -> Self {
        ChatError::Config(e.to_string())
    }
}
