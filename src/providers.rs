use clap::ValueEnum;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::Stream;

use crate::config::ChatConfig;
use crate::conversation::Role;
use crate::error::ChatError;
use crate::gemini::GeminiAdapter;
use crate::groq::GroqAdapter;

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Groq,
}

impl Provider {
    /// Model used when neither the config file nor the command line names one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-1.5-flash",
            Provider::Groq => "llama-3.1-8b-instant",
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
        }
    }

    /// Label for assistant turns in the terminal UI.
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gemini => "Gemini",
            Provider::Groq => "Llama",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Gemini => write!(f, "gemini"),
            Provider::Groq => write!(f, "groq"),
        }
    }
}

// -- Generation seam ---------------------------------------------------------

/// One prior turn sent along as context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextTurn {
    pub role: Role,
    pub content: String,
}

/// Outbound prompt. Owned by the caller for one call only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub context: Vec<ContextTurn>,
    pub system_prompt: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        GenerationRequest { prompt: prompt.into(), ..Default::default() }
    }
}

/// Finite, non-restartable sequence of text fragments. An `Err` item ends it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// A remote text-generation API, single-shot or streaming.
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> Provider;

    fn model(&self) -> &str;

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<String, ChatError>>;

    /// Opening the connection happens lazily on first poll; a failure to
    /// connect arrives as the stream's first item.
    fn generate_stream(&self, request: &GenerationRequest) -> FragmentStream;
}

/// Build the adapter the config asks for, reading its key from the environment.
pub fn build_provider(config: &ChatConfig) -> Result<Box<dyn GenerationProvider>, ChatError> {
    let var = config.provider.api_key_env();
    let api_key = std::env::var(var)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(ChatError::MissingApiKey(var))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| ChatError::Config(format!("HTTP client: {e}")))?;

    let model = config.resolved_model();
    Ok(match config.provider {
        Provider::Gemini => {
            let mut adapter = GeminiAdapter::new(client, api_key, model, config.temperature);
            if let Some(base) = &config.base_url {
                adapter = adapter.with_base_url(base);
            }
            Box::new(adapter)
        }
        Provider::Groq => {
            let mut adapter = GroqAdapter::new(client, api_key, model, config.temperature);
            if let Some(base) = &config.base_url {
                adapter = adapter.with_base_url(base);
            }
            Box::new(adapter)
        }
    })
}

/// Turn a non-success HTTP response into the matching error.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::from_status(status.as_u16(), api_error_message(&body)))
}

/// Best human-readable message in a vendor error body; falls back to the raw body.
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(ApiErrorBody { error: Some(detail) }) => detail
            .message
            .or(detail.status)
            .or(detail.error_type)
            .unwrap_or_else(|| body.trim().to_string()),
        _ => body.trim().to_string(),
    }
}

// -- Vendor error body (shared by Gemini and Groq) ---------------------------

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    /// Numeric on Gemini, a string slug on Groq.
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    /// Gemini: `INVALID_ARGUMENT`, `RESOURCE_EXHAUSTED`, ...
    #[serde(default)]
    pub status: Option<String>,
    /// Groq: `invalid_request_error`, ...
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

// -- Gemini types ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn text(role: Option<&str>, text: &str) -> Self {
        GeminiContent {
            role: role.map(str::to_string),
            parts: vec![GeminiPart { text: Some(text.to_string()) }],
        }
    }

    /// All text parts joined, in order.
    pub fn joined_text(&self) -> String {
        self.parts.iter().filter_map(|p| p.text.as_deref()).collect()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    pub generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: Option<GeminiContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Body of `generateContent`, and of each `streamGenerateContent` SSE event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

// -- Groq (OpenAI-compatible) types ------------------------------------------

#[derive(Debug, Serialize)]
pub struct GroqChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct GroqChatRequest {
    pub model: String,
    pub messages: Vec<GroqChatMessage>,
    pub stream: bool,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct GroqDelta {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroqStreamChoice {
    pub delta: GroqDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroqChunk {
    #[serde(default)]
    pub choices: Vec<GroqStreamChoice>,
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct GroqResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GroqChoice {
    pub message: GroqResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct GroqChatResponse {
    #[serde(default)]
    pub choices: Vec<GroqChoice>,
}
