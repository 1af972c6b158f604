//! Groq adapter over its OpenAI-compatible chat-completions endpoint.

use futures_util::future::BoxFuture;
use futures_util::TryStreamExt;
use reqwest::Client;
use tokio_stream::StreamExt;

use crate::error::ChatError;
use crate::providers::{
    check_status, FragmentStream, GenerationProvider, GenerationRequest, GroqChatMessage,
    GroqChatRequest, GroqChatResponse, GroqChunk, Provider,
};
use crate::sse::data_payloads;

pub const GROQ_BASE_URL: &str = "https://api.groq.com";

pub struct GroqAdapter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GroqAdapter {
    pub fn new(client: Client, api_key: String, model: String, temperature: f32) -> Self {
        GroqAdapter { client, api_key, model, base_url: GROQ_BASE_URL.to_string(), temperature }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/openai/v1/chat/completions", self.base_url)
    }

    pub fn request_body(&self, request: &GenerationRequest, stream: bool) -> GroqChatRequest {
        let mut messages = Vec::with_capacity(request.context.len() + 2);
        if let Some(sys) = &request.system_prompt {
            messages.push(GroqChatMessage { role: "system".to_string(), content: sys.clone() });
        }
        messages.extend(request.context.iter().map(|turn| GroqChatMessage {
            role: turn.role.to_string(),
            content: turn.content.clone(),
        }));
        messages.push(GroqChatMessage { role: "user".to_string(), content: request.prompt.clone() });

        GroqChatRequest { model: self.model.clone(), messages, stream, temperature: self.temperature }
    }

    fn post(&self, body: &GroqChatRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
    }
}

impl GenerationProvider for GroqAdapter {
    fn kind(&self) -> Provider {
        Provider::Groq
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(async move {
            let body = self.request_body(request, false);
            let response = check_status(self.post(&body).send().await?).await?;
            let text = response.text().await?;
            let parsed: GroqChatResponse = serde_json::from_str(&text)?;
            parsed
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content.unwrap_or_default())
                .ok_or_else(|| ChatError::MalformedResponse("Groq response has no choices".into()))
        })
    }

    fn generate_stream(&self, request: &GenerationRequest) -> FragmentStream {
        let pending = self.post(&self.request_body(request, true));

        let opened = async move {
            let response = check_status(pending.send().await?).await?;
            let fragments = data_payloads(Box::pin(response.bytes_stream()))
                .map(|payload| payload.and_then(|p| chunk_text(&p)));
            Ok::<FragmentStream, ChatError>(Box::pin(fragments))
        };

        Box::pin(futures_util::stream::once(opened).try_flatten())
    }
}

/// Delta text of one streamed chunk; empty for role-only and finish chunks.
pub fn chunk_text(payload: &str) -> Result<String, ChatError> {
    let chunk: GroqChunk = serde_json::from_str(payload)?;
    if let Some(err) = chunk.error {
        return Err(ChatError::ProviderUnavailable(
            err.message.or(err.error_type).unwrap_or_else(|| "stream error".to_string()),
        ));
    }
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(String::new());
    };
    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!("Groq reply cut off at the token limit");
    }
    Ok(choice.delta.content.unwrap_or_default())
}
