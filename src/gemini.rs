//! Google Gemini adapter (`generateContent` / `streamGenerateContent`).

use futures_util::future::BoxFuture;
use futures_util::TryStreamExt;
use reqwest::Client;
use tokio_stream::StreamExt;

use crate::conversation::Role;
use crate::error::ChatError;
use crate::providers::{
    check_status, FragmentStream, GeminiContent, GeminiGenerationConfig, GeminiRequest,
    GeminiResponse, GenerationProvider, GenerationRequest, Provider,
};
use crate::sse::data_payloads;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiAdapter {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GeminiAdapter {
    pub fn new(client: Client, api_key: String, model: String, temperature: f32) -> Self {
        GeminiAdapter {
            client,
            api_key,
            model: model.trim_start_matches("models/").to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            temperature,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self, method: &str) -> String {
        let url = format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method);
        if method == "streamGenerateContent" {
            format!("{url}?alt=sse")
        } else {
            url
        }
    }

    pub fn request_body(&self, request: &GenerationRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = request
            .context
            .iter()
            .map(|turn| GeminiContent::text(Some(gemini_role(turn.role)), &turn.content))
            .collect();
        contents.push(GeminiContent::text(Some("user"), &request.prompt));

        GeminiRequest {
            contents,
            system_instruction: request
                .system_prompt
                .as_deref()
                .map(|sys| GeminiContent::text(None, sys)),
            generation_config: GeminiGenerationConfig { temperature: self.temperature },
        }
    }

    fn post(&self, method: &str, body: &GeminiRequest) -> reqwest::RequestBuilder {
        self.client
            .post(self.endpoint(method))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
    }
}

impl GenerationProvider for GeminiAdapter {
    fn kind(&self) -> Provider {
        Provider::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate<'a>(
        &'a self,
        request: &'a GenerationRequest,
    ) -> BoxFuture<'a, Result<String, ChatError>> {
        Box::pin(async move {
            let body = self.request_body(request);
            let response = check_status(self.post("generateContent", &body).send().await?).await?;
            let text = response.text().await?;
            let parsed: GeminiResponse = serde_json::from_str(&text)?;
            response_text(parsed)
        })
    }

    fn generate_stream(&self, request: &GenerationRequest) -> FragmentStream {
        let pending = self.post("streamGenerateContent", &self.request_body(request));

        let opened = async move {
            let response = check_status(pending.send().await?).await?;
            let fragments = data_payloads(Box::pin(response.bytes_stream()))
                .map(|payload| payload.and_then(|p| chunk_text(&p)));
            Ok::<FragmentStream, ChatError>(Box::pin(fragments))
        };

        Box::pin(futures_util::stream::once(opened).try_flatten())
    }
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

/// Text of a complete `generateContent` reply.
pub fn response_text(response: GeminiResponse) -> Result<String, ChatError> {
    if let Some(err) = response.error {
        let message = err.message.or(err.status).unwrap_or_else(|| "unknown error".to_string());
        return Err(ChatError::from_status(error_code(&err.code), message));
    }
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        if response.candidates.is_empty() {
            return Err(ChatError::ProviderRejected {
                status: 400,
                message: format!("prompt blocked: {reason}"),
            });
        }
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::MalformedResponse("Gemini response missing candidate".into()))?;
    if let Some(reason) = candidate.finish_reason.as_deref().filter(|r| *r != "STOP") {
        tracing::warn!(reason, "Gemini stopped the reply early");
    }
    Ok(candidate.content.map(|c| c.joined_text()).unwrap_or_default())
}

/// Text carried by one `streamGenerateContent` SSE event; may be empty.
pub fn chunk_text(payload: &str) -> Result<String, ChatError> {
    let parsed: GeminiResponse = serde_json::from_str(payload)?;
    if parsed.candidates.is_empty() && parsed.error.is_none() && parsed.prompt_feedback.is_none() {
        // usage-only trailer
        return Ok(String::new());
    }
    response_text(parsed)
}

fn error_code(code: &Option<serde_json::Value>) -> u16 {
    code.as_ref()
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(500)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ContextTurn;

    fn adapter() -> GeminiAdapter {
        GeminiAdapter::new(Client::new(), "test-key".into(), "gemini-1.5-flash".into(), 0.7)
    }

    #[test]
    fn test_endpoint_single_shot() {
        assert_eq!(
            adapter().endpoint("generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_endpoint_stream_uses_sse() {
        assert!(adapter().endpoint("streamGenerateContent").ends_with(":streamGenerateContent?alt=sse"));
    }

    #[test]
    fn test_model_prefix_is_stripped() {
        let a = GeminiAdapter::new(Client::new(), "k".into(), "models/gemini-pro".into(), 0.7);
        assert_eq!(a.model(), "gemini-pro");
    }

    #[test]
    fn test_base_url_override_trims_slash() {
        let a = adapter().with_base_url("http://localhost:9000/");
        assert!(a.endpoint("generateContent").starts_with("http://localhost:9000/v1beta/"));
    }

    #[test]
    fn test_request_body_maps_roles_and_system() {
        let request = GenerationRequest {
            prompt: "and now?".into(),
            context: vec![
                ContextTurn { role: Role::User, content: "hi".into() },
                ContextTurn { role: Role::Assistant, content: "hello".into() },
            ],
            system_prompt: Some("Be brief.".into()),
        };
        let v = serde_json::to_value(adapter().request_body(&request)).expect("serialize");
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][1]["role"], "model");
        assert_eq!(v["contents"][2]["parts"][0]["text"], "and now?");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert!(v["systemInstruction"].get("role").is_none());
        assert!((v["generationConfig"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_request_body_without_system_omits_field() {
        let v = serde_json::to_value(adapter().request_body(&GenerationRequest::new("x"))).unwrap();
        assert!(v.get("systemInstruction").is_none());
    }

    #[test]
    fn test_chunk_text_joins_parts() {
        let json = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
        assert_eq!(chunk_text(json).unwrap(), "Hello");
    }

    #[test]
    fn test_chunk_text_usage_trailer_is_empty() {
        let json = r#"{"usageMetadata":{"promptTokenCount":3}}"#;
        assert_eq!(chunk_text(json).unwrap(), "");
    }

    #[test]
    fn test_chunk_text_candidate_without_content() {
        let json = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        assert_eq!(chunk_text(json).unwrap(), "");
    }

    #[test]
    fn test_safety_stop_keeps_text_received() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Partial"}]},"finishReason":"SAFETY"}]}"#;
        assert_eq!(chunk_text(json).unwrap(), "Partial");
    }

    #[test]
    fn test_chunk_text_invalid_json_is_malformed() {
        assert!(matches!(chunk_text("{oops"), Err(ChatError::MalformedResponse(_))));
    }

    #[test]
    fn test_blocked_prompt_is_rejected() {
        let json = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        match chunk_text(json) {
            Err(ChatError::ProviderRejected { message, .. }) => assert!(message.contains("SAFETY")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_inline_error_uses_code() {
        let json = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            chunk_text(json),
            Err(ChatError::ProviderRejected { status: 429, .. })
        ));
    }

    #[test]
    fn test_response_text_missing_candidate_is_malformed() {
        let parsed: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(response_text(parsed), Err(ChatError::MalformedResponse(_))));
    }
}
