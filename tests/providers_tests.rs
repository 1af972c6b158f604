//! External tests for providers module: wire serialization and chunk
//! parsing for Gemini and Groq, plus display implementations.

use reqwest::Client;
use turnstream::conversation::Role;
use turnstream::gemini::{self, GeminiAdapter};
use turnstream::groq::{self, GroqAdapter};
use turnstream::providers::*;
use turnstream::ChatError;

fn request_with_history() -> GenerationRequest {
    GenerationRequest {
        prompt: "and in French?".to_string(),
        context: vec![
            ContextTurn { role: Role::User, content: "say hello".to_string() },
            ContextTurn { role: Role::Assistant, content: "Hello!".to_string() },
        ],
        system_prompt: Some("Be brief.".to_string()),
    }
}

// -- Provider display tests -----------------------------------------------

#[test]
fn test_provider_display_gemini() {
    assert_eq!(Provider::Gemini.to_string(), "gemini");
}

#[test]
fn test_provider_display_groq() {
    assert_eq!(Provider::Groq.to_string(), "groq");
}

#[test]
fn test_provider_display_is_lowercase() {
    for p in [Provider::Gemini, Provider::Groq] {
        assert!(p.to_string().chars().all(|c| c.is_lowercase()));
    }
}

#[test]
fn test_provider_display_names() {
    assert_eq!(Provider::Gemini.display_name(), "Gemini");
    assert_eq!(Provider::Groq.display_name(), "Llama");
}

#[test]
fn test_provider_serde_matches_display() {
    for p in [Provider::Gemini, Provider::Groq] {
        let json = serde_json::to_string(&p).expect("serialization failed");
        assert_eq!(json, format!("\"{p}\""));
    }
}

// -- Gemini request serialization -----------------------------------------

#[test]
fn test_gemini_request_serializes_camel_case() {
    let adapter = GeminiAdapter::new(Client::new(), "k".into(), "gemini-1.5-flash".into(), 0.7);
    let json = serde_json::to_value(adapter.request_body(&request_with_history()))
        .expect("serialization failed");

    let contents = json["contents"].as_array().expect("contents");
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[0]["role"], "user");
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Hello!");
    assert_eq!(contents[2]["parts"][0]["text"], "and in French?");

    assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be brief.");
    assert!(json["systemInstruction"].get("role").is_none());
    assert!(json["generationConfig"]["temperature"].is_number());
}

#[test]
fn test_gemini_request_without_system_prompt_omits_field() {
    let adapter = GeminiAdapter::new(Client::new(), "k".into(), "gemini-1.5-flash".into(), 0.7);
    let json = serde_json::to_value(adapter.request_body(&GenerationRequest::new("hi")))
        .expect("serialization failed");
    assert!(json.get("systemInstruction").is_none());
    assert_eq!(json["contents"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_gemini_stream_endpoint_requests_sse() {
    let adapter = GeminiAdapter::new(Client::new(), "k".into(), "models/gemini-pro".into(), 0.7)
        .with_base_url("http://localhost:9000/");
    assert_eq!(
        adapter.endpoint("streamGenerateContent"),
        "http://localhost:9000/v1beta/models/gemini-pro:streamGenerateContent?alt=sse"
    );
    assert_eq!(adapter.model(), "gemini-pro");
    assert_eq!(adapter.kind(), Provider::Gemini);
}

// -- Gemini response parsing ----------------------------------------------

#[test]
fn test_gemini_chunk_text_joins_parts() {
    let payload = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}]}"#;
    assert_eq!(gemini::chunk_text(payload).expect("chunk"), "Hello");
}

#[test]
fn test_gemini_chunk_text_usage_trailer_is_empty() {
    let payload = r#"{"usageMetadata":{"promptTokenCount":3,"totalTokenCount":9}}"#;
    assert_eq!(gemini::chunk_text(payload).expect("chunk"), "");
}

#[test]
fn test_gemini_chunk_text_inline_error() {
    let payload = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
    match gemini::chunk_text(payload) {
        Err(ChatError::ProviderRejected { status, message }) => {
            assert_eq!(status, 429);
            assert!(message.contains("exhausted"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_gemini_blocked_prompt_is_rejected() {
    let payload = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
    match gemini::chunk_text(payload) {
        Err(ChatError::ProviderRejected { status: 400, message }) => {
            assert!(message.contains("SAFETY"))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_gemini_response_without_candidates_is_malformed() {
    let parsed: GeminiResponse = serde_json::from_str("{}").expect("deserialization failed");
    assert!(matches!(gemini::response_text(parsed), Err(ChatError::MalformedResponse(_))));
}

#[test]
fn test_gemini_chunk_text_rejects_garbage() {
    assert!(matches!(gemini::chunk_text("not json"), Err(ChatError::MalformedResponse(_))));
}

// -- Groq request serialization -------------------------------------------

#[test]
fn test_groq_request_message_order() {
    let adapter = GroqAdapter::new(Client::new(), "k".into(), "llama-3.1-8b-instant".into(), 0.5);
    let json = serde_json::to_value(adapter.request_body(&request_with_history(), true))
        .expect("serialization failed");

    assert_eq!(json["model"], "llama-3.1-8b-instant");
    assert_eq!(json["stream"], true);
    let roles: Vec<&str> = json["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter_map(|m| m["role"].as_str())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(json["messages"][3]["content"], "and in French?");
}

#[test]
fn test_groq_single_shot_request_disables_stream() {
    let adapter = GroqAdapter::new(Client::new(), "k".into(), "llama-3.1-8b-instant".into(), 0.5);
    let json = serde_json::to_value(adapter.request_body(&GenerationRequest::new("hi"), false))
        .expect("serialization failed");
    assert_eq!(json["stream"], false);
    assert_eq!(json["messages"].as_array().map(Vec::len), Some(1));
}

// -- Groq chunk parsing ---------------------------------------------------

#[test]
fn test_groq_chunk_text_delta() {
    let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#;
    assert_eq!(groq::chunk_text(payload).expect("chunk"), "Hi");
}

#[test]
fn test_groq_chunk_text_role_only_is_empty() {
    let payload = r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
    assert_eq!(groq::chunk_text(payload).expect("chunk"), "");
}

#[test]
fn test_groq_chunk_text_inline_error() {
    let payload = r#"{"error":{"message":"model overloaded","type":"server_error"}}"#;
    assert!(matches!(
        groq::chunk_text(payload),
        Err(ChatError::ProviderUnavailable(m)) if m == "model overloaded"
    ));
}

#[test]
fn test_groq_chat_response_deserializes() {
    let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"4"},"finish_reason":"stop"}]}"#;
    let parsed: GroqChatResponse = serde_json::from_str(body).expect("deserialization failed");
    assert_eq!(parsed.choices[0].message.content.as_deref(), Some("4"));
}

// -- Vendor error bodies --------------------------------------------------

#[test]
fn test_api_error_message_prefers_message() {
    let body = r#"{"error":{"code":401,"message":"API key not valid","status":"UNAUTHENTICATED"}}"#;
    assert_eq!(api_error_message(body), "API key not valid");
}

#[test]
fn test_api_error_message_falls_back_to_body() {
    assert_eq!(api_error_message("Bad Gateway"), "Bad Gateway");
}
