//! Text-understanding client.
//!
//! The pipeline talks to the service through the [`LlmProvider`] trait —
//! one system instruction, one user payload, one text response. The
//! concrete implementation is an OpenAI-compatible chat-completions
//! client; retries, rate limits, and model selection are the service's
//! configuration concern, not ours.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;

/// A single-turn completion provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one system instruction + user payload, get the raw text back.
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

/// Create the configured provider.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!(model = %config.model, "Using chat-completions provider");
    Arc::new(ChatCompletionsProvider::new(config.clone()))
}

// ── OpenAI-compatible client ────────────────────────────────────────

/// Extraction and matching run deterministic — keep sampling flat.
const COMPLETION_TEMPERATURE: f32 = 0.0;

/// Chat-completions client over reqwest.
pub struct ChatCompletionsProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl ChatCompletionsProvider {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: COMPLETION_TEMPERATURE,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            return Err(LlmError::RequestFailed {
                provider: self.config.model.clone(),
                reason: format!("HTTP {status}: {preview}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyResponse {
                provider: self.config.model.clone(),
            })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// ── Response cleanup ────────────────────────────────────────────────

/// Extract a JSON object from model output (handles markdown wrapping).
///
/// Returns `None` when no object bounds are present at all — callers
/// decide whether that is a schema failure.
pub fn extract_json_object(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed.to_string());
    }

    // Wrapped in a fenced code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner.to_string());
            }
        }
    }

    // Object bounds inside surrounding prose
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return Some(trimmed[start..=end].to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn test_config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: secrecy::SecretString::from("test-key"),
            model: "gpt-4o".to_string(),
        }
    }

    // ── extract_json_object ─────────────────────────────────────────

    #[test]
    fn bare_object_passes_through() {
        let raw = r#"{"items": []}"#;
        assert_eq!(extract_json_object(raw).as_deref(), Some(raw));
    }

    #[test]
    fn json_fence_stripped() {
        let raw = "```json\n{\"items\": []}\n```";
        assert_eq!(extract_json_object(raw).as_deref(), Some("{\"items\": []}"));
    }

    #[test]
    fn anonymous_fence_stripped() {
        let raw = "```\n{\"items\": []}\n```";
        assert_eq!(extract_json_object(raw).as_deref(), Some("{\"items\": []}"));
    }

    #[test]
    fn object_found_inside_prose() {
        let raw = "Here you go: {\"items\": []} — anything else?";
        assert_eq!(extract_json_object(raw).as_deref(), Some("{\"items\": []}"));
    }

    #[test]
    fn plain_prose_yields_none() {
        assert_eq!(extract_json_object("I could not find any products."), None);
        assert_eq!(extract_json_object(""), None);
    }

    // ── provider ────────────────────────────────────────────────────

    #[test]
    fn provider_reports_model_name() {
        let provider = ChatCompletionsProvider::new(test_config("http://localhost".into()));
        assert_eq!(provider.model_name(), "gpt-4o");
    }

    #[tokio::test]
    async fn complete_returns_first_choice_content() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(json!({
                "choices": [{"message": {"content": "{\"items\": []}"}}]
            }));
        });

        let provider = ChatCompletionsProvider::new(test_config(server.url("/v1")));
        let out = provider.complete("system", "user").await.unwrap();
        assert_eq!(out, "{\"items\": []}");
        mock.assert();
    }

    #[tokio::test]
    async fn complete_surfaces_http_error_with_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(429).body("rate limited");
        });

        let provider = ChatCompletionsProvider::new(test_config(server.url("/v1")));
        let err = provider.complete("system", "user").await.unwrap_err();
        match err {
            LlmError::RequestFailed { reason, .. } => {
                assert!(reason.contains("429"));
                assert!(reason.contains("rate limited"));
            }
            other => panic!("expected RequestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_empty_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({"choices": []}));
        });

        let provider = ChatCompletionsProvider::new(test_config(server.url("/v1")));
        let err = provider.complete("system", "user").await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
