//! ABOUTME: OpenAI-compatible chat-completions adapter over HTTP
//! ABOUTME: Works against any endpoint speaking the /chat/completions dialect

use crate::provider::{CompletionRequest, ProviderInstance};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::llm::LlmResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Provider speaking the OpenAI chat-completions wire dialect, which most
/// hosted and self-hosted gateways accept.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: Option<String>,
    models: Vec<String>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            models: Vec::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn provider_error(name: &str, message: impl Into<String>, retriable: bool) -> LoomError {
    LoomError::Provider {
        message: message.into(),
        provider: Some(name.to_string()),
        retriable,
    }
}

#[async_trait]
impl ProviderInstance for OpenAiCompatProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = WireRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: match m.role {
                        agentloom_core::types::llm::ChatRole::System => "system",
                        agentloom_core::types::llm::ChatRole::User => "user",
                        agentloom_core::types::llm::ChatRole::Assistant => "assistant",
                    },
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(provider = %self.name, model = %request.model, url = %url, "sending completion request");

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| provider_error(&self.name, format!("transport error: {e}"), true))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Authentication and malformed-request errors never succeed on
            // retry; rate limits and server errors may.
            let retriable = status.as_u16() == 429 || status.is_server_error();
            return Err(provider_error(
                &self.name,
                format!("HTTP {status}: {text}"),
                retriable,
            ));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| provider_error(&self.name, format!("malformed response: {e}"), false))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| provider_error(&self.name, "response contained no choices", false))?;

        Ok(LlmResponse {
            content: choice.message.content,
            model: parsed.model.unwrap_or_else(|| request.model.clone()),
            prompt_tokens: parsed.usage.prompt_tokens,
            completion_tokens: parsed.usage.completion_tokens,
        })
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let provider = OpenAiCompatProvider::new("openai", "https://api.example.com/v1/");
        assert_eq!(provider.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_wire_request_shape() {
        let body = WireRequest {
            model: "gpt-4o",
            messages: vec![WireMessage {
                role: "user",
                content: "hi",
            }],
            temperature: Some(0.2),
            max_tokens: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_wire_response_parse() {
        let text = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2},
            "model": "gpt-4o-2024"
        }"#;
        let parsed: WireResponse = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.choices[0].message.content, "hello");
        assert_eq!(parsed.usage.prompt_tokens, 9);
    }
}
