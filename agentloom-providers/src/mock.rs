//! ABOUTME: Mock provider for tests and dry development
//! ABOUTME: Looks up preset responses by the last user message; echoes otherwise

use crate::provider::{CompletionRequest, ProviderInstance};
use agentloom_core::error::Result;
use agentloom_core::types::llm::LlmResponse;
use async_trait::async_trait;
use std::collections::HashMap;

/// A provider whose `complete()` answers from a preset key→response table
/// keyed by the last user message, falling back to an echo of that message.
/// Swapping this in for a real provider leaves every other code path
/// untouched.
pub struct MockProvider {
    name: String,
    responses: HashMap<String, String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: HashMap::new(),
        }
    }

    /// Preset the response returned when the last user message equals `key`
    pub fn with_response(mut self, key: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(key.into(), response.into());
        self
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

// Deterministic stand-in for real token accounting
fn approx_tokens(text: &str) -> u32 {
    (text.len() / 4) as u32
}

#[async_trait]
impl ProviderInstance for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse> {
        let prompt = request.last_user_message().unwrap_or_default();
        let content = self
            .responses
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| prompt.to_string());

        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        Ok(LlmResponse {
            completion_tokens: approx_tokens(&content),
            prompt_tokens: (prompt_chars / 4) as u32,
            content,
            model: request.model.clone(),
        })
    }

    fn list_models(&self) -> Vec<String> {
        vec!["mock-model".to_string()]
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::types::llm::ChatMessage;

    #[tokio::test]
    async fn test_preset_lookup() {
        let provider = MockProvider::new().with_response("ping", "pong");
        let request = CompletionRequest::new(
            vec![ChatMessage::system("be terse"), ChatMessage::user("ping")],
            "mock-model",
        );
        let response = provider.complete(&request).await.unwrap();
        assert_eq!(response.content, "pong");
        assert_eq!(response.model, "mock-model");
    }

    #[tokio::test]
    async fn test_echo_fallback() {
        let provider = MockProvider::new();
        let request =
            CompletionRequest::new(vec![ChatMessage::user("no preset for this")], "mock-model");
        let response = provider.complete(&request).await.unwrap();
        assert_eq!(response.content, "no preset for this");
    }

    #[tokio::test]
    async fn test_uses_last_user_message() {
        let provider = MockProvider::new().with_response("second", "matched");
        let request = CompletionRequest::new(
            vec![
                ChatMessage::user("first"),
                ChatMessage::assistant("reply"),
                ChatMessage::user("second"),
            ],
            "mock-model",
        );
        let response = provider.complete(&request).await.unwrap();
        assert_eq!(response.content, "matched");
    }
}
