//! ABOUTME: ProviderInstance trait every LLM backend implements

use agentloom_core::error::Result;
use agentloom_core::types::llm::{ChatMessage, LlmResponse};
use async_trait::async_trait;

/// A single completion request as the router hands it to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, model: impl Into<String>) -> Self {
        Self {
            messages,
            model: model.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Content of the last user message, used by mocks for response lookup
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == agentloom_core::types::llm::ChatRole::User)
            .map(|m| m.content.as_str())
    }
}

/// Trait for LLM provider implementations. Response content is opaque to
/// the engine beyond being text.
#[async_trait]
pub trait ProviderInstance: Send + Sync {
    /// Execute a completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse>;

    /// Models this provider is known to serve
    fn list_models(&self) -> Vec<String>;

    /// Provider name as registered with the router
    fn name(&self) -> &str;
}
