//! ABOUTME: Provider abstraction and LLM routing for agentloom
//! ABOUTME: Dispatches by model-name prefix with retry and backoff

pub mod mock;
pub mod openai_compat;
pub mod provider;
pub mod router;

pub use mock::MockProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::{CompletionRequest, ProviderInstance};
pub use router::{ProviderRouter, DEFAULT_ROUTES};
