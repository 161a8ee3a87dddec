//! ABOUTME: Model-prefix router selecting a provider for each request
//! ABOUTME: Longest matching prefix wins; retries transient failures with exponential backoff

use crate::provider::{CompletionRequest, ProviderInstance};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::llm::LlmResponse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Default prefix map. Callers may override the whole table.
pub const DEFAULT_ROUTES: &[(&str, &str)] = &[
    ("ft:gpt-", "openai"),
    ("gpt-", "openai"),
    ("o1", "openai"),
    ("o3", "openai"),
    ("claude-", "anthropic"),
];

/// Provider-call retry policy: base 1s, factor 2, at most 3 attempts.
const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Routes completion requests to registered providers by model-name prefix.
///
/// The route with the longest matching prefix wins; declaration order
/// breaks ties. A model that matches no prefix falls back to the default
/// provider. A matching route whose provider was never registered is a
/// configuration error, never a silent fallback.
pub struct ProviderRouter {
    routes: RwLock<Vec<(String, String)>>,
    providers: RwLock<HashMap<String, Arc<dyn ProviderInstance>>>,
    default_provider: RwLock<Option<String>>,
}

impl ProviderRouter {
    /// Router with the default prefix table and no providers yet
    pub fn new() -> Self {
        let routes = DEFAULT_ROUTES
            .iter()
            .map(|(prefix, name)| ((*prefix).to_string(), (*name).to_string()))
            .collect();
        Self {
            routes: RwLock::new(routes),
            providers: RwLock::new(HashMap::new()),
            default_provider: RwLock::new(None),
        }
    }

    /// Replace the entire prefix table
    pub async fn set_routes(&self, routes: Vec<(String, String)>) {
        *self.routes.write().await = routes;
    }

    /// Register a provider under its name. The first registered provider
    /// becomes the default until `set_default_provider` says otherwise.
    pub async fn register(&self, provider: Arc<dyn ProviderInstance>) {
        let name = provider.name().to_string();
        self.providers.write().await.insert(name.clone(), provider);
        let mut default = self.default_provider.write().await;
        if default.is_none() {
            *default = Some(name);
        }
    }

    pub async fn set_default_provider(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.providers.read().await.contains_key(&name) {
            return Err(LoomError::configuration(format!(
                "cannot set default: provider '{name}' is not registered"
            )));
        }
        *self.default_provider.write().await = Some(name);
        Ok(())
    }

    pub async fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select the provider for a model name.
    pub async fn resolve(&self, model: &str) -> Result<Arc<dyn ProviderInstance>> {
        let routes = self.routes.read().await;
        let matched = routes
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, name)| name.clone());
        drop(routes);

        let providers = self.providers.read().await;
        if let Some(name) = matched {
            return providers.get(&name).cloned().ok_or_else(|| {
                LoomError::configuration(format!(
                    "model '{model}' routes to provider '{name}', which is not registered"
                ))
            });
        }

        let default = self.default_provider.read().await;
        let name = default.as_ref().ok_or_else(|| {
            LoomError::configuration(format!(
                "model '{model}' matches no route and no default provider is configured"
            ))
        })?;
        providers.get(name).cloned().ok_or_else(|| {
            LoomError::configuration(format!("default provider '{name}' is not registered"))
        })
    }

    /// Dispatch a completion request, retrying transient provider errors
    /// with exponential backoff.
    pub async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse> {
        let provider = self.resolve(&request.model).await?;
        debug!(model = %request.model, provider = provider.name(), "dispatching completion");

        let mut delay = RETRY_BASE_DELAY;
        let mut last_error = None;
        for attempt in 1..=RETRY_MAX_ATTEMPTS {
            match provider.complete(request).await {
                Ok(response) => return Ok(response),
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => {
                    warn!(
                        model = %request.model,
                        provider = provider.name(),
                        attempt,
                        error = %err,
                        "provider call failed"
                    );
                    last_error = Some(err);
                    if attempt < RETRY_MAX_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(last_error.expect("at least one attempt was made"))
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;
    use agentloom_core::types::llm::ChatMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        name: String,
        fail_times: u32,
        calls: AtomicU32,
        retriable: bool,
    }

    #[async_trait]
    impl ProviderInstance for FlakyProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<LlmResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(LoomError::Provider {
                    message: "synthetic failure".into(),
                    provider: Some(self.name.clone()),
                    retriable: self.retriable,
                });
            }
            Ok(LlmResponse {
                content: "recovered".into(),
                model: request.model.clone(),
                prompt_tokens: 1,
                completion_tokens: 1,
            })
        }

        fn list_models(&self) -> Vec<String> {
            vec![]
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    async fn router_with(names: &[&str]) -> ProviderRouter {
        let router = ProviderRouter::new();
        for name in names {
            router
                .register(Arc::new(MockProvider::named(*name)))
                .await;
        }
        router
    }

    #[tokio::test]
    async fn test_prefix_dispatch() {
        let router = router_with(&["openai", "anthropic", "local"]).await;
        router.set_default_provider("local").await.unwrap();

        assert_eq!(router.resolve("gpt-4o").await.unwrap().name(), "openai");
        assert_eq!(router.resolve("o1-mini").await.unwrap().name(), "openai");
        assert_eq!(
            router.resolve("claude-sonnet-4").await.unwrap().name(),
            "anthropic"
        );
        // No prefix match falls back to the default
        assert_eq!(router.resolve("llama-3").await.unwrap().name(), "local");
    }

    #[tokio::test]
    async fn test_longest_prefix_wins() {
        let router = router_with(&["openai", "tuned"]).await;
        router
            .set_routes(vec![
                ("gpt-".into(), "openai".into()),
                ("gpt-4-custom".into(), "tuned".into()),
            ])
            .await;
        assert_eq!(
            router.resolve("gpt-4-custom-v2").await.unwrap().name(),
            "tuned"
        );
        assert_eq!(router.resolve("gpt-4o").await.unwrap().name(), "openai");
    }

    #[tokio::test]
    async fn test_mapped_but_missing_provider_is_an_error() {
        // Route exists for claude- but only openai is registered
        let router = router_with(&["openai"]).await;
        let err = router.resolve("claude-sonnet-4").await.err().unwrap();
        assert!(err.to_string().contains("not registered"));
    }

    #[tokio::test]
    async fn test_no_default_configured() {
        let router = ProviderRouter::new();
        let err = router.resolve("llama-3").await.err().unwrap();
        assert!(err.to_string().contains("no default provider"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_transient_failures() {
        let router = ProviderRouter::new();
        let flaky = Arc::new(FlakyProvider {
            name: "flaky".into(),
            fail_times: 2,
            calls: AtomicU32::new(0),
            retriable: true,
        });
        router.register(flaky.clone()).await;

        let request = CompletionRequest::new(vec![ChatMessage::user("hi")], "anything");
        let response = router.complete(&request).await.unwrap();
        assert_eq!(response.content, "recovered");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let router = ProviderRouter::new();
        let flaky = Arc::new(FlakyProvider {
            name: "flaky".into(),
            fail_times: 10,
            calls: AtomicU32::new(0),
            retriable: true,
        });
        router.register(flaky.clone()).await;

        let request = CompletionRequest::new(vec![ChatMessage::user("hi")], "anything");
        assert!(router.complete(&request).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_skip_retry() {
        let router = ProviderRouter::new();
        let flaky = Arc::new(FlakyProvider {
            name: "strict".into(),
            fail_times: 10,
            calls: AtomicU32::new(0),
            retriable: false,
        });
        router.register(flaky.clone()).await;

        let request = CompletionRequest::new(vec![ChatMessage::user("hi")], "anything");
        assert!(router.complete(&request).await.is_err());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }
}
