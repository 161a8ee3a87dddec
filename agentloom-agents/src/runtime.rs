//! ABOUTME: Agent invocation: validate inputs, call the router under timeout, parse output

use crate::parser::parse_agent_output;
use crate::prompt::build_messages;
use agentloom_core::error::{LoomError, Result, TimeoutScope};
use agentloom_core::types::agent::AgentDefinition;
use agentloom_core::types::result::AgentResult;
use agentloom_providers::{CompletionRequest, ProviderRouter};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-invocation overrides.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Given an agent definition and an input map, produce an [`AgentResult`].
pub struct AgentRuntime {
    router: Arc<ProviderRouter>,
    default_model: String,
}

impl AgentRuntime {
    pub fn new(router: Arc<ProviderRouter>, default_model: impl Into<String>) -> Self {
        Self {
            router,
            default_model: default_model.into(),
        }
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    /// Invoke an agent. Validates required inputs before any provider call,
    /// retries up to `constraints.max_retries` extra attempts, and applies
    /// `constraints.timeout_seconds` around each call. Output parsing is
    /// total and never fails on its own.
    pub async fn invoke(
        &self,
        def: &AgentDefinition,
        inputs: &Map<String, Value>,
        options: InvokeOptions,
    ) -> Result<AgentResult> {
        let effective = def.resolve_inputs(inputs)?;
        let messages = build_messages(def, &effective)?;

        let model = options
            .model
            .unwrap_or_else(|| self.default_model.clone());
        let mut request = CompletionRequest::new(messages, model)
            .with_max_tokens(def.constraints.max_tokens);
        if let Some(temperature) = options.temperature {
            request = request.with_temperature(temperature);
        }

        let timeout = Duration::from_secs(def.constraints.timeout_seconds);
        let attempts = def.constraints.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(timeout, self.router.complete(&request)).await;
            let error = match outcome {
                Ok(Ok(response)) => {
                    let (parsed_output, branch) = parse_agent_output(def, &response.content);
                    debug!(agent = %def.name, ?branch, model = %response.model, "agent invocation complete");
                    let tokens_used = response.total_tokens();
                    return Ok(AgentResult {
                        parsed_output,
                        raw_response: response.content,
                        tokens_used,
                        model: response.model,
                    });
                }
                Ok(Err(err)) => err,
                Err(_) => LoomError::Timeout {
                    scope: TimeoutScope::Agent,
                    seconds: def.constraints.timeout_seconds,
                },
            };

            warn!(agent = %def.name, attempt, error = %error, "agent invocation failed");
            if !error.is_retriable() {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(LoomError::Agent {
            message: format!(
                "agent '{}' failed after {attempts} attempts: {}",
                def.name,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ),
            agent: Some(def.name.clone()),
        })
    }
}
