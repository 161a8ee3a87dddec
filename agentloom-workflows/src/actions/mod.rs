//! ABOUTME: Pluggable step handlers keyed by action kind
//! ABOUTME: New actions register against the table without touching the executor

mod conditional;
mod invoke_agent;
mod parallel_group;
mod run_command;
mod transform;
mod validate;
mod wait;

pub use conditional::ConditionalHandler;
pub use invoke_agent::InvokeAgentHandler;
pub use parallel_group::ParallelGroupHandler;
pub use run_command::RunCommandHandler;
pub use transform::TransformHandler;
pub use validate::ValidateHandler;
pub use wait::WaitHandler;

use crate::executor::RunContext;
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::{ActionKind, StepRecord};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// What a handler sees: the run's shared services plus an immutable
/// expression-context snapshot captured when the step's dependencies
/// settled. Handlers never touch run state directly; they return outputs
/// and the executor merges them.
pub struct StepContext<'a> {
    pub run: &'a RunContext,
    pub state: &'a Map<String, Value>,
}

/// One step handler. Receives the step record, its already-resolved inputs,
/// and the context; returns a structured output map or fails.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(
        &self,
        step: &StepRecord,
        inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>>;
}

/// Table of handlers keyed by action kind.
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Empty registry; most callers want [`ActionRegistry::with_defaults`]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with all seven built-in handlers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ActionKind::InvokeAgent, Arc::new(InvokeAgentHandler));
        registry.register(ActionKind::RunCommand, Arc::new(RunCommandHandler));
        registry.register(ActionKind::Validate, Arc::new(ValidateHandler));
        registry.register(ActionKind::Transform, Arc::new(TransformHandler));
        registry.register(ActionKind::Conditional, Arc::new(ConditionalHandler));
        registry.register(ActionKind::ParallelGroup, Arc::new(ParallelGroupHandler));
        registry.register(ActionKind::Wait, Arc::new(WaitHandler));
        registry
    }

    /// Register or replace the handler for an action kind
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: ActionKind) -> Result<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned().ok_or_else(|| {
            LoomError::configuration(format!(
                "no handler registered for action '{}'",
                kind.as_str()
            ))
        })
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Merge the step's resolved inputs over the state snapshot so handler
/// expressions (`transform.template`, `validate.expression`) can reference
/// both.
pub(crate) fn context_with_inputs(
    state: &Map<String, Value>,
    inputs: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = state.clone();
    for (key, value) in inputs {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
