//! ABOUTME: invoke-agent handler: look up the agent, call the runtime, return parsed outputs

use super::{ActionHandler, StepContext};
use agentloom_agents::InvokeOptions;
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

pub struct InvokeAgentHandler;

#[async_trait]
impl ActionHandler for InvokeAgentHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        let agent_name = step.agent.as_deref().ok_or_else(|| LoomError::Workflow {
            message: "invoke-agent step has no agent".to_string(),
            step: Some(step.id.clone()),
        })?;
        let def = ctx.run.agents.get(agent_name)?;

        // Agents that forbid parallel invocation serialize on a per-agent
        // lock held across the provider call.
        let guard = if def.constraints.parallel_allowed {
            None
        } else {
            let lock = ctx.run.agent_lock(agent_name);
            Some(lock.lock_owned().await)
        };

        debug!(step = %step.id, agent = %agent_name, serialized = guard.is_some(), "invoking agent");
        let result = ctx
            .run
            .agent_runtime
            .invoke(&def, &inputs, InvokeOptions::default())
            .await?;
        Ok(result.parsed_output)
    }
}
