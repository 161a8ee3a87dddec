//! ABOUTME: parallel-group handler: run scoped sub-steps concurrently, collect keyed results

use super::{ActionHandler, StepContext};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct ParallelGroupHandler;

#[async_trait]
impl ActionHandler for ParallelGroupHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        _inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        let children = step.steps.as_deref().ok_or_else(|| LoomError::Workflow {
            message: "parallel-group step has no sub-steps".to_string(),
            step: Some(step.id.clone()),
        })?;

        let outcome = crate::executor::execute_sub_steps(ctx.run, children, ctx.state).await?;

        // Partial failure follows the workflow's continue_on_error policy.
        if !outcome.errors.is_empty() && !ctx.run.execution.continue_on_error {
            return Err(LoomError::Workflow {
                message: format!(
                    "{} of {} sub-steps failed: {}",
                    outcome.errors.len(),
                    children.len(),
                    outcome.errors.join("; ")
                ),
                step: Some(step.id.clone()),
            });
        }

        let mut outputs = Map::new();
        outputs.insert("results".into(), Value::Object(outcome.outputs));
        outputs.insert(
            "errors".into(),
            Value::Array(outcome.errors.into_iter().map(Value::String).collect()),
        );
        Ok(outputs)
    }
}
