//! ABOUTME: conditional handler: evaluate the predicate, run one branch as a scoped sub-DAG

use super::{ActionHandler, StepContext};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

pub struct ConditionalHandler;

#[async_trait]
impl ActionHandler for ConditionalHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        _inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        let condition = step.condition.as_deref().ok_or_else(|| LoomError::Workflow {
            message: "conditional step has no condition".to_string(),
            step: Some(step.id.clone()),
        })?;
        let holds = agentloom_expr::evaluate_predicate(condition, ctx.state)?;
        let (branch_name, branch) = if holds {
            ("then", step.then_branch.as_deref())
        } else {
            ("else", step.else_branch.as_deref())
        };
        debug!(step = %step.id, branch = branch_name, "conditional resolved");

        let mut outputs = Map::new();
        outputs.insert("branch".into(), Value::String(branch_name.to_string()));
        outputs.insert("condition_result".into(), Value::Bool(holds));

        if let Some(steps) = branch {
            let outcome = crate::executor::execute_sub_steps(ctx.run, steps, ctx.state).await?;
            if let Some(first_error) = outcome.errors.first() {
                return Err(LoomError::Workflow {
                    message: format!("branch '{branch_name}' failed: {first_error}"),
                    step: Some(step.id.clone()),
                });
            }
            for (sub_id, sub_outputs) in outcome.outputs {
                outputs.insert(sub_id, sub_outputs);
            }
        }

        Ok(outputs)
    }
}
