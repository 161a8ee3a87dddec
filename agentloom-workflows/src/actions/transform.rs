//! ABOUTME: transform handler: template map, single expression, or data passthrough

use super::{context_with_inputs, ActionHandler, StepContext};
use agentloom_core::error::Result;
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct TransformHandler;

#[async_trait]
impl ActionHandler for TransformHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        let context = context_with_inputs(ctx.state, &inputs);

        if let Some(template) = &step.template {
            return agentloom_expr::resolve_inputs(template, &context);
        }

        if let Some(expression) = &step.expression {
            let value = agentloom_expr::evaluate(expression, &context)?;
            let mut outputs = Map::new();
            outputs.insert("result".into(), value);
            return Ok(outputs);
        }

        let mut outputs = Map::new();
        outputs.insert(
            "result".into(),
            inputs.get("data").cloned().unwrap_or(Value::Null),
        );
        Ok(outputs)
    }
}
