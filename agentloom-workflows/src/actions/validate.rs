//! ABOUTME: validate handler: JSON-schema and expression checks over the data input

use super::{context_with_inputs, ActionHandler, StepContext};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct ValidateHandler;

#[async_trait]
impl ActionHandler for ValidateHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        let data = inputs.get("data").cloned().unwrap_or(Value::Null);

        if let Some(schema) = &step.schema {
            let compiled = jsonschema::JSONSchema::compile(schema).map_err(|e| {
                LoomError::validation_field(format!("invalid schema: {e}"), "schema")
            })?;
            let validation_result = compiled.validate(&data);
            if let Err(errors) = validation_result {
                let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
                return Err(LoomError::Validation {
                    message: format!(
                        "data failed schema validation: {}",
                        messages.join("; ")
                    ),
                    field: Some("data".to_string()),
                });
            }
        }

        if let Some(expression) = &step.expression {
            let context = context_with_inputs(ctx.state, &inputs);
            let holds = agentloom_expr::evaluate_predicate(expression, &context)?;
            if !holds {
                return Err(LoomError::Validation {
                    message: format!("validation expression '{expression}' is false"),
                    field: None,
                });
            }
        }

        let mut outputs = Map::new();
        outputs.insert("valid".into(), Value::Bool(true));
        outputs.insert("errors".into(), Value::Array(Vec::new()));
        Ok(outputs)
    }
}
