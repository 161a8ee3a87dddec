//! ABOUTME: Evaluation context assembly from workflow inputs and step outputs

use serde_json::{Map, Value};

/// Rewrite hyphens to underscores so step IDs become valid identifiers.
pub fn normalize_identifier(id: &str) -> String {
    id.replace('-', "_")
}

/// Build the symbol table an expression sees:
/// workflow inputs at the top level, a `steps` mapping keyed by step ID,
/// and each completed step's outputs bound at the top level under its
/// normalized identifier.
pub fn build_context(
    inputs: &Map<String, Value>,
    step_outputs: &Map<String, Value>,
) -> Map<String, Value> {
    let mut context = inputs.clone();
    for (step_id, outputs) in step_outputs {
        context.insert(normalize_identifier(step_id), outputs.clone());
    }
    context.insert("steps".to_string(), Value::Object(step_outputs.clone()));
    context
}
