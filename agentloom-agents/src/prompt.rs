//! ABOUTME: Deterministic prompt assembly from an agent definition and inputs
//! ABOUTME: Explicit templates render over the input map; otherwise a prompt is synthesized

use agentloom_core::error::Result;
use agentloom_core::types::agent::AgentDefinition;
use agentloom_core::types::llm::ChatMessage;
use agentloom_core::types::params::ParamSpec;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;

fn write_schema(out: &mut String, heading: &str, params: &BTreeMap<String, ParamSpec>) {
    if params.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{heading}:");
    for (name, spec) in params {
        let requirement = if spec.required { ", required" } else { "" };
        let type_name = serde_json::to_value(spec.param_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        if spec.description.is_empty() {
            let _ = writeln!(out, "- {name} ({type_name}{requirement})");
        } else {
            let _ = writeln!(out, "- {name} ({type_name}{requirement}): {}", spec.description);
        }
    }
}

/// Build the system prompt for an agent with no explicit template.
///
/// The assembly is deterministic: identity line, description, capability
/// list, input schema, output schema, numeric constraints, and a closing
/// instruction naming the exact output fields.
pub fn synthesize_system_prompt(def: &AgentDefinition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "You are '{}', a {} agent.", def.name, def.role.as_str());

    if !def.description.is_empty() {
        let _ = writeln!(out, "\n{}", def.description);
    }

    if !def.capabilities.is_empty() {
        let _ = writeln!(out, "\nCapabilities: {}.", def.capabilities.join(", "));
    }

    write_schema(&mut out, "Inputs", &def.inputs);
    write_schema(&mut out, "Outputs", &def.outputs);

    let _ = writeln!(
        out,
        "\nKeep the response within {} tokens.",
        def.constraints.max_tokens
    );

    if def.outputs.is_empty() {
        let _ = write!(out, "\nRespond with a single JSON object.");
    } else {
        let fields: Vec<String> = def.outputs.keys().map(|k| format!("\"{k}\"")).collect();
        let _ = write!(
            out,
            "\nRespond with a single JSON object containing exactly these fields: {}. \
             Do not add prose outside the object.",
            fields.join(", ")
        );
    }
    out
}

/// Build the message list for an invocation. The user message is the input
/// map serialized as pretty-printed JSON unless an explicit user template
/// overrides it.
pub fn build_messages(
    def: &AgentDefinition,
    inputs: &Map<String, Value>,
) -> Result<Vec<ChatMessage>> {
    let templates = def.prompts.clone().unwrap_or_default();

    let system = match &templates.system {
        Some(template) => render_text(template, inputs)?,
        None => synthesize_system_prompt(def),
    };

    let user = match &templates.user {
        Some(template) => render_text(template, inputs)?,
        None => serde_json::to_string_pretty(&Value::Object(inputs.clone()))
            .unwrap_or_else(|_| "{}".to_string()),
    };

    Ok(vec![ChatMessage::system(system), ChatMessage::user(user)])
}

fn render_text(template: &str, inputs: &Map<String, Value>) -> Result<String> {
    let rendered = agentloom_expr::render_template(template, inputs)?;
    Ok(match rendered {
        Value::String(s) => s,
        other => other.to_string(),
    })
}
