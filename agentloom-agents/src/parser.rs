//! ABOUTME: Total output parser: every response string becomes an output map
//! ABOUTME: Fence strip -> structured parse -> scalar wrap -> single-field bind -> raw fallback

use agentloom_core::types::agent::AgentDefinition;
use serde_json::{Map, Value};

/// Which salvage branch produced the outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedOutput {
    /// Response parsed as a JSON object
    StructuredObject,
    /// Response parsed as a scalar or array, wrapped under `result`
    StructuredScalar,
    /// Unparseable text bound to the agent's only declared output field
    SingleFieldText,
    /// Unparseable text bound to `result`
    FallbackText,
}

/// Strip a single enclosing code fence, accepting the common
/// ```` ```json ```` / ```` ```yaml ```` tags.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line
    match inner.find('\n') {
        Some(newline) => inner[newline + 1..].trim(),
        None => inner.trim(),
    }
}

/// Parse an LLM response into the agent's output map. Total: every branch
/// produces a map and none raises.
pub fn parse_agent_output(def: &AgentDefinition, raw: &str) -> (Map<String, Value>, ParsedOutput) {
    let stripped = strip_code_fence(raw);

    match serde_json::from_str::<Value>(stripped) {
        Ok(Value::Object(map)) => (map, ParsedOutput::StructuredObject),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            (map, ParsedOutput::StructuredScalar)
        }
        Err(_) => {
            let mut map = Map::new();
            if def.outputs.len() == 1 {
                let field = def.outputs.keys().next().expect("one output").clone();
                map.insert(field, Value::String(stripped.to_string()));
                (map, ParsedOutput::SingleFieldText)
            } else {
                map.insert("result".to_string(), Value::String(stripped.to_string()));
                (map, ParsedOutput::FallbackText)
            }
        }
    }
}
