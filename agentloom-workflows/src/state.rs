//! ABOUTME: Per-run state: workflow inputs plus settled step outputs
//! ABOUTME: Single writer (the executor); handlers only see snapshots

use agentloom_core::error::{LoomError, Result};
use serde_json::{Map, Value};

/// Accumulated state of one run. Owned exclusively by the executor; action
/// handlers receive an immutable expression context built from it and hand
/// back outputs for the executor to merge.
#[derive(Debug, Clone)]
pub struct RunState {
    inputs: Map<String, Value>,
    steps: Map<String, Value>,
}

impl RunState {
    pub fn new(inputs: Map<String, Value>) -> Self {
        Self {
            inputs,
            steps: Map::new(),
        }
    }

    /// Rebuild state from a checkpoint snapshot
    pub fn from_snapshot(snapshot: &Value) -> Result<Self> {
        let object = snapshot.as_object().ok_or_else(|| LoomError::Checkpoint {
            message: "state snapshot is not an object".to_string(),
        })?;
        let field = |name: &str| -> Result<Map<String, Value>> {
            match object.get(name) {
                Some(Value::Object(map)) => Ok(map.clone()),
                Some(_) => Err(LoomError::Checkpoint {
                    message: format!("snapshot field '{name}' is not an object"),
                }),
                None => Ok(Map::new()),
            }
        };
        Ok(Self {
            inputs: field("inputs")?,
            steps: field("steps")?,
        })
    }

    /// Serialize for a checkpoint write
    pub fn snapshot(&self) -> Value {
        let mut object = Map::new();
        object.insert("inputs".to_string(), Value::Object(self.inputs.clone()));
        object.insert("steps".to_string(), Value::Object(self.steps.clone()));
        Value::Object(object)
    }

    /// Merge a settled step's outputs under its ID
    pub fn insert_step(&mut self, step_id: &str, outputs: Map<String, Value>) {
        self.steps
            .insert(step_id.to_string(), Value::Object(outputs));
    }

    pub fn contains_step(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    pub fn inputs(&self) -> &Map<String, Value> {
        &self.inputs
    }

    pub fn step_outputs(&self) -> &Map<String, Value> {
        &self.steps
    }

    /// Expression context: inputs at the top level, `steps` by ID, and each
    /// step's outputs under its normalized identifier
    pub fn context(&self) -> Map<String, Value> {
        agentloom_expr::build_context(&self.inputs, &self.steps)
    }
}
