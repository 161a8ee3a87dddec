//! ABOUTME: Execution result types for steps, workflows, and agent calls

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Terminal status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

/// Result of one step's execution.
///
/// `error` carries the stable kind tag (`dependency_failed`, `cancelled`,
/// `timeout`, ...); narrative detail goes to `error_message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default)]
    pub outputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(step_id: impl Into<String>, outputs: Map<String, Value>, duration_ms: u64) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Success,
            outputs,
            error: None,
            error_message: None,
            duration_ms,
        }
    }

    pub fn failure(
        step_id: impl Into<String>,
        error_tag: impl Into<String>,
        error_message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            outputs: Map::new(),
            error: Some(error_tag.into()),
            error_message: Some(error_message.into()),
            duration_ms,
        }
    }

    pub fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut outputs = Map::new();
        outputs.insert("skipped".into(), Value::Bool(true));
        outputs.insert("reason".into(), Value::String(reason.into()));
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            outputs,
            error: None,
            error_message: None,
            duration_ms: 0,
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Every executed step succeeded or was intentionally skipped
    Success,
    /// At least one step failed and none succeeded
    Failed,
    /// At least one step failed and at least one succeeded
    Partial,
    /// No step executed
    Skipped,
}

/// Final result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub outputs: Map<String, Value>,
    pub steps_executed: usize,
    pub step_results: Vec<StepResult>,
    pub duration_ms: u64,
    pub status: WorkflowStatus,
}

impl WorkflowResult {
    /// Derive the workflow status from settled step results.
    pub fn status_from_steps(step_results: &[StepResult]) -> WorkflowStatus {
        let succeeded = step_results
            .iter()
            .filter(|r| r.status == StepStatus::Success)
            .count();
        let failed = step_results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count();
        match (succeeded, failed) {
            (0, 0) => WorkflowStatus::Skipped,
            (_, 0) => WorkflowStatus::Success,
            (0, _) => WorkflowStatus::Failed,
            (_, _) => WorkflowStatus::Partial,
        }
    }

    /// Look up a step result by ID
    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }
}

/// Result of a single agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub parsed_output: Map<String, Value>,
    pub raw_response: String,
    pub tokens_used: u32,
    pub model: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_derivation() {
        let ok = StepResult::success("a", Map::new(), 1);
        let bad = StepResult::failure("b", "command_failed", "exit 1", 2);
        let skip = StepResult::skipped("c", "condition_false");

        assert_eq!(
            WorkflowResult::status_from_steps(&[ok.clone()]),
            WorkflowStatus::Success
        );
        assert_eq!(
            WorkflowResult::status_from_steps(&[ok.clone(), skip.clone()]),
            WorkflowStatus::Success
        );
        assert_eq!(
            WorkflowResult::status_from_steps(&[bad.clone()]),
            WorkflowStatus::Failed
        );
        assert_eq!(
            WorkflowResult::status_from_steps(&[ok, bad]),
            WorkflowStatus::Partial
        );
        assert_eq!(
            WorkflowResult::status_from_steps(&[skip]),
            WorkflowStatus::Skipped
        );
        assert_eq!(
            WorkflowResult::status_from_steps(&[]),
            WorkflowStatus::Skipped
        );
    }

    #[test]
    fn test_skipped_outputs_shape() {
        let skip = StepResult::skipped("deploy", "condition_false");
        assert_eq!(skip.outputs["skipped"], json!(true));
        assert_eq!(skip.outputs["reason"], json!("condition_false"));
        assert_eq!(skip.status, StepStatus::Skipped);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&StepStatus::Skipped).unwrap(),
            "\"skipped\""
        );
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Partial).unwrap(),
            "\"partial\""
        );
    }
}
