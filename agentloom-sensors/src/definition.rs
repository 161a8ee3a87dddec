//! ABOUTME: Sensor definition types: trigger, target bindings, error policy

use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::validate_identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of external signal the sensor watches. Opaque to the kernel;
/// the source adapter that feeds `handle_event` knows the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorType {
    FileChange,
    GitCommit,
    Schedule,
    Webhook,
    AssetMaterialized,
    Manual,
}

/// Firing rules applied to every incoming event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Predicate over the event payload; false discards the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Minimum quiet time between firings, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Additional predicate, useful for source-specific narrowing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

fn default_debounce_ms() -> u64 {
    1000
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            condition: None,
            debounce_ms: default_debounce_ms(),
            filter: None,
        }
    }
}

/// Which workflow a firing starts, and how event fields map to its inputs.
/// Binding values are template expressions over the event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub workflow: String,
    #[serde(default)]
    pub input_bindings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationMode {
    /// Events are pushed into the kernel as they happen
    #[default]
    Reactive,
    /// A caller-owned loop polls the source on an interval
    Polling,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub mode: EvaluationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicyMode {
    /// Leave the sensor armed; the source re-evaluates next cycle
    #[default]
    Retry,
    /// Count consecutive failures and raise an alert past the threshold
    Alert,
    /// Disable the sensor after too many consecutive failures
    Disable,
}

/// How target-workflow failures feed back into the sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPolicy {
    #[serde(default)]
    pub mode: ErrorPolicyMode,
    #[serde(default = "default_threshold")]
    pub alert_after: u32,
    #[serde(default = "default_threshold")]
    pub max_retries: u32,
}

fn default_threshold() -> u32 {
    3
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            mode: ErrorPolicyMode::default(),
            alert_after: default_threshold(),
            max_retries: default_threshold(),
        }
    }
}

/// A reactive trigger that starts workflows in response to external events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDefinition {
    pub id: String,

    #[serde(rename = "type")]
    pub sensor_type: SensorType,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub trigger: TriggerConfig,

    pub target: TargetConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

fn default_enabled() -> bool {
    true
}

impl SensorDefinition {
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.id, "sensor id")?;
        if self.target.workflow.is_empty() {
            return Err(LoomError::validation_field(
                format!("sensor '{}' has no target workflow", self.id),
                "target.workflow",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_document_parse() {
        let doc = json!({
            "id": "on-push",
            "type": "git-commit",
            "trigger": {"condition": "branch == 'main'", "debounce_ms": 5000},
            "target": {
                "workflow": "ci-pipeline",
                "input_bindings": {"sha": "{{ commit }}"}
            },
            "error_policy": {"mode": "disable", "max_retries": 2}
        });
        let def: SensorDefinition = serde_json::from_value(doc).unwrap();
        def.validate().unwrap();
        assert_eq!(def.sensor_type, SensorType::GitCommit);
        assert!(def.enabled);
        assert_eq!(def.trigger.debounce_ms, 5000);
        assert_eq!(def.error_policy.mode, ErrorPolicyMode::Disable);
        assert_eq!(def.error_policy.max_retries, 2);
    }

    #[test]
    fn test_defaults() {
        let doc = json!({
            "id": "manual-kick",
            "type": "manual",
            "target": {"workflow": "deploy"}
        });
        let def: SensorDefinition = serde_json::from_value(doc).unwrap();
        def.validate().unwrap();
        assert_eq!(def.trigger.debounce_ms, 1000);
        assert_eq!(def.error_policy.mode, ErrorPolicyMode::Retry);
        assert_eq!(def.evaluation.mode, EvaluationMode::Reactive);
    }

    #[test]
    fn test_invalid_id_rejected() {
        let doc = json!({
            "id": "Bad Id",
            "type": "manual",
            "target": {"workflow": "deploy"}
        });
        let def: SensorDefinition = serde_json::from_value(doc).unwrap();
        assert!(def.validate().is_err());
    }
}
