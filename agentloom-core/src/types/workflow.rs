//! ABOUTME: Workflow definition types: steps, execution policy, triggers
//! ABOUTME: Enforces step-id uniqueness, dependency references, and action field exclusivity

use super::params::ParamSpec;
use super::{validate_identifier, Version};
use crate::error::{LoomError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// The seven step action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    InvokeAgent,
    RunCommand,
    Validate,
    Transform,
    Conditional,
    ParallelGroup,
    Wait,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvokeAgent => "invoke-agent",
            Self::RunCommand => "run-command",
            Self::Validate => "validate",
            Self::Transform => "transform",
            Self::Conditional => "conditional",
            Self::ParallelGroup => "parallel-group",
            Self::Wait => "wait",
        }
    }
}

/// Per-step retry policy. A step without one runs exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_seconds: u64,
}

impl RetryPolicy {
    fn validate(&self, step: &str) -> Result<()> {
        if !(1..=10).contains(&self.max_attempts) {
            return Err(LoomError::validation_field(
                format!("step '{step}': retry.max_attempts outside [1, 10]"),
                "retry.max_attempts",
            ));
        }
        if self.delay_seconds < 1 {
            return Err(LoomError::validation_field(
                format!("step '{step}': retry.delay_seconds must be >= 1"),
                "retry.delay_seconds",
            ));
        }
        Ok(())
    }
}

/// A single workflow step. Exactly one action kind; the action-specific
/// fields are mutually exclusive and checked by `validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// Unique within the workflow; lowercase with hyphens
    pub id: String,

    pub action: ActionKind,

    /// Agent name (invoke-agent only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Shell command line (run-command only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Step inputs; string values are template expressions
    #[serde(default)]
    pub inputs: Map<String, Value>,

    /// Output documentation, not enforced at runtime
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,

    /// Predicate guarding execution; false marks the step skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Step IDs within the same workflow that must settle first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Per-step wall-clock bound, >= 10 seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Child steps (parallel-group only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<StepRecord>>,

    /// Branch taken when the condition holds (conditional only)
    #[serde(rename = "then", default, skip_serializing_if = "Option::is_none")]
    pub then_branch: Option<Vec<StepRecord>>,

    /// Branch taken when the condition does not hold (conditional only)
    #[serde(rename = "else", default, skip_serializing_if = "Option::is_none")]
    pub else_branch: Option<Vec<StepRecord>>,

    /// Fixed sleep (wait only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,

    /// Polled predicate (wait only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_condition: Option<String>,

    /// JSON schema the `data` input must satisfy (validate only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    /// Boolean expression (validate) or value expression (transform)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Map of output name to expression (transform only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Map<String, Value>>,
}

impl StepRecord {
    /// Minimal constructor used by builders and tests
    pub fn new(id: impl Into<String>, action: ActionKind) -> Self {
        Self {
            id: id.into(),
            action,
            agent: None,
            command: None,
            inputs: Map::new(),
            outputs: BTreeMap::new(),
            condition: None,
            depends_on: Vec::new(),
            retry: None,
            timeout_seconds: None,
            steps: None,
            then_branch: None,
            else_branch: None,
            duration_seconds: None,
            wait_condition: None,
            schema: None,
            expression: None,
            template: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay_seconds: u64) -> Self {
        self.retry = Some(RetryPolicy {
            max_attempts,
            delay_seconds,
        });
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_template(mut self, template: Map<String, Value>) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Validate this step in isolation: identifier rules, numeric ranges,
    /// and action-specific field presence/exclusivity. Child steps are
    /// validated recursively.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.id, "step id")?;

        if let Some(timeout) = self.timeout_seconds {
            if timeout < 10 {
                return Err(LoomError::validation_field(
                    format!("step '{}': timeout_seconds must be >= 10", self.id),
                    "timeout_seconds",
                ));
            }
        }
        if let Some(retry) = &self.retry {
            retry.validate(&self.id)?;
        }

        let require = |present: bool, what: &str| -> Result<()> {
            if present {
                Ok(())
            } else {
                Err(LoomError::validation(format!(
                    "step '{}' ({}) requires {what}",
                    self.id,
                    self.action.as_str()
                )))
            }
        };
        let forbid = |present: bool, what: &str| -> Result<()> {
            if present {
                Err(LoomError::validation(format!(
                    "step '{}' ({}) must not set {what}",
                    self.id,
                    self.action.as_str()
                )))
            } else {
                Ok(())
            }
        };

        match self.action {
            ActionKind::InvokeAgent => {
                require(self.agent.is_some(), "agent")?;
                forbid(self.command.is_some(), "command")?;
                forbid(self.steps.is_some(), "steps")?;
                forbid(self.then_branch.is_some() || self.else_branch.is_some(), "then/else")?;
            }
            ActionKind::RunCommand => {
                require(self.command.is_some(), "command")?;
                forbid(self.agent.is_some(), "agent")?;
                forbid(self.steps.is_some(), "steps")?;
                forbid(self.then_branch.is_some() || self.else_branch.is_some(), "then/else")?;
            }
            ActionKind::Validate => {
                require(
                    self.schema.is_some() || self.expression.is_some(),
                    "schema or expression",
                )?;
                forbid(self.agent.is_some(), "agent")?;
                forbid(self.command.is_some(), "command")?;
                forbid(self.steps.is_some(), "steps")?;
            }
            ActionKind::Transform => {
                forbid(self.agent.is_some(), "agent")?;
                forbid(self.command.is_some(), "command")?;
                forbid(self.steps.is_some(), "steps")?;
                forbid(self.schema.is_some(), "schema")?;
            }
            ActionKind::Conditional => {
                require(self.condition.is_some(), "condition")?;
                require(self.then_branch.is_some(), "then")?;
                forbid(self.agent.is_some(), "agent")?;
                forbid(self.command.is_some(), "command")?;
                forbid(self.steps.is_some(), "steps")?;
                for branch in [&self.then_branch, &self.else_branch].into_iter().flatten() {
                    validate_sub_steps(&self.id, branch)?;
                }
            }
            ActionKind::ParallelGroup => {
                require(
                    self.steps.as_ref().is_some_and(|s| !s.is_empty()),
                    "a non-empty steps list",
                )?;
                forbid(self.agent.is_some(), "agent")?;
                forbid(self.command.is_some(), "command")?;
                forbid(self.then_branch.is_some() || self.else_branch.is_some(), "then/else")?;
                if let Some(children) = &self.steps {
                    validate_sub_steps(&self.id, children)?;
                }
            }
            ActionKind::Wait => {
                let duration = self.duration_seconds.is_some();
                let polled = self.wait_condition.is_some();
                require(duration || polled, "duration_seconds or wait_condition")?;
                if duration && polled {
                    return Err(LoomError::validation(format!(
                        "step '{}' (wait) may set duration_seconds or wait_condition, not both",
                        self.id
                    )));
                }
                forbid(self.agent.is_some(), "agent")?;
                forbid(self.command.is_some(), "command")?;
                forbid(self.steps.is_some(), "steps")?;
            }
        }
        Ok(())
    }
}

/// Validate a nested step list: per-step rules, unique IDs in the inner
/// scope, and dependencies confined to that scope.
fn validate_sub_steps(parent: &str, steps: &[StepRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    let ids: HashSet<&str> = steps.iter().map(|s| s.id.as_str()).collect();
    for step in steps {
        step.validate()?;
        if !seen.insert(step.id.as_str()) {
            return Err(LoomError::validation(format!(
                "duplicate step id '{}' inside '{parent}'",
                step.id
            )));
        }
        for dep in &step.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(LoomError::validation(format!(
                    "step '{}' inside '{parent}' depends on '{dep}', which is outside its scope",
                    step.id
                )));
            }
        }
    }
    Ok(())
}

/// How the executor schedules steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Declaration order, one step at a time
    Sequential,
    /// Dependency edges honored, no layer barriers
    Parallel,
    /// Layers act as barriers; concurrency within a layer
    #[default]
    DependencyAware,
}

/// Workflow-level execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Concurrent-step cap within a run, in [1, 32]
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,

    /// Keep scheduling later layers after a failure
    #[serde(default)]
    pub continue_on_error: bool,

    /// Abort the run at the first failed layer
    #[serde(default = "default_true")]
    pub fail_fast: bool,

    /// Wall-clock bound over the whole run, in [60, 86400] seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Plan without executing any action
    #[serde(default)]
    pub dry_run: bool,
}

fn default_parallel_limit() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            parallel_limit: default_parallel_limit(),
            continue_on_error: false,
            fail_fast: true,
            timeout_seconds: None,
            dry_run: false,
        }
    }
}

impl ExecutionConfig {
    fn validate(&self) -> Result<()> {
        if !(1..=32).contains(&self.parallel_limit) {
            return Err(LoomError::validation_field(
                format!("parallel_limit {} outside [1, 32]", self.parallel_limit),
                "execution.parallel_limit",
            ));
        }
        if let Some(timeout) = self.timeout_seconds {
            if !(60..=86_400).contains(&timeout) {
                return Err(LoomError::validation_field(
                    format!("timeout_seconds {timeout} outside [60, 86400]"),
                    "execution.timeout_seconds",
                ));
            }
        }
        Ok(())
    }
}

/// How a workflow may be started. Consumed by the sensor kernel; the
/// executor itself ignores triggers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub manual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_change: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_event: Vec<String>,
}

/// A declarative DAG of steps composing agents, commands, and control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: Version,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub inputs: BTreeMap<String, ParamSpec>,

    #[serde(default)]
    pub outputs: BTreeMap<String, ParamSpec>,

    pub steps: Vec<StepRecord>,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub triggers: Triggers,
}

fn default_version() -> Version {
    Version::new(0, 1, 0)
}

impl WorkflowDefinition {
    /// Validate the definition: identifier rules, execution ranges, unique
    /// step IDs, dependency references, and per-step action rules. Cycle
    /// detection is the DAG builder's responsibility.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, "name")?;
        self.execution.validate()?;

        if self.steps.is_empty() {
            return Err(LoomError::validation_field(
                format!("workflow '{}' has no steps", self.name),
                "steps",
            ));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(LoomError::validation(format!(
                    "duplicate step id '{}' in workflow '{}'",
                    step.id, self.name
                )));
            }
        }

        // Child IDs of parallel groups are scoped inside their parent and
        // may not be referenced by outer depends_on.
        let mut inner_ids: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if let Some(children) = &step.steps {
                inner_ids.extend(children.iter().map(|c| c.id.as_str()));
            }
        }

        for step in &self.steps {
            step.validate()?;
            for dep in &step.depends_on {
                if inner_ids.contains(dep.as_str()) {
                    return Err(LoomError::validation(format!(
                        "step '{}' depends on '{dep}', which is scoped inside a parallel group",
                        step.id
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(LoomError::validation(format!(
                        "step '{}' depends on unknown step '{dep}'",
                        step.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validate caller inputs against the declared workflow inputs and
    /// return the effective map with defaults applied.
    pub fn resolve_inputs(&self, provided: &Map<String, Value>) -> Result<Map<String, Value>> {
        let mut effective = provided.clone();
        for (name, spec) in &self.inputs {
            match effective.get(name) {
                Some(value) => {
                    if !spec.accepts(value) {
                        return Err(LoomError::validation_field(
                            format!("input '{name}' does not match its declared type"),
                            name.clone(),
                        ));
                    }
                }
                None => {
                    if let Some(default) = &spec.default {
                        effective.insert(name.clone(), default.clone());
                    } else if spec.required {
                        return Err(LoomError::validation_field(
                            format!("required input '{name}' is missing"),
                            name.clone(),
                        ));
                    }
                }
            }
        }
        Ok(effective)
    }

    /// Look up a top-level step by ID
    pub fn step(&self, id: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_step_workflow() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "demo".into(),
            version: Version::new(1, 0, 0),
            description: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            steps: vec![
                StepRecord::new("first", ActionKind::Transform)
                    .with_expression("1"),
                StepRecord::new("second", ActionKind::Transform)
                    .with_expression("2")
                    .with_dependency("first"),
            ],
            execution: ExecutionConfig::default(),
            triggers: Triggers::default(),
        }
    }

    #[test]
    fn test_valid_workflow_passes() {
        two_step_workflow().validate().unwrap();
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let mut wf = two_step_workflow();
        wf.steps[1].id = "first".into();
        wf.steps[1].depends_on.clear();
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate step id"));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let mut wf = two_step_workflow();
        wf.steps[1].depends_on = vec!["ghost".into()];
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("unknown step 'ghost'"));
    }

    #[test]
    fn test_action_field_exclusivity() {
        let step = StepRecord::new("bad", ActionKind::RunCommand);
        assert!(step.validate().is_err()); // no command

        let step = StepRecord::new("bad", ActionKind::InvokeAgent)
            .with_agent("a-agent")
            .with_command("echo hi");
        assert!(step.validate().is_err()); // command on invoke-agent

        let mut step = StepRecord::new("bad", ActionKind::Wait);
        step.duration_seconds = Some(5);
        step.wait_condition = Some("true".into());
        assert!(step.validate().is_err()); // both wait modes
    }

    #[test]
    fn test_parallel_group_scoping() {
        let group = StepRecord {
            steps: Some(vec![
                StepRecord::new("child-a", ActionKind::Transform),
                StepRecord::new("child-b", ActionKind::Transform)
                    .with_dependency("child-a"),
            ]),
            ..StepRecord::new("group", ActionKind::ParallelGroup)
        };
        group.validate().unwrap();

        let wf = WorkflowDefinition {
            name: "scoped".into(),
            version: Version::new(0, 1, 0),
            description: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            steps: vec![
                group,
                StepRecord::new("after", ActionKind::Transform)
                    .with_dependency("child-a"),
            ],
            execution: ExecutionConfig::default(),
            triggers: Triggers::default(),
        };
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("scoped inside a parallel group"));
    }

    #[test]
    fn test_execution_config_ranges() {
        let mut wf = two_step_workflow();
        wf.execution.parallel_limit = 0;
        assert!(wf.validate().is_err());

        let mut wf = two_step_workflow();
        wf.execution.parallel_limit = 33;
        assert!(wf.validate().is_err());

        let mut wf = two_step_workflow();
        wf.execution.timeout_seconds = Some(30);
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_definition_document_parse() {
        let doc = json!({
            "name": "review-pipeline",
            "version": "0.2.0",
            "steps": [
                {"id": "fetch", "action": "run-command", "command": "git fetch"},
                {
                    "id": "review",
                    "action": "invoke-agent",
                    "agent": "reviewer",
                    "depends_on": ["fetch"],
                    "retry": {"max_attempts": 3, "delay_seconds": 2},
                    "timeout_seconds": 120
                }
            ],
            "execution": {"mode": "dependency-aware", "parallel_limit": 2},
            "triggers": {"manual": true}
        });
        let wf: WorkflowDefinition = serde_json::from_value(doc).unwrap();
        wf.validate().unwrap();
        assert_eq!(wf.execution.mode, ExecutionMode::DependencyAware);
        assert_eq!(wf.steps[1].retry.as_ref().unwrap().max_attempts, 3);
    }
}
