//! ABOUTME: Dry-run planner: layers and per-step plans without executing any action

use crate::dag::build_layers;
use agentloom_core::error::Result;
use agentloom_core::types::workflow::WorkflowDefinition;
use serde::{Deserialize, Serialize};

/// What one step would do, for operators reading a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepPlan {
    pub id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Execution plan produced without running anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunPlan {
    pub workflow_name: String,
    pub total_steps: usize,
    /// Topological order, layer by layer
    pub execution_order: Vec<String>,
    /// Layers with more than one member, i.e. actual concurrency
    pub parallel_groups: Vec<Vec<String>>,
    pub per_step_plan: Vec<StepPlan>,
}

/// Build the plan for a workflow. Validation and cycle detection run
/// exactly as they would before a real execution.
pub fn plan(def: &WorkflowDefinition) -> Result<DryRunPlan> {
    def.validate()?;
    let layers = build_layers(&def.steps)?;

    let execution_order: Vec<String> = layers.iter().flatten().cloned().collect();
    let parallel_groups: Vec<Vec<String>> = layers
        .into_iter()
        .filter(|layer| layer.len() > 1)
        .collect();

    let per_step_plan = execution_order
        .iter()
        .map(|id| {
            let step = def.step(id).expect("ordered ids come from the definition");
            StepPlan {
                id: step.id.clone(),
                action: step.action.as_str().to_string(),
                depends_on: step.depends_on.clone(),
                agent: step.agent.clone(),
                command: step.command.clone(),
                condition: step.condition.clone(),
            }
        })
        .collect();

    Ok(DryRunPlan {
        workflow_name: def.name.clone(),
        total_steps: def.steps.len(),
        execution_order,
        parallel_groups,
        per_step_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::types::workflow::{ActionKind, StepRecord};
    use agentloom_core::Version;
    use std::collections::BTreeMap;

    fn fan_out() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "fan-out".into(),
            version: Version::new(0, 1, 0),
            description: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            steps: vec![
                StepRecord::new("seed", ActionKind::Transform).with_expression("1"),
                StepRecord::new("left", ActionKind::Transform)
                    .with_expression("2")
                    .with_dependency("seed"),
                StepRecord::new("right", ActionKind::Transform)
                    .with_expression("3")
                    .with_dependency("seed"),
                StepRecord::new("join", ActionKind::Transform)
                    .with_expression("4")
                    .with_dependency("left")
                    .with_dependency("right"),
            ],
            execution: Default::default(),
            triggers: Default::default(),
        }
    }

    #[test]
    fn test_plan_shape() {
        let plan = plan(&fan_out()).unwrap();
        assert_eq!(plan.workflow_name, "fan-out");
        assert_eq!(plan.total_steps, 4);
        assert_eq!(plan.execution_order, vec!["seed", "left", "right", "join"]);
        assert_eq!(plan.parallel_groups, vec![vec!["left", "right"]]);
        assert_eq!(plan.per_step_plan.len(), 4);
        assert_eq!(plan.per_step_plan[0].action, "transform");
    }

    #[test]
    fn test_plan_rejects_cycles() {
        let mut def = fan_out();
        def.steps[0].depends_on = vec!["join".into()];
        assert!(plan(&def).is_err());
    }
}
