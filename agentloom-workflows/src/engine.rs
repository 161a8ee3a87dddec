//! ABOUTME: Engine façade: registries, router, executor, and the programmatic API
//! ABOUTME: The thin HTTP/CLI surfaces consume exactly this interface

use crate::actions::ActionRegistry;
use crate::checkpoint::CheckpointStore;
use crate::executor::{RunHandle, WorkflowExecutor};
use crate::planner::{plan, DryRunPlan};
use agentloom_agents::{AgentRuntime, InvokeOptions};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::agent::AgentDefinition;
use agentloom_core::types::result::{AgentResult, StepResult, WorkflowResult, WorkflowStatus};
use agentloom_core::types::workflow::WorkflowDefinition;
use agentloom_core::Registry;
use agentloom_providers::ProviderRouter;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

/// Options for `execute_workflow`.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Reuse a run ID to resume from its latest checkpoint
    pub run_id: Option<String>,
    /// Plan without executing any action
    pub dry_run: bool,
}

/// The programmatic API surface: registration, lookup, agent invocation,
/// and workflow execution wired over shared registries, the provider
/// router, and a checkpoint store.
pub struct Engine {
    agents: Arc<Registry<AgentDefinition>>,
    workflows: Arc<Registry<WorkflowDefinition>>,
    router: Arc<ProviderRouter>,
    runtime: Arc<AgentRuntime>,
    executor: WorkflowExecutor,
}

impl Engine {
    pub fn new(
        router: Arc<ProviderRouter>,
        checkpoints: Arc<dyn CheckpointStore>,
        default_model: impl Into<String>,
    ) -> Self {
        Self::with_actions(router, checkpoints, default_model, ActionRegistry::with_defaults())
    }

    /// Engine with a caller-extended action table
    pub fn with_actions(
        router: Arc<ProviderRouter>,
        checkpoints: Arc<dyn CheckpointStore>,
        default_model: impl Into<String>,
        actions: ActionRegistry,
    ) -> Self {
        let agents = Arc::new(Registry::new("agent"));
        let workflows = Arc::new(Registry::new("workflow"));
        let runtime = Arc::new(AgentRuntime::new(router.clone(), default_model));
        let executor = WorkflowExecutor::new(
            agents.clone(),
            runtime.clone(),
            Arc::new(actions),
            checkpoints,
        );
        Self {
            agents,
            workflows,
            router,
            runtime,
            executor,
        }
    }

    pub fn router(&self) -> &Arc<ProviderRouter> {
        &self.router
    }

    pub fn register_agent(&self, def: AgentDefinition) -> Result<()> {
        info!(agent = %def.name, version = %def.version, "registering agent");
        self.agents.register(def)
    }

    pub fn register_workflow(&self, def: WorkflowDefinition) -> Result<()> {
        info!(workflow = %def.name, version = %def.version, "registering workflow");
        self.workflows.register(def)
    }

    pub fn get_agent(&self, name: &str) -> Result<Arc<AgentDefinition>> {
        self.agents.get(name)
    }

    pub fn get_workflow(&self, name: &str) -> Result<Arc<WorkflowDefinition>> {
        self.workflows.get(name)
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.agents.list()
    }

    pub fn list_workflows(&self) -> Vec<String> {
        self.workflows.list()
    }

    /// Invoke a registered agent directly, outside any workflow.
    pub async fn invoke_agent(
        &self,
        name: &str,
        inputs: &Map<String, Value>,
        model: Option<String>,
        temperature: Option<f32>,
    ) -> Result<AgentResult> {
        let def = self.agents.get(name)?;
        self.runtime
            .invoke(&def, inputs, InvokeOptions { model, temperature })
            .await
    }

    /// Execute a registered workflow to completion.
    pub async fn execute_workflow(
        &self,
        name: &str,
        inputs: Map<String, Value>,
        options: ExecuteOptions,
    ) -> Result<WorkflowResult> {
        let def = self.workflows.get(name)?;
        if options.dry_run || def.execution.dry_run {
            return Ok(plan_result(&def)?);
        }
        self.executor.execute(&def, inputs, options.run_id).await
    }

    /// Start a workflow in the background; the handle supports `cancel()`.
    pub fn start_workflow(
        &self,
        name: &str,
        inputs: Map<String, Value>,
        options: ExecuteOptions,
    ) -> Result<RunHandle> {
        let def = self.workflows.get(name)?;
        Ok(self
            .executor
            .spawn((*def).clone(), inputs, options.run_id))
    }

    /// Typed dry-run plan for a registered workflow
    pub fn dry_run(&self, name: &str) -> Result<DryRunPlan> {
        let def = self.workflows.get(name)?;
        plan(&def)
    }
}

/// A dry run reports the plan as a skipped-status result whose outputs
/// embed the planner's JSON.
fn plan_result(def: &WorkflowDefinition) -> Result<WorkflowResult> {
    let plan = plan(def)?;
    let step_results: Vec<StepResult> = plan
        .execution_order
        .iter()
        .map(|id| StepResult::skipped(id, "dry_run"))
        .collect();
    let mut outputs = Map::new();
    outputs.insert(
        "plan".to_string(),
        serde_json::to_value(&plan).map_err(|e| LoomError::Workflow {
            message: format!("failed to serialize plan: {e}"),
            step: None,
        })?,
    );
    Ok(WorkflowResult {
        outputs,
        steps_executed: 0,
        step_results,
        duration_ms: 0,
        status: WorkflowStatus::Skipped,
    })
}

/// Exit code mapping for CLI embedders:
/// 0 success, 1 failed, 2 invalid definition, 3 dependency cycle, 4 cancelled.
pub fn exit_code(outcome: &Result<WorkflowResult>) -> i32 {
    match outcome {
        Ok(result) => match result.status {
            WorkflowStatus::Success | WorkflowStatus::Skipped => 0,
            _ => {
                let cancelled = result
                    .step_results
                    .iter()
                    .any(|r| r.error.as_deref() == Some("cancelled"));
                if cancelled {
                    4
                } else {
                    1
                }
            }
        },
        Err(LoomError::Cycle { .. }) => 3,
        Err(LoomError::Cancelled) => 4,
        Err(LoomError::Validation { .. } | LoomError::NotFound { .. }) => 2,
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentloom_core::types::result::StepStatus;

    fn result_with(status: WorkflowStatus, error: Option<&str>) -> WorkflowResult {
        WorkflowResult {
            outputs: Map::new(),
            steps_executed: 1,
            step_results: vec![StepResult {
                step_id: "s".into(),
                status: if error.is_some() {
                    StepStatus::Failed
                } else {
                    StepStatus::Success
                },
                outputs: Map::new(),
                error: error.map(str::to_string),
                error_message: None,
                duration_ms: 1,
            }],
            duration_ms: 1,
            status,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            exit_code(&Ok(result_with(WorkflowStatus::Success, None))),
            0
        );
        assert_eq!(
            exit_code(&Ok(result_with(WorkflowStatus::Failed, Some("command_failed")))),
            1
        );
        assert_eq!(
            exit_code(&Ok(result_with(WorkflowStatus::Failed, Some("cancelled")))),
            4
        );
        assert_eq!(
            exit_code(&Err(LoomError::Cycle { path: vec![] })),
            3
        );
        assert_eq!(exit_code(&Err(LoomError::validation("bad"))), 2);
        assert_eq!(
            exit_code(&Err(LoomError::NotFound {
                kind: "workflow",
                name: "x".into()
            })),
            2
        );
        assert_eq!(exit_code(&Err(LoomError::Cancelled)), 4);
    }
}
