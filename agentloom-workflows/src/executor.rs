//! ABOUTME: Workflow executor: drives steps under a concurrency cap with checkpointed resume
//! ABOUTME: Three modes (sequential, parallel, dependency-aware); retry/timeout/cancel envelopes

use crate::actions::{ActionRegistry, StepContext};
use crate::checkpoint::CheckpointStore;
use crate::dag::build_layers;
use crate::state::RunState;
use agentloom_agents::AgentRuntime;
use agentloom_core::error::{LoomError, Result, TimeoutScope};
use agentloom_core::types::agent::AgentDefinition;
use agentloom_core::types::result::{StepResult, StepStatus, WorkflowResult, WorkflowStatus};
use agentloom_core::types::workflow::{
    ActionKind, ExecutionConfig, ExecutionMode, StepRecord, WorkflowDefinition,
};
use agentloom_core::Registry;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Services and policy shared by every step of one run.
pub struct RunContext {
    pub run_id: String,
    pub cancel: CancellationToken,
    pub semaphore: Arc<Semaphore>,
    pub agents: Arc<Registry<AgentDefinition>>,
    pub agent_runtime: Arc<AgentRuntime>,
    pub actions: Arc<ActionRegistry>,
    pub execution: ExecutionConfig,
    agent_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RunContext {
    /// Serialization lock for agents with `parallel_allowed = false`
    pub fn agent_lock(&self, agent: &str) -> Arc<Mutex<()>> {
        self.agent_locks
            .entry(agent.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Container actions hold no semaphore permit; their children acquire their
/// own, which keeps the cap global without deadlocking at `parallel_limit=1`.
fn is_container(action: ActionKind) -> bool {
    matches!(action, ActionKind::Conditional | ActionKind::ParallelGroup)
}

fn failure_from(step: &StepRecord, error: &LoomError, started: Instant) -> StepResult {
    StepResult::failure(
        &step.id,
        error.tag(),
        error.to_string(),
        started.elapsed().as_millis() as u64,
    )
}

/// Run one step through the full envelope: cancellation check, condition
/// guard, input resolution, permit acquisition, and the retry loop with the
/// step timeout applied to each attempt.
pub(crate) async fn run_single_step(
    run: &RunContext,
    context: &Map<String, Value>,
    step: &StepRecord,
) -> StepResult {
    let started = Instant::now();

    if run.cancel.is_cancelled() {
        return failure_from(step, &LoomError::Cancelled, started);
    }

    if let Some(condition) = &step.condition {
        match agentloom_expr::evaluate_predicate(condition, context) {
            Ok(true) => {}
            Ok(false) => {
                debug!(step = %step.id, "condition false, skipping");
                return StepResult::skipped(&step.id, "condition_false");
            }
            Err(err) => return failure_from(step, &err, started),
        }
    }

    let resolved = match agentloom_expr::resolve_inputs(&step.inputs, context) {
        Ok(resolved) => resolved,
        Err(err) => return failure_from(step, &err, started),
    };

    let handler = match run.actions.get(step.action) {
        Ok(handler) => handler,
        Err(err) => return failure_from(step, &err, started),
    };

    let _permit = if is_container(step.action) {
        None
    } else {
        match run.semaphore.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => return failure_from(step, &LoomError::Cancelled, started),
        }
    };

    let max_attempts = step.retry.as_ref().map_or(1, |r| r.max_attempts);
    let retry_delay = Duration::from_secs(step.retry.as_ref().map_or(1, |r| r.delay_seconds));

    let mut last_error: Option<LoomError> = None;
    for attempt in 1..=max_attempts {
        let ctx = StepContext {
            run,
            state: context,
        };
        let work = handler.execute(step, resolved.clone(), ctx);
        // The wait handler owns its own clock so polled conditions can
        // report condition_met=false instead of a timeout error.
        let attempt_outcome: Result<Map<String, Value>> = tokio::select! {
            () = run.cancel.cancelled() => Err(LoomError::Cancelled),
            outcome = async {
                match step.timeout_seconds {
                    Some(seconds) if step.action != ActionKind::Wait => {
                        match tokio::time::timeout(Duration::from_secs(seconds), work).await {
                            Ok(inner) => inner,
                            Err(_) => Err(LoomError::Timeout {
                                scope: TimeoutScope::Step,
                                seconds,
                            }),
                        }
                    }
                    _ => work.await,
                }
            } => outcome,
        };

        match attempt_outcome {
            Ok(outputs) => {
                debug!(step = %step.id, attempt, "step succeeded");
                return StepResult::success(
                    &step.id,
                    outputs,
                    started.elapsed().as_millis() as u64,
                );
            }
            Err(LoomError::Cancelled) => {
                return failure_from(step, &LoomError::Cancelled, started);
            }
            Err(err) => {
                warn!(step = %step.id, attempt, max_attempts, error = %err, "step attempt failed");
                let retriable = err.is_retriable();
                last_error = Some(err);
                if attempt < max_attempts && retriable {
                    tokio::select! {
                        () = run.cancel.cancelled() => {
                            return failure_from(step, &LoomError::Cancelled, started);
                        }
                        () = tokio::time::sleep(retry_delay) => {}
                    }
                } else {
                    break;
                }
            }
        }
    }

    let error = last_error.unwrap_or(LoomError::Cancelled);
    failure_from(step, &error, started)
}

/// Result of a scoped sub-DAG (conditional branch or parallel group).
pub(crate) struct SubOutcome {
    pub outputs: Map<String, Value>,
    pub errors: Vec<String>,
}

/// Execute a nested step list as its own layered DAG. Sub-steps see the
/// outer context's symbols plus their scoped siblings; the inner scope
/// shadows `steps`.
pub(crate) async fn execute_sub_steps(
    run: &RunContext,
    steps: &[StepRecord],
    outer_context: &Map<String, Value>,
) -> Result<SubOutcome> {
    let layers = build_layers(steps)?;
    let mut sub_outputs: Map<String, Value> = Map::new();
    let mut errors: Vec<String> = Vec::new();
    let mut failed: HashSet<String> = HashSet::new();

    for layer in layers {
        let context = agentloom_expr::build_context(outer_context, &sub_outputs);
        let context_ref = &context;

        let mut in_flight = FuturesUnordered::new();
        for id in &layer {
            let step = steps
                .iter()
                .find(|s| s.id == *id)
                .expect("layer ids come from the step list");
            if let Some(dep) = step.depends_on.iter().find(|d| failed.contains(d.as_str())) {
                errors.push(format!("{}: dependency '{dep}' failed", step.id));
                failed.insert(step.id.clone());
                continue;
            }
            in_flight.push(run_single_step(run, context_ref, step));
        }

        while let Some(result) = in_flight.next().await {
            match result.status {
                StepStatus::Failed => {
                    let detail = result
                        .error_message
                        .or(result.error)
                        .unwrap_or_else(|| "unknown error".to_string());
                    errors.push(format!("{}: {detail}", result.step_id));
                    failed.insert(result.step_id);
                }
                _ => {
                    sub_outputs.insert(result.step_id, Value::Object(result.outputs));
                }
            }
        }
    }

    Ok(SubOutcome {
        outputs: sub_outputs,
        errors,
    })
}

/// A running workflow spawned in the background.
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<Result<WorkflowResult>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Cooperative cancellation: every in-flight step aborts at its next
    /// suspension point and the run finalizes as failed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn join(self) -> Result<WorkflowResult> {
        self.handle.await.map_err(|e| LoomError::Workflow {
            message: format!("run task ended abnormally: {e}"),
            step: None,
        })?
    }
}

/// Drives execution of workflow runs. Cheap to clone; every field is
/// shared.
#[derive(Clone)]
pub struct WorkflowExecutor {
    agents: Arc<Registry<AgentDefinition>>,
    agent_runtime: Arc<AgentRuntime>,
    actions: Arc<ActionRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl WorkflowExecutor {
    pub fn new(
        agents: Arc<Registry<AgentDefinition>>,
        agent_runtime: Arc<AgentRuntime>,
        actions: Arc<ActionRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            agents,
            agent_runtime,
            actions,
            checkpoints,
        }
    }

    /// Execute a run to completion on the caller's task.
    pub async fn execute(
        &self,
        def: &WorkflowDefinition,
        inputs: Map<String, Value>,
        run_id: Option<String>,
    ) -> Result<WorkflowResult> {
        self.execute_with_token(def, inputs, run_id, CancellationToken::new())
            .await
    }

    /// Spawn a run in the background and return a cancellable handle.
    pub fn spawn(
        &self,
        def: WorkflowDefinition,
        inputs: Map<String, Value>,
        run_id: Option<String>,
    ) -> RunHandle {
        let run_id = run_id.unwrap_or_else(new_run_id);
        let cancel = CancellationToken::new();
        let executor = self.clone();
        let token = cancel.clone();
        let id = run_id.clone();
        let handle = tokio::spawn(async move {
            executor
                .execute_with_token(&def, inputs, Some(id), token)
                .await
        });
        RunHandle {
            run_id,
            cancel,
            handle,
        }
    }

    pub async fn execute_with_token(
        &self,
        def: &WorkflowDefinition,
        inputs: Map<String, Value>,
        run_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<WorkflowResult> {
        def.validate()?;
        let effective_inputs = def.resolve_inputs(&inputs)?;
        let layers = build_layers(&def.steps)?;
        let run_id = run_id.unwrap_or_else(new_run_id);
        let started = Instant::now();

        let mut state = match self.checkpoints.load_latest(&run_id).await? {
            Some(record) => {
                info!(run_id = %run_id, last_step = %record.step_id, "resuming from checkpoint");
                RunState::from_snapshot(&record.state_snapshot)?
            }
            None => RunState::new(effective_inputs),
        };

        let run = RunContext {
            run_id: run_id.clone(),
            cancel: cancel.clone(),
            semaphore: Arc::new(Semaphore::new(def.execution.parallel_limit)),
            agents: self.agents.clone(),
            agent_runtime: self.agent_runtime.clone(),
            actions: self.actions.clone(),
            execution: def.execution.clone(),
            agent_locks: DashMap::new(),
        };

        // Wall-clock bound over the whole run, expressed as cancellation
        let watchdog = def.execution.timeout_seconds.map(|seconds| {
            let token = cancel.clone();
            let id = run_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                warn!(run_id = %id, seconds, "workflow timeout expired, cancelling run");
                token.cancel();
            })
        });

        info!(run_id = %run_id, workflow = %def.name, mode = ?def.execution.mode, "run started");

        let mut results: Vec<StepResult> = Vec::new();
        match def.execution.mode {
            ExecutionMode::Sequential => {
                self.run_sequential(def, &run, &mut state, &mut results).await;
            }
            ExecutionMode::DependencyAware => {
                self.run_layered(def, &layers, &run, &mut state, &mut results)
                    .await;
            }
            ExecutionMode::Parallel => {
                self.run_ready_set(def, &run, &mut state, &mut results).await;
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let mut status = WorkflowResult::status_from_steps(&results);
        if cancel.is_cancelled() {
            status = WorkflowStatus::Failed;
        }
        let steps_executed = results
            .iter()
            .filter(|r| r.status != StepStatus::Skipped)
            .count();
        let outputs = collect_outputs(def, &state);

        info!(run_id = %run_id, ?status, steps_executed, "run finished");
        Ok(WorkflowResult {
            outputs,
            steps_executed,
            step_results: results,
            duration_ms: started.elapsed().as_millis() as u64,
            status,
        })
    }

    /// Merge a settled step into run state, checkpoint, and record the
    /// result. Checkpoint failures are reported but never fail the step.
    async fn settle(
        &self,
        run: &RunContext,
        state: &mut RunState,
        results: &mut Vec<StepResult>,
        failed: &mut HashSet<String>,
        result: StepResult,
    ) {
        match result.status {
            StepStatus::Failed => {
                failed.insert(result.step_id.clone());
            }
            _ => {
                state.insert_step(&result.step_id, result.outputs.clone());
                if let Err(err) = self
                    .checkpoints
                    .save(&run.run_id, &result.step_id, state.snapshot())
                    .await
                {
                    warn!(run_id = %run.run_id, step = %result.step_id, error = %err, "checkpoint write failed");
                }
            }
        }
        results.push(result);
    }

    fn should_abort(&self, run: &RunContext, failed: &HashSet<String>) -> bool {
        !failed.is_empty() && run.execution.fail_fast && !run.execution.continue_on_error
    }

    /// Declaration order, one step at a time.
    async fn run_sequential(
        &self,
        def: &WorkflowDefinition,
        run: &RunContext,
        state: &mut RunState,
        results: &mut Vec<StepResult>,
    ) {
        let mut failed: HashSet<String> = HashSet::new();
        for step in &def.steps {
            if state.contains_step(&step.id) {
                continue;
            }
            if let Some(dep) = step.depends_on.iter().find(|d| failed.contains(d.as_str())) {
                let result = StepResult::failure(
                    &step.id,
                    "dependency_failed",
                    format!("dependency '{dep}' failed"),
                    0,
                );
                self.settle(run, state, results, &mut failed, result).await;
                continue;
            }
            let context = state.context();
            let result = run_single_step(run, &context, step).await;
            self.settle(run, state, results, &mut failed, result).await;
            if self.should_abort(run, &failed) {
                mark_downstream_failed(def, state, results, &mut failed);
                break;
            }
        }
    }

    /// Layers as barriers; bounded concurrency within each layer.
    async fn run_layered(
        &self,
        def: &WorkflowDefinition,
        layers: &[Vec<String>],
        run: &RunContext,
        state: &mut RunState,
        results: &mut Vec<StepResult>,
    ) {
        let mut failed: HashSet<String> = HashSet::new();
        for layer in layers {
            let pending: Vec<&StepRecord> = layer
                .iter()
                .filter(|id| !state.contains_step(id.as_str()))
                .map(|id| def.step(id).expect("layer ids come from the definition"))
                .collect();
            if pending.is_empty() {
                continue;
            }

            let mut runnable: Vec<&StepRecord> = Vec::new();
            for step in pending {
                if let Some(dep) = step.depends_on.iter().find(|d| failed.contains(d.as_str())) {
                    let result = StepResult::failure(
                        &step.id,
                        "dependency_failed",
                        format!("dependency '{dep}' failed"),
                        0,
                    );
                    self.settle(run, state, results, &mut failed, result).await;
                } else {
                    runnable.push(step);
                }
            }

            debug!(run_id = %run.run_id, steps = runnable.len(), "dispatching layer");
            let context = state.context();
            let context_ref = &context;
            let mut in_flight: FuturesUnordered<_> = runnable
                .into_iter()
                .map(|step| run_single_step(run, context_ref, step))
                .collect();

            let mut settled: Vec<StepResult> = Vec::new();
            while let Some(result) = in_flight.next().await {
                settled.push(result);
            }
            drop(in_flight);
            drop(context);

            for result in settled {
                self.settle(run, state, results, &mut failed, result).await;
            }

            if self.should_abort(run, &failed) {
                mark_downstream_failed(def, state, results, &mut failed);
                break;
            }
        }
    }

    /// Dependency edges honored, no layer barriers: a step is released the
    /// moment its last dependency settles.
    async fn run_ready_set(
        &self,
        def: &WorkflowDefinition,
        run: &RunContext,
        state: &mut RunState,
        results: &mut Vec<StepResult>,
    ) {
        let mut failed: HashSet<String> = HashSet::new();
        let mut settled: HashSet<String> = state
            .step_outputs()
            .keys()
            .cloned()
            .collect();
        let mut scheduled: HashSet<String> = settled.clone();
        let mut in_flight = FuturesUnordered::new();
        let mut aborted = false;

        loop {
            // Release every step whose dependencies have settled; marking a
            // dependency-failed step settles it too, so loop to a fixpoint.
            let mut progressed = true;
            while progressed && !aborted {
                progressed = false;
                for step in &def.steps {
                    if scheduled.contains(&step.id) {
                        continue;
                    }
                    if !step.depends_on.iter().all(|d| settled.contains(d.as_str())) {
                        continue;
                    }
                    scheduled.insert(step.id.clone());
                    progressed = true;
                    if let Some(dep) =
                        step.depends_on.iter().find(|d| failed.contains(d.as_str()))
                    {
                        let result = StepResult::failure(
                            &step.id,
                            "dependency_failed",
                            format!("dependency '{dep}' failed"),
                            0,
                        );
                        settled.insert(step.id.clone());
                        self.settle(run, state, results, &mut failed, result).await;
                    } else {
                        let context = state.context();
                        in_flight.push(owned_step_future(run, context, step));
                    }
                }
            }

            let Some(result) = in_flight.next().await else {
                break;
            };
            let step_id = result.step_id.clone();
            let step_failed = result.status == StepStatus::Failed;
            settled.insert(step_id);
            self.settle(run, state, results, &mut failed, result).await;
            if step_failed && self.should_abort(run, &failed) {
                aborted = true;
            }
        }

        if !failed.is_empty() {
            mark_downstream_failed(def, state, results, &mut failed);
        }
    }
}

/// A step future owning its context snapshot, captured the moment the step
/// became ready.
async fn owned_step_future(
    run: &RunContext,
    context: Map<String, Value>,
    step: &StepRecord,
) -> StepResult {
    run_single_step(run, &context, step).await
}

/// Mark every unexecuted step that transitively depends on a failed step.
fn mark_downstream_failed(
    def: &WorkflowDefinition,
    state: &RunState,
    results: &mut Vec<StepResult>,
    failed: &mut HashSet<String>,
) {
    let mut recorded: HashSet<String> = results.iter().map(|r| r.step_id.clone()).collect();
    let mut progressed = true;
    while progressed {
        progressed = false;
        for step in &def.steps {
            if state.contains_step(&step.id)
                || recorded.contains(&step.id)
                || failed.contains(&step.id)
            {
                continue;
            }
            if let Some(dep) = step.depends_on.iter().find(|d| failed.contains(d.as_str())) {
                results.push(StepResult::failure(
                    &step.id,
                    "dependency_failed",
                    format!("dependency '{dep}' failed"),
                    0,
                ));
                failed.insert(step.id.clone());
                recorded.insert(step.id.clone());
                progressed = true;
            }
        }
    }
}

/// Workflow outputs: declared names resolved against the final context, or
/// every executed step's outputs keyed by ID when nothing is declared.
fn collect_outputs(def: &WorkflowDefinition, state: &RunState) -> Map<String, Value> {
    if def.outputs.is_empty() {
        return state.step_outputs().clone();
    }
    let context = state.context();
    let mut outputs = Map::new();
    for name in def.outputs.keys() {
        if let Some(value) = context.get(name) {
            outputs.insert(name.clone(), value.clone());
        }
    }
    outputs
}
