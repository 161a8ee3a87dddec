//! End-to-end executor scenarios: fan-out/fan-in, retries, skips, fail-fast,
//! resume, concurrency caps, cancellation, and the three execution modes.

use agentloom_core::types::result::{StepStatus, WorkflowStatus};
use agentloom_core::types::workflow::{ActionKind, ExecutionMode, StepRecord};
use agentloom_providers::{MockProvider, ProviderRouter};
use agentloom_testing::{
    flaky_command, read_attempts, transform_step, workflow, GaugeHandler, InMemoryCheckpointStore,
};
use agentloom_workflows::{build_layers, ActionRegistry, Engine, ExecuteOptions};
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;

async fn engine() -> Engine {
    let router = Arc::new(ProviderRouter::new());
    router.register(Arc::new(MockProvider::new())).await;
    Engine::new(
        router,
        Arc::new(InMemoryCheckpointStore::new()),
        "mock-model",
    )
}

fn no_inputs() -> Map<String, serde_json::Value> {
    Map::new()
}

/// Fan-out over three squares, fan-in to their sum.
#[tokio::test]
async fn test_fan_out_fan_in() {
    let steps = vec![
        transform_step("a", &[("n", "{{ 3 }}")]),
        transform_step("b", &[("square", "{{ (a.n + 0) ** 2 }}")]).with_dependency("a"),
        transform_step("c", &[("square", "{{ (a.n + 1) ** 2 }}")]).with_dependency("a"),
        transform_step("d", &[("square", "{{ (a.n + 2) ** 2 }}")]).with_dependency("a"),
        transform_step("e", &[("sum", "{{ b.square + c.square + d.square }}")])
            .with_dependency("b")
            .with_dependency("c")
            .with_dependency("d"),
    ];

    // The three squares share a single layer
    let layers = build_layers(&steps).unwrap();
    assert_eq!(layers[1], vec!["b", "c", "d"]);

    let def = workflow("fan-out-fan-in", steps);
    let engine = engine().await;
    engine.register_workflow(def).unwrap();

    let result = engine
        .execute_workflow("fan-out-fan-in", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(result.steps_executed, 5);
    assert_eq!(result.step("e").unwrap().outputs["sum"], json!(50));
}

/// A command that fails twice then succeeds, under a 3-attempt retry.
#[tokio::test(start_paused = true)]
async fn test_retry_then_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");

    let step = StepRecord::new("flaky", ActionKind::RunCommand)
        .with_command(flaky_command(&counter, 2))
        .with_retry(3, 1);
    let def = workflow("retry-demo", vec![step]);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("retry-demo", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(result.step("flaky").unwrap().status, StepStatus::Success);
    assert_eq!(read_attempts(&counter), 3);
}

/// The handler is never invoked more than max_attempts times.
#[tokio::test(start_paused = true)]
async fn test_retry_bound_respected() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");

    let step = StepRecord::new("doomed", ActionKind::RunCommand)
        .with_command(flaky_command(&counter, 99))
        .with_retry(2, 1);
    let def = workflow("retry-bound", vec![step]);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("retry-bound", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    let step = result.step("doomed").unwrap();
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.error.as_deref(), Some("command_failed"));
    assert_eq!(read_attempts(&counter), 2);
}

/// A false condition records a skip and never runs the action.
#[tokio::test]
async fn test_condition_skip() {
    let steps = vec![
        transform_step("check", &[("ready", "{{ false }}")]),
        transform_step("deploy", &[("done", "{{ true }}")])
            .with_dependency("check")
            .with_condition("steps['check'].ready"),
    ];
    let def = workflow("guarded-deploy", steps);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("guarded-deploy", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Success);
    let deploy = result.step("deploy").unwrap();
    assert_eq!(deploy.status, StepStatus::Skipped);
    assert_eq!(deploy.outputs["reason"], json!("condition_false"));
    assert_eq!(result.steps_executed, 1);
}

/// Fail-fast aborts later layers; downstream steps carry
/// dependency_failed and the run is partial.
#[tokio::test]
async fn test_fail_fast_marks_dependents() {
    let steps = vec![
        transform_step("init", &[("ok", "{{ true }}")]),
        StepRecord::new("x", ActionKind::RunCommand)
            .with_command("exit 1")
            .with_dependency("init"),
        transform_step("y", &[("ok", "{{ true }}")]).with_dependency("init"),
        transform_step("finalize", &[("done", "{{ true }}")])
            .with_dependency("x")
            .with_dependency("y"),
    ];
    let def = workflow("fail-fast-demo", steps);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("fail-fast-demo", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Partial);
    assert_eq!(result.step("x").unwrap().status, StepStatus::Failed);
    assert_eq!(result.step("y").unwrap().status, StepStatus::Success);
    let finalize = result.step("finalize").unwrap();
    assert_eq!(finalize.status, StepStatus::Failed);
    assert_eq!(finalize.error.as_deref(), Some("dependency_failed"));
}

/// continue_on_error keeps scheduling later layers best-effort.
#[tokio::test]
async fn test_continue_on_error() {
    let steps = vec![
        StepRecord::new("broken", ActionKind::RunCommand).with_command("exit 3"),
        transform_step("independent", &[("ok", "{{ true }}")]),
        transform_step("downstream", &[("ok", "{{ true }}")]).with_dependency("broken"),
    ];
    let mut def = workflow("best-effort", steps);
    def.execution.continue_on_error = true;

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("best-effort", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Partial);
    assert_eq!(
        result.step("independent").unwrap().status,
        StepStatus::Success
    );
    assert_eq!(
        result.step("downstream").unwrap().error.as_deref(),
        Some("dependency_failed")
    );
}

/// Cancellation during a long wait fails the run promptly.
#[tokio::test(start_paused = true)]
async fn test_cancellation_during_wait() {
    let mut step = StepRecord::new("long-wait", ActionKind::Wait);
    step.duration_seconds = Some(60);
    let def = workflow("cancellable", vec![step]);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let handle = engine
        .start_workflow("cancellable", no_inputs(), ExecuteOptions::default())
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    let result = handle.join().await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    let wait = result.step("long-wait").unwrap();
    assert_eq!(wait.status, StepStatus::Failed);
    assert_eq!(wait.error.as_deref(), Some("cancelled"));
}

/// The workflow wall-clock bound cancels the whole run.
#[tokio::test(start_paused = true)]
async fn test_workflow_timeout_cancels_run() {
    let mut step = StepRecord::new("outlasts", ActionKind::Wait);
    step.duration_seconds = Some(600);
    let mut def = workflow("bounded", vec![step]);
    def.execution.timeout_seconds = Some(60);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("bounded", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(
        result.step("outlasts").unwrap().error.as_deref(),
        Some("cancelled")
    );
}

/// Concurrent steps never exceed parallel_limit.
#[tokio::test(start_paused = true)]
async fn test_concurrency_cap() {
    let gauge = GaugeHandler::new(Duration::from_millis(50));
    let calls = gauge.calls.clone();
    let peak = gauge.peak.clone();

    let mut actions = ActionRegistry::with_defaults();
    actions.register(ActionKind::Transform, Arc::new(gauge));

    let router = Arc::new(ProviderRouter::new());
    router.register(Arc::new(MockProvider::new())).await;
    let engine = Engine::with_actions(
        router,
        Arc::new(InMemoryCheckpointStore::new()),
        "mock-model",
        actions,
    );

    let steps: Vec<StepRecord> = (0..8)
        .map(|i| StepRecord::new(format!("step-{i}"), ActionKind::Transform))
        .collect();
    let mut def = workflow("capped", steps);
    def.execution.parallel_limit = 3;

    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("capped", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Success);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 8);
    let observed_peak = peak.load(std::sync::atomic::Ordering::SeqCst);
    assert!(observed_peak <= 3, "peak concurrency {observed_peak} exceeded cap");
    assert!(observed_peak >= 2, "steps never overlapped");
}

/// Resuming a checkpointed run re-executes nothing already completed.
#[tokio::test]
async fn test_idempotent_resume() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("attempts");

    let gauge = GaugeHandler::new(Duration::from_millis(1));
    let transform_calls = gauge.calls.clone();
    let mut actions = ActionRegistry::with_defaults();
    actions.register(ActionKind::Transform, Arc::new(gauge));

    let router = Arc::new(ProviderRouter::new());
    router.register(Arc::new(MockProvider::new())).await;
    let engine = Engine::with_actions(
        router,
        Arc::new(InMemoryCheckpointStore::new()),
        "mock-model",
        actions,
    );

    // `prepare` succeeds; `publish` fails on the first run and succeeds on
    // the second, simulating a crash-and-resume.
    let steps = vec![
        StepRecord::new("prepare", ActionKind::Transform),
        StepRecord::new("publish", ActionKind::RunCommand)
            .with_command(flaky_command(&counter, 1))
            .with_dependency("prepare"),
    ];
    engine.register_workflow(workflow("resumable", steps)).unwrap();

    let options = ExecuteOptions {
        run_id: Some("run-fixed".to_string()),
        dry_run: false,
    };

    let first = engine
        .execute_workflow("resumable", no_inputs(), options.clone())
        .await
        .unwrap();
    assert_eq!(first.status, WorkflowStatus::Partial);
    assert_eq!(transform_calls.load(std::sync::atomic::Ordering::SeqCst), 1);

    let second = engine
        .execute_workflow("resumable", no_inputs(), options)
        .await
        .unwrap();
    assert_eq!(second.status, WorkflowStatus::Success);
    assert_eq!(second.step("publish").unwrap().status, StepStatus::Success);
    // prepare was restored from the checkpoint, not re-executed
    assert_eq!(transform_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(second.step("prepare").is_none());
    assert!(second.outputs.contains_key("prepare"));
}

/// The three modes agree on the fan-out result.
#[tokio::test]
async fn test_modes_agree() {
    for mode in [
        ExecutionMode::Sequential,
        ExecutionMode::DependencyAware,
        ExecutionMode::Parallel,
    ] {
        let steps = vec![
            transform_step("a", &[("n", "{{ 3 }}")]),
            transform_step("b", &[("square", "{{ (a.n + 0) ** 2 }}")]).with_dependency("a"),
            transform_step("c", &[("square", "{{ (a.n + 1) ** 2 }}")]).with_dependency("a"),
            transform_step("d", &[("square", "{{ (a.n + 2) ** 2 }}")]).with_dependency("a"),
            transform_step("e", &[("sum", "{{ b.square + c.square + d.square }}")])
                .with_dependency("b")
                .with_dependency("c")
                .with_dependency("d"),
        ];
        let mut def = workflow("modal", steps);
        def.execution.mode = mode;

        let engine = engine().await;
        engine.register_workflow(def).unwrap();
        let result = engine
            .execute_workflow("modal", no_inputs(), ExecuteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, WorkflowStatus::Success, "mode {mode:?}");
        assert_eq!(
            result.step("e").unwrap().outputs["sum"],
            json!(50),
            "mode {mode:?}"
        );
    }
}

/// Cyclic workflows are rejected before execution.
#[tokio::test]
async fn test_cycle_rejected() {
    let steps = vec![
        transform_step("a", &[("v", "{{ 1 }}")]).with_dependency("b"),
        transform_step("b", &[("v", "{{ 2 }}")]).with_dependency("a"),
    ];
    let def = workflow("cyclic", steps);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let err = engine
        .execute_workflow("cyclic", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        agentloom_core::LoomError::Cycle { .. }
    ));
}

/// Dry-run returns the plan without executing anything.
#[tokio::test]
async fn test_dry_run_plan() {
    let steps = vec![
        transform_step("one", &[("v", "{{ 1 }}")]),
        transform_step("two", &[("v", "{{ 2 }}")]).with_dependency("one"),
    ];
    let def = workflow("planned", steps);

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow(
            "planned",
            no_inputs(),
            ExecuteOptions {
                run_id: None,
                dry_run: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Skipped);
    assert_eq!(result.steps_executed, 0);
    assert_eq!(result.outputs["plan"]["total_steps"], json!(2));
    assert_eq!(
        result.outputs["plan"]["execution_order"],
        json!(["one", "two"])
    );

    let plan = engine.dry_run("planned").unwrap();
    assert_eq!(plan.workflow_name, "planned");
    assert_eq!(plan.per_step_plan[1].depends_on, vec!["one"]);
}

/// Workflow declared outputs resolve against the final context.
#[tokio::test]
async fn test_declared_outputs_resolve() {
    use agentloom_core::types::params::{ParamSpec, ParamType};

    let steps = vec![transform_step("compute", &[("answer", "{{ 6 * 7 }}")])];
    let mut def = workflow("answering", steps);
    def.outputs.insert(
        "compute".to_string(),
        ParamSpec::optional(ParamType::Object),
    );

    let engine = engine().await;
    engine.register_workflow(def).unwrap();
    let result = engine
        .execute_workflow("answering", no_inputs(), ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(result.outputs["compute"]["answer"], json!(42));
}
