//! Sensor kernel behavior: firing with bindings, debounce windows,
//! fingerprint dedup, filters, and error policies.

use agentloom_providers::{MockProvider, ProviderRouter};
use agentloom_sensors::{FireOutcome, SensorDefinition, SensorKernel};
use agentloom_testing::{transform_step, workflow, InMemoryCheckpointStore};
use agentloom_workflows::Engine;
use agentloom_core::types::result::WorkflowStatus;
use agentloom_core::types::workflow::{ActionKind, StepRecord};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn kernel() -> SensorKernel {
    let router = Arc::new(ProviderRouter::new());
    router.register(Arc::new(MockProvider::new())).await;
    let engine = Engine::new(
        router,
        Arc::new(InMemoryCheckpointStore::new()),
        "mock-model",
    );

    // Echo workflow: copies the bound `payload` input into its outputs
    engine
        .register_workflow(workflow(
            "echo-flow",
            vec![transform_step("note", &[("seen", "{{ payload }}")])],
        ))
        .unwrap();

    // Always-failing workflow for error-policy tests
    engine
        .register_workflow(workflow(
            "doomed-flow",
            vec![StepRecord::new("boom", ActionKind::RunCommand).with_command("exit 1")],
        ))
        .unwrap();

    SensorKernel::new(Arc::new(engine))
}

fn sensor(id: &str, workflow: &str) -> SensorDefinition {
    serde_json::from_value(json!({
        "id": id,
        "type": "webhook",
        "trigger": {"debounce_ms": 0},
        "target": {
            "workflow": workflow,
            "input_bindings": {"payload": "{{ event.body }}"}
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_fire_resolves_bindings() {
    let kernel = kernel().await;
    kernel.register(sensor("hook", "echo-flow")).unwrap();

    let outcome = kernel
        .handle_event("hook", &json!({"body": "commit pushed"}))
        .await
        .unwrap();

    match outcome {
        FireOutcome::Fired(result) => {
            assert_eq!(result.status, WorkflowStatus::Success);
            assert_eq!(
                result.step("note").unwrap().outputs["seen"],
                json!("commit pushed")
            );
        }
        other => panic!("expected Fired, got {other:?}"),
    }
    let metrics = kernel.metrics("hook").unwrap();
    assert_eq!(metrics.events_seen, 1);
    assert_eq!(metrics.fired, 1);
}

/// Within a debounce window a sensor fires at most once.
#[tokio::test(start_paused = true)]
async fn test_debounce_window() {
    let kernel = kernel().await;
    let mut def = sensor("steady", "echo-flow");
    def.trigger.debounce_ms = 5000;
    kernel.register(def).unwrap();

    let first = kernel
        .handle_event("steady", &json!({"body": "one"}))
        .await
        .unwrap();
    assert!(matches!(first, FireOutcome::Fired(_)));

    let second = kernel
        .handle_event("steady", &json!({"body": "two"}))
        .await
        .unwrap();
    assert!(matches!(second, FireOutcome::Debounced));

    tokio::time::advance(Duration::from_millis(6000)).await;
    let third = kernel
        .handle_event("steady", &json!({"body": "three"}))
        .await
        .unwrap();
    assert!(matches!(third, FireOutcome::Fired(_)));

    let metrics = kernel.metrics("steady").unwrap();
    assert_eq!(metrics.debounced, 1);
    assert_eq!(metrics.fired, 2);
}

/// Identical fingerprints trigger the target at most once.
#[tokio::test(start_paused = true)]
async fn test_fingerprint_dedup() {
    let kernel = kernel().await;
    kernel.register(sensor("unique", "echo-flow")).unwrap();

    let event = json!({"body": "same", "id": 7});
    assert!(matches!(
        kernel.handle_event("unique", &event).await.unwrap(),
        FireOutcome::Fired(_)
    ));

    // Same content, different key order: same fingerprint
    let reordered = json!({"id": 7, "body": "same"});
    assert!(matches!(
        kernel.handle_event("unique", &reordered).await.unwrap(),
        FireOutcome::Duplicate
    ));

    assert!(matches!(
        kernel
            .handle_event("unique", &json!({"body": "different"}))
            .await
            .unwrap(),
        FireOutcome::Fired(_)
    ));

    let metrics = kernel.metrics("unique").unwrap();
    assert_eq!(metrics.deduplicated, 1);
    assert_eq!(metrics.fired, 2);
}

/// Expired fingerprints stop deduplicating.
#[tokio::test(start_paused = true)]
async fn test_dedup_ttl_expiry() {
    let kernel = kernel().await.with_dedup(16, Duration::from_secs(60));
    kernel.register(sensor("forgetful", "echo-flow")).unwrap();

    let event = json!({"body": "again"});
    assert!(matches!(
        kernel.handle_event("forgetful", &event).await.unwrap(),
        FireOutcome::Fired(_)
    ));
    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(matches!(
        kernel.handle_event("forgetful", &event).await.unwrap(),
        FireOutcome::Fired(_)
    ));
}

#[tokio::test]
async fn test_condition_filters_events() {
    let kernel = kernel().await;
    let mut def = sensor("main-only", "echo-flow");
    def.trigger.condition = Some("branch == 'main'".to_string());
    kernel.register(def).unwrap();

    let outcome = kernel
        .handle_event("main-only", &json!({"branch": "dev", "body": "x"}))
        .await
        .unwrap();
    assert!(matches!(outcome, FireOutcome::Filtered));

    let outcome = kernel
        .handle_event("main-only", &json!({"branch": "main", "body": "x"}))
        .await
        .unwrap();
    assert!(matches!(outcome, FireOutcome::Fired(_)));
}

#[tokio::test]
async fn test_disable_policy_after_repeated_failures() {
    let kernel = kernel().await;
    let mut def = sensor("fragile", "doomed-flow");
    def.error_policy.mode = agentloom_sensors::ErrorPolicyMode::Disable;
    def.error_policy.max_retries = 2;
    kernel.register(def).unwrap();

    for i in 0..2 {
        let outcome = kernel
            .handle_event("fragile", &json!({"body": format!("attempt-{i}")}))
            .await
            .unwrap();
        match outcome {
            FireOutcome::Fired(result) => assert_eq!(result.status, WorkflowStatus::Failed),
            other => panic!("expected Fired, got {other:?}"),
        }
    }

    // Two consecutive failures hit max_retries; the sensor is now disabled
    let outcome = kernel
        .handle_event("fragile", &json!({"body": "attempt-3"}))
        .await
        .unwrap();
    assert!(matches!(outcome, FireOutcome::Disabled));
    assert_eq!(kernel.metrics("fragile").unwrap().consecutive_failures, 2);
}

#[tokio::test]
async fn test_unknown_sensor_and_workflow() {
    let kernel = kernel().await;
    assert!(kernel
        .handle_event("ghost", &json!({}))
        .await
        .is_err());
    assert!(kernel.register(sensor("orphan", "no-such-flow")).is_err());
}
