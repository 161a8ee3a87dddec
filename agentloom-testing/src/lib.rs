//! ABOUTME: Shared fixtures for agentloom test suites
//! ABOUTME: Definition builders, instrumented action handlers, flaky command helpers

use agentloom_core::error::Result;
use agentloom_core::types::workflow::{
    ActionKind, ExecutionConfig, StepRecord, Triggers, WorkflowDefinition,
};
use agentloom_core::Version;
use agentloom_workflows::{ActionHandler, StepContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use agentloom_providers::MockProvider;
pub use agentloom_workflows::InMemoryCheckpointStore;

/// A minimal valid workflow around the given steps.
pub fn workflow(name: &str, steps: Vec<StepRecord>) -> WorkflowDefinition {
    WorkflowDefinition {
        name: name.to_string(),
        version: Version::new(0, 1, 0),
        description: None,
        inputs: BTreeMap::new(),
        outputs: BTreeMap::new(),
        steps,
        execution: ExecutionConfig::default(),
        triggers: Triggers::default(),
    }
}

/// A transform step whose template is built from (output, expression) pairs.
pub fn transform_step(id: &str, template: &[(&str, &str)]) -> StepRecord {
    let mut map = Map::new();
    for (key, expression) in template {
        map.insert((*key).to_string(), json!(expression));
    }
    StepRecord::new(id, ActionKind::Transform).with_template(map)
}

/// Shell command that fails its first `fail_times` runs and succeeds after,
/// tracking attempts in `counter_file`. The file doubles as the attempt
/// count assertion for retry tests.
pub fn flaky_command(counter_file: &Path, fail_times: u32) -> String {
    format!(
        "n=$(cat {path} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {path}; test $n -gt {fail_times}",
        path = counter_file.display(),
    )
}

/// Read the attempt count a [`flaky_command`] left behind.
pub fn read_attempts(counter_file: &Path) -> u32 {
    std::fs::read_to_string(counter_file)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Action handler that records call counts and peak concurrency while
/// holding each call open briefly. Register it over an action kind to
/// observe the executor's scheduling.
pub struct GaugeHandler {
    pub calls: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub hold: Duration,
}

impl GaugeHandler {
    pub fn new(hold: Duration) -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            hold,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for GaugeHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        _inputs: Map<String, Value>,
        _ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let mut outputs = Map::new();
        outputs.insert("step".into(), Value::String(step.id.clone()));
        outputs.insert("ok".into(), Value::Bool(true));
        Ok(outputs)
    }
}
