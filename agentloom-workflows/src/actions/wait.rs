//! ABOUTME: wait handler: fixed sleep or polled condition, cancellation-aware

use super::{ActionHandler, StepContext};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

/// Polling cadence for `wait_condition`
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on condition polling when the step declares no timeout
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;

pub struct WaitHandler;

fn wait_outputs(waited_seconds: u64, condition_met: bool) -> Map<String, Value> {
    let mut outputs = Map::new();
    outputs.insert("waited_seconds".into(), Value::from(waited_seconds));
    outputs.insert("condition_met".into(), Value::Bool(condition_met));
    outputs
}

#[async_trait]
impl ActionHandler for WaitHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        _inputs: Map<String, Value>,
        ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        if let Some(duration) = step.duration_seconds {
            debug!(step = %step.id, duration, "sleeping");
            tokio::select! {
                () = ctx.run.cancel.cancelled() => return Err(LoomError::Cancelled),
                () = tokio::time::sleep(Duration::from_secs(duration)) => {}
            }
            return Ok(wait_outputs(duration, true));
        }

        let condition = step
            .wait_condition
            .as_deref()
            .ok_or_else(|| LoomError::Workflow {
                message: "wait step has neither duration_seconds nor wait_condition".to_string(),
                step: Some(step.id.clone()),
            })?;

        let deadline = Duration::from_secs(
            step.timeout_seconds.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS),
        );
        let started = tokio::time::Instant::now();

        loop {
            if agentloom_expr::evaluate_predicate(condition, ctx.state)? {
                return Ok(wait_outputs(started.elapsed().as_secs(), true));
            }
            if started.elapsed() >= deadline {
                debug!(step = %step.id, "wait condition never held");
                return Ok(wait_outputs(started.elapsed().as_secs(), false));
            }
            tokio::select! {
                () = ctx.run.cancel.cancelled() => return Err(LoomError::Cancelled),
                () = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }
}
