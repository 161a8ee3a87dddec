//! ABOUTME: Sensor kernel: per-sensor debounce and fingerprint dedup, then workflow submission
//! ABOUTME: Fingerprints are sha-256 over canonical event JSON in a bounded FIFO with TTL

use crate::definition::{ErrorPolicyMode, SensorDefinition};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::result::{WorkflowResult, WorkflowStatus};
use agentloom_workflows::{Engine, ExecuteOptions};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default bound on remembered fingerprints per sensor
const DEDUP_CAPACITY: usize = 256;

/// Default fingerprint lifetime
const DEDUP_TTL: Duration = Duration::from_secs(600);

/// Per-sensor counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorMetrics {
    pub events_seen: u64,
    pub fired: u64,
    pub debounced: u64,
    pub deduplicated: u64,
    pub filtered: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
}

/// What the kernel did with one event.
#[derive(Debug)]
pub enum FireOutcome {
    /// The target workflow ran; its result is attached
    Fired(WorkflowResult),
    /// Inside the debounce window
    Debounced,
    /// Fingerprint already seen
    Duplicate,
    /// Condition or filter rejected the event
    Filtered,
    /// The sensor is disabled
    Disabled,
}

struct SensorEntry {
    def: SensorDefinition,
    enabled: bool,
    last_fire: Option<Instant>,
    fingerprints: VecDeque<(Instant, [u8; 32])>,
    metrics: SensorMetrics,
}

/// Registry of sensors plus the two cross-cutting behaviors: debounce on
/// `last_fire_time` and content-addressed deduplication.
pub struct SensorKernel {
    engine: Arc<Engine>,
    sensors: DashMap<String, SensorEntry>,
    dedup_capacity: usize,
    dedup_ttl: Duration,
}

/// Stable serialization with object keys sorted, so fingerprints ignore
/// field order.
fn canonical_json(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                out.extend_from_slice(key.as_bytes());
                out.push(b':');
                canonical_json(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                canonical_json(item, out);
            }
            out.push(b']');
        }
        other => out.extend_from_slice(other.to_string().as_bytes()),
    }
}

fn fingerprint(event: &Value) -> [u8; 32] {
    let mut bytes = Vec::new();
    canonical_json(event, &mut bytes);
    Sha256::digest(&bytes).into()
}

/// Symbols an event exposes to trigger conditions and input bindings:
/// object fields at the top level plus the whole payload under `event`.
fn event_context(event: &Value) -> Map<String, Value> {
    let mut context = match event {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    context.insert("event".to_string(), event.clone());
    context
}

impl SensorKernel {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            sensors: DashMap::new(),
            dedup_capacity: DEDUP_CAPACITY,
            dedup_ttl: DEDUP_TTL,
        }
    }

    pub fn with_dedup(mut self, capacity: usize, ttl: Duration) -> Self {
        self.dedup_capacity = capacity;
        self.dedup_ttl = ttl;
        self
    }

    /// Validate and register a sensor. The target workflow must already be
    /// registered with the engine.
    pub fn register(&self, def: SensorDefinition) -> Result<()> {
        def.validate()?;
        self.engine.get_workflow(&def.target.workflow)?;
        info!(sensor = %def.id, workflow = %def.target.workflow, "sensor registered");
        let enabled = def.enabled;
        self.sensors.insert(
            def.id.clone(),
            SensorEntry {
                def,
                enabled,
                last_fire: None,
                fingerprints: VecDeque::new(),
                metrics: SensorMetrics::default(),
            },
        );
        Ok(())
    }

    pub fn set_enabled(&self, sensor_id: &str, enabled: bool) -> Result<()> {
        let mut entry = self.entry(sensor_id)?;
        entry.enabled = enabled;
        Ok(())
    }

    pub fn metrics(&self, sensor_id: &str) -> Result<SensorMetrics> {
        Ok(self.entry(sensor_id)?.metrics.clone())
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sensors.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn entry(
        &self,
        sensor_id: &str,
    ) -> Result<dashmap::mapref::one::RefMut<'_, String, SensorEntry>> {
        self.sensors
            .get_mut(sensor_id)
            .ok_or_else(|| LoomError::NotFound {
                kind: "sensor",
                name: sensor_id.to_string(),
            })
    }

    /// Feed one event to a sensor: filter, debounce, deduplicate, and on a
    /// firing resolve input bindings and submit the target workflow.
    pub async fn handle_event(&self, sensor_id: &str, event: &Value) -> Result<FireOutcome> {
        let now = Instant::now();
        let context = event_context(event);

        // Gate-keeping under the map guard; the guard is dropped before the
        // workflow runs.
        let (workflow, inputs) = {
            let mut guard = self.entry(sensor_id)?;
            let entry = &mut *guard;
            if !entry.enabled {
                return Ok(FireOutcome::Disabled);
            }
            entry.metrics.events_seen += 1;

            for predicate in [&entry.def.trigger.condition, &entry.def.trigger.filter]
                .into_iter()
                .flatten()
            {
                if !agentloom_expr::evaluate_predicate(predicate, &context)? {
                    debug!(sensor = %sensor_id, "event filtered");
                    entry.metrics.filtered += 1;
                    return Ok(FireOutcome::Filtered);
                }
            }

            let window = Duration::from_millis(entry.def.trigger.debounce_ms);
            if let Some(last) = entry.last_fire {
                if now.duration_since(last) < window {
                    debug!(sensor = %sensor_id, "event debounced");
                    entry.metrics.debounced += 1;
                    return Ok(FireOutcome::Debounced);
                }
            }

            let ttl = self.dedup_ttl;
            entry
                .fingerprints
                .retain(|(seen, _)| now.duration_since(*seen) < ttl);
            let print = fingerprint(event);
            if entry.fingerprints.iter().any(|(_, seen)| *seen == print) {
                debug!(sensor = %sensor_id, "event deduplicated");
                entry.metrics.deduplicated += 1;
                return Ok(FireOutcome::Duplicate);
            }

            // Commit to firing: start the debounce window and remember the
            // fingerprint before the workflow runs.
            entry.last_fire = Some(now);
            entry.fingerprints.push_back((now, print));
            while entry.fingerprints.len() > self.dedup_capacity {
                entry.fingerprints.pop_front();
            }

            let mut inputs = Map::new();
            for (name, binding) in &entry.def.target.input_bindings {
                inputs.insert(
                    name.clone(),
                    agentloom_expr::render_template(binding, &context)?,
                );
            }
            (entry.def.target.workflow.clone(), inputs)
        };

        info!(sensor = %sensor_id, workflow = %workflow, "sensor fired");
        let outcome = self
            .engine
            .execute_workflow(&workflow, inputs, ExecuteOptions::default())
            .await;

        match outcome {
            Ok(result) if result.status == WorkflowStatus::Success => {
                let mut entry = self.entry(sensor_id)?;
                entry.metrics.fired += 1;
                entry.metrics.consecutive_failures = 0;
                Ok(FireOutcome::Fired(result))
            }
            Ok(result) => {
                self.note_failure(sensor_id, &format!("workflow status {:?}", result.status))?;
                Ok(FireOutcome::Fired(result))
            }
            Err(err) => {
                self.note_failure(sensor_id, &err.to_string())?;
                Err(err)
            }
        }
    }

    fn note_failure(&self, sensor_id: &str, detail: &str) -> Result<()> {
        let mut guard = self.entry(sensor_id)?;
        let entry = &mut *guard;
        entry.metrics.fired += 1;
        entry.metrics.failures += 1;
        entry.metrics.consecutive_failures += 1;
        let consecutive = entry.metrics.consecutive_failures;
        warn!(sensor = %sensor_id, consecutive, detail, "target workflow failed");

        match entry.def.error_policy.mode {
            ErrorPolicyMode::Retry => {}
            ErrorPolicyMode::Alert => {
                if consecutive >= entry.def.error_policy.alert_after {
                    error!(sensor = %sensor_id, consecutive, "sensor failure alert");
                }
            }
            ErrorPolicyMode::Disable => {
                if consecutive >= entry.def.error_policy.max_retries {
                    warn!(sensor = %sensor_id, "disabling sensor after repeated failures");
                    entry.enabled = false;
                }
            }
        }
        Ok(())
    }
}
