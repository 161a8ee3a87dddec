//! ABOUTME: Checkpoint record persisted after completed steps
//! ABOUTME: Insertion-only; the most recent record per run wins on resume

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A persisted snapshot of run state taken after a step completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: Uuid,
    pub run_id: String,
    /// Last completed step at the time of the snapshot
    pub step_id: String,
    pub state_snapshot: Value,
    pub created_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(run_id: impl Into<String>, step_id: impl Into<String>, state_snapshot: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id: run_id.into(),
            step_id: step_id.into(),
            state_snapshot,
            created_at: Utc::now(),
        }
    }
}
