//! ABOUTME: Checkpoint store contract and the in-memory reference implementation
//! ABOUTME: Insertion-only; reads return the most recently written record per run

use agentloom_core::error::Result;
use agentloom_core::types::checkpoint::CheckpointRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Narrow persistence interface the executor depends on. Implementations
/// must make writes durable before acknowledging and serialize access per
/// `run_id`; a relational table, a file, or a map all qualify.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a snapshot taken after `step_id` completed
    async fn save(&self, run_id: &str, step_id: &str, state: Value) -> Result<Uuid>;

    /// Most recent record for the run, if any
    async fn load_latest(&self, run_id: &str) -> Result<Option<CheckpointRecord>>;

    /// Every record for the run, oldest first
    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointRecord>>;
}

/// Map-backed store for tests and single-process runs.
pub struct InMemoryCheckpointStore {
    records: Mutex<HashMap<String, Vec<CheckpointRecord>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, run_id: &str, step_id: &str, state: Value) -> Result<Uuid> {
        let record = CheckpointRecord::new(run_id, step_id, state);
        let id = record.id;
        self.records
            .lock()
            .await
            .entry(run_id.to_string())
            .or_default()
            .push(record);
        Ok(id)
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<CheckpointRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .get(run_id)
            .and_then(|records| records.last().cloned()))
    }

    async fn list(&self, run_id: &str) -> Result<Vec<CheckpointRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }
}
