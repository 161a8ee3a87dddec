//! ABOUTME: Workflow execution kernel for agentloom
//! ABOUTME: DAG layering, action dispatch, retry/timeout/cancel envelopes, checkpointed resume

pub mod actions;
pub mod checkpoint;
pub mod dag;
pub mod engine;
pub mod executor;
pub mod planner;
pub mod state;

pub use actions::{ActionHandler, ActionRegistry, StepContext};
pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore};
pub use dag::build_layers;
pub use engine::{exit_code, Engine, ExecuteOptions};
pub use executor::{RunHandle, WorkflowExecutor};
pub use planner::{plan, DryRunPlan, StepPlan};
pub use state::RunState;
