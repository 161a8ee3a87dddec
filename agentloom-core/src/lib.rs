//! ABOUTME: Core types, errors, and registries for agentloom
//! ABOUTME: Foundation layer shared by every other crate in the workspace

pub mod error;
pub mod registry;
pub mod types;

// Re-export commonly used types
pub use error::{ExpressionErrorKind, LoomError, Result, TimeoutScope};
pub use registry::{Definition, Registry};
pub use types::{
    agent::{AgentConstraints, AgentDefinition, AgentMetadata, AgentRole, PromptTemplates},
    checkpoint::CheckpointRecord,
    llm::{ChatMessage, ChatRole, LlmResponse},
    params::{ParamSpec, ParamType},
    result::{AgentResult, StepResult, StepStatus, WorkflowResult, WorkflowStatus},
    workflow::{
        ActionKind, ExecutionConfig, ExecutionMode, RetryPolicy, StepRecord, Triggers,
        WorkflowDefinition,
    },
    Version,
};
