//! ABOUTME: Error types and handling for agentloom
//! ABOUTME: Provides the LoomError enum, error kind tags, and the Result alias

use std::fmt;
use thiserror::Error;

/// Classification of expression evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionErrorKind {
    /// An identifier was not present in the evaluation context
    UnknownName,
    /// An operation was applied to a value of the wrong type
    BadType,
    /// The expression text could not be parsed
    Parse,
    /// A function outside the allowlist was called
    UnknownFunction,
    /// A filter outside the allowlist was applied
    UnknownFilter,
}

impl fmt::Display for ExpressionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnknownName => "unknown_name",
            Self::BadType => "bad_type",
            Self::Parse => "parse",
            Self::UnknownFunction => "unknown_function",
            Self::UnknownFilter => "unknown_filter",
        };
        write!(f, "{s}")
    }
}

/// Which of the three nested timeouts expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    Step,
    Agent,
    Workflow,
}

impl fmt::Display for TimeoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Step => "step",
            Self::Agent => "agent",
            Self::Workflow => "workflow",
        };
        write!(f, "{s}")
    }
}

/// Comprehensive error enum for all agentloom operations.
///
/// Every variant carries a human-readable message; variant-specific fields
/// carry the structured detail the API boundary needs (step names, exit
/// codes, cycle paths). `tag()` maps each variant to the stable string tag
/// surfaced in step results.
#[derive(Debug, Error)]
pub enum LoomError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Provider error: {message}")]
    Provider {
        message: String,
        provider: Option<String>,
        retriable: bool,
    },

    #[error("Expression error ({kind}): {message}")]
    Expression {
        message: String,
        kind: ExpressionErrorKind,
    },

    #[error("Workflow error: {message}")]
    Workflow {
        message: String,
        step: Option<String>,
    },

    #[error("Circular dependency detected: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Command failed: {message}")]
    Command {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("{scope} timeout after {seconds}s")]
    Timeout { scope: TimeoutScope, seconds: u64 },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Dependency failed for step '{step}'")]
    DependencyFailed { step: String },

    #[error("Statechart is in final state '{state}' and refuses further events")]
    FinalState { state: String },

    #[error("Statechart error: {message}")]
    Statechart {
        message: String,
        state: Option<String>,
    },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    #[error("Agent error: {message}")]
    Agent {
        message: String,
        agent: Option<String>,
    },

    #[error("Sensor error: {message}")]
    Sensor {
        message: String,
        sensor: Option<String>,
    },
}

impl LoomError {
    /// Create a validation error without a field reference
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error attributed to a specific field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Stable string tag for the API boundary. Step results carry this tag
    /// in `error`; the narrative message travels separately.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Configuration { .. } => "config_error",
            Self::NotFound { .. } => "not_found",
            Self::Provider { .. } => "provider_error",
            Self::Expression { .. } => "expression_error",
            Self::Workflow { .. } => "workflow_error",
            Self::Cycle { .. } => "cycle_detected",
            Self::Command { .. } => "command_failed",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled => "cancelled",
            Self::DependencyFailed { .. } => "dependency_failed",
            Self::FinalState { .. } => "final_state",
            Self::Statechart { .. } => "statechart_error",
            Self::Checkpoint { .. } => "checkpoint_error",
            Self::Agent { .. } => "agent_llm_failed",
            Self::Sensor { .. } => "sensor_error",
        }
    }

    /// Whether the retry envelope may re-attempt after this error.
    /// Definition-shaped failures repeat identically, so retrying them
    /// only burns the attempt budget.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Provider { retriable, .. } => *retriable,
            Self::Validation { .. }
            | Self::Configuration { .. }
            | Self::NotFound { .. }
            | Self::Expression { .. }
            | Self::Cycle { .. }
            | Self::Cancelled
            | Self::DependencyFailed { .. }
            | Self::FinalState { .. }
            | Self::Statechart { .. } => false,
            _ => true,
        }
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, LoomError>;
