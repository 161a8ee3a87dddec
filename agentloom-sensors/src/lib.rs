//! ABOUTME: Sensor/trigger kernel for agentloom
//! ABOUTME: Debounce windows, fingerprint deduplication, error policies, workflow submission

pub mod definition;
pub mod kernel;

pub use definition::{
    ErrorPolicy, ErrorPolicyMode, EvaluationConfig, EvaluationMode, SensorDefinition, SensorType,
    TargetConfig, TriggerConfig,
};
pub use kernel::{FireOutcome, SensorKernel, SensorMetrics};
