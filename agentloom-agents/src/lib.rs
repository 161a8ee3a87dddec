//! ABOUTME: Agent runtime for agentloom
//! ABOUTME: Builds prompts from typed definitions, calls the router, parses outputs

pub mod parser;
pub mod prompt;
pub mod runtime;

pub use parser::{parse_agent_output, ParsedOutput};
pub use prompt::{build_messages, synthesize_system_prompt};
pub use runtime::{AgentRuntime, InvokeOptions};
