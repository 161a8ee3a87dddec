//! ABOUTME: run-command handler: shell out with resolved inputs as environment variables

use super::{ActionHandler, StepContext};
use agentloom_core::error::{LoomError, Result};
use agentloom_core::types::workflow::StepRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::debug;

pub struct RunCommandHandler;

/// Environment values are string-serialized: strings pass through bare,
/// everything else as JSON.
fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ActionHandler for RunCommandHandler {
    async fn execute(
        &self,
        step: &StepRecord,
        inputs: Map<String, Value>,
        _ctx: StepContext<'_>,
    ) -> Result<Map<String, Value>> {
        let command_line = step.command.as_deref().ok_or_else(|| LoomError::Workflow {
            message: "run-command step has no command".to_string(),
            step: Some(step.id.clone()),
        })?;

        debug!(step = %step.id, command = %command_line, "launching subprocess");

        let mut command = Command::new("sh");
        command.arg("-c").arg(command_line);
        command.kill_on_drop(true);
        for (key, value) in &inputs {
            command.env(key, env_value(value));
        }

        let output = command.output().await.map_err(|e| LoomError::Command {
            message: format!("failed to launch '{command_line}': {e}"),
            exit_code: None,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let exit_code = output.status.code();
            return Err(LoomError::Command {
                message: format!(
                    "command exited with {}: {}",
                    exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                ),
                exit_code,
            });
        }

        let mut outputs = Map::new();
        outputs.insert("stdout".into(), Value::String(stdout));
        outputs.insert("stderr".into(), Value::String(stderr));
        outputs.insert("return_code".into(), Value::from(0));
        Ok(outputs)
    }
}
