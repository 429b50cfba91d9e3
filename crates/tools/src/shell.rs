//! Shell tool: run a command through `sh -c` with a timeout.

use std::time::Duration;

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{ParamType, ParameterSpec, Tool, ToolResult};
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::required_str;

pub struct ShellTool {
    timeout_secs: u64,
}

impl ShellTool {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return stdout, stderr, and the exit code."
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("command", ParamType::String, "The shell command to execute"),
            ParameterSpec::optional("timeout", ParamType::Integer, "Timeout in seconds"),
        ]
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let command = required_str(&arguments, "command")?;
        let timeout_secs = arguments
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(self.timeout_secs);

        debug!(command = %command, timeout_secs, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "bash".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "bash".into(),
                    timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            return Ok(ToolResult::ok(json!({
                "stdout": stdout,
                "stderr": stderr,
                "exit_code": code,
            })));
        }

        warn!(command = %command, exit_code = code, "Command failed");
        Ok(ToolResult::failure(format!("Command exited with code {code}"))
            .with("stdout", stdout)
            .with("stderr", stderr)
            .with("exit_code", code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn execute_echo() {
        let result = ShellTool::new(10)
            .execute(args(json!({"command": "echo hello"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.payload["stdout"], "hello");
        assert_eq!(result.payload["exit_code"], 0);
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_result() {
        let result = ShellTool::new(10)
            .execute(args(json!({"command": "echo oops 1>&2; exit 3"})))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_message(), "Command exited with code 3");
        assert_eq!(result.payload["stderr"], "oops");
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let result = ShellTool::new(10)
            .execute(args(json!({"command": "sleep 5", "timeout": 1})))
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { timeout_secs: 1, .. })));
    }

    #[tokio::test]
    async fn missing_command() {
        let result = ShellTool::new(10).execute(Map::new()).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
