//! Directory listing tool.

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{ParamType, ParameterSpec, Tool, ToolResult};
use serde_json::{Map, Value, json};

pub struct LsTool;

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Hidden entries are skipped unless `all` is true."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::optional("path", ParamType::String, "Directory to list (default: current directory)"),
            ParameterSpec::optional("all", ParamType::Boolean, "Include hidden entries"),
        ]
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let path = arguments.get("path").and_then(Value::as_str).unwrap_or(".");
        let all = arguments.get("all").and_then(Value::as_bool).unwrap_or(false);

        let mut dir = match tokio::fs::read_dir(path).await {
            Ok(dir) => dir,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to list directory {path}: {e}"))),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "ls".into(),
            reason: e.to_string(),
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if !all && name.starts_with('.') {
                continue;
            }
            let kind = match entry.file_type().await {
                Ok(t) if t.is_dir() => "directory",
                Ok(t) if t.is_symlink() => "symlink",
                _ => "file",
            };
            entries.push((name, kind));
        }
        entries.sort();

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, kind)| json!({"name": name, "type": kind}))
            .collect();
        Ok(ToolResult::ok(json!({"path": path, "entries": entries})))
    }
}
