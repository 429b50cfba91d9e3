//! File read tool: read file contents, optionally a line range.

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{ParamType, ParameterSpec, Tool, ToolResult};
use serde_json::{Map, Value, json};

use crate::required_str;

/// Default cap on returned characters.
const DEFAULT_MAX_CHARS: usize = 100_000;

pub struct FileReadTool {
    max_chars: usize,
}

impl FileReadTool {
    pub fn new() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_max_chars(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("path", ParamType::String, "The file path to read"),
            ParameterSpec::optional("offset", ParamType::Integer, "First line to return (0-based)"),
            ParameterSpec::optional("limit", ParamType::Integer, "Maximum number of lines to return"),
        ]
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let offset = arguments.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
        let limit = arguments.get("limit").and_then(Value::as_u64).map(|l| l as usize);

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => return Ok(ToolResult::failure(format!("Failed to read file: {e}"))),
        };

        let total_lines = content.lines().count();
        let mut selected = if offset > 0 || limit.is_some() {
            content
                .lines()
                .skip(offset)
                .take(limit.unwrap_or(usize::MAX))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            content
        };

        let truncated = selected.chars().count() > self.max_chars;
        if truncated {
            selected = selected.chars().take(self.max_chars).collect();
        }

        Ok(ToolResult::ok(json!({
            "path": path,
            "content": selected,
            "total_lines": total_lines,
            "truncated": truncated,
        })))
    }

    fn format_result(&self, result: ToolResult) -> ToolResult {
        if !result.success {
            return result;
        }
        let chars = result.payload.get("content").and_then(Value::as_str).map_or(0, |c| c.chars().count());
        result.with("description", format!("Successfully read file with {chars} characters"))
    }
}
