//! File write tool: create or overwrite a file.

use std::path::Path;

use async_trait::async_trait;
use helmsman_core::error::ToolError;
use helmsman_core::tool::{ParamType, ParameterSpec, Tool, ToolResult};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::required_str;

pub struct FileWriteTool;

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and missing parent directories, overwrites if it exists."
    }

    fn requires_confirmation(&self) -> bool {
        true
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("path", ParamType::String, "The file path to write to"),
            ParameterSpec::required("content", ParamType::String, "The content to write"),
        ]
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;

        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(format!("Failed to create directory: {e}")));
        }

        match tokio::fs::write(path, content).await {
            Ok(()) => {
                debug!(path = %path, bytes = content.len(), "File written");
                Ok(ToolResult::ok(json!({"path": path, "bytes_written": content.len()})))
            }
            Err(e) => Ok(ToolResult::failure(format!("Failed to write file: {e}"))),
        }
    }

    fn format_result(&self, result: ToolResult) -> ToolResult {
        if result.success {
            ToolResult::ok(json!({"message": "File written successfully"}))
        } else {
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/dir/out.txt");

        let result = FileWriteTool
            .execute(args(json!({"path": target.to_string_lossy(), "content": "hello"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.payload["bytes_written"], 5);
        assert_eq!(std::fs::read_to_string(target).unwrap(), "hello");
    }

    #[tokio::test]
    async fn formatted_result_is_a_short_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");

        let result = FileWriteTool
            .execute(args(json!({"path": target.to_string_lossy(), "content": "hello"})))
            .await
            .unwrap();
        let formatted = FileWriteTool.format_result(result);
        assert_eq!(
            formatted.to_content(),
            r#"{"success":true,"message":"File written successfully"}"#
        );

        let failed = ToolResult::failure("Failed to write file: denied");
        assert_eq!(FileWriteTool.format_result(failed.clone()), failed);
    }

    #[tokio::test]
    async fn missing_content_is_invalid() {
        let result = FileWriteTool.execute(args(json!({"path": "/tmp/x"}))).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[test]
    fn requires_confirmation() {
        assert!(FileWriteTool.requires_confirmation());
    }
}
