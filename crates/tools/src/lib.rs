//! Built-in tool implementations for Helmsman.
//!
//! Tools give the model the ability to act on the workspace:
//! list directories, read and write files, and run shell commands.
//! Side-effecting tools (`file_write`, `bash`) require confirmation.

pub mod file_read;
pub mod file_write;
pub mod ls;
pub mod shell;

use std::sync::Arc;

use helmsman_core::error::ToolError;
use helmsman_core::tool::ToolRegistry;
use serde_json::{Map, Value};

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use ls::LsTool;
pub use shell::ShellTool;

/// Create a registry with every built-in tool.
pub fn default_registry(bash_timeout_secs: u64) -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(LsTool))
        .with(Arc::new(FileReadTool::new()))
        .with(Arc::new(FileWriteTool))
        .with(Arc::new(ShellTool::new(bash_timeout_secs)))
}

/// A required string argument, or `InvalidArguments`.
pub(crate) fn required_str<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}
