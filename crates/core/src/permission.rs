//! Permission gate contract.
//!
//! The trust decision itself lives outside the core (an interactive prompt,
//! a policy file, a test double). The core only needs a yes/no answer for a
//! single call or for a whole batch of calls from one model turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Human-readable subject shown when approving a side-effecting call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PermissionPath {
    /// The shell tool's whole argument mapping, so the literal command is visible.
    Command(serde_json::Map<String, serde_json::Value>),
    /// A file or directory path.
    Path(String),
    /// Nothing meaningful to show.
    None,
}

impl PermissionPath {
    /// One-line description of the operation, used in prompts.
    pub fn describe(&self, tool_name: &str) -> String {
        match self {
            PermissionPath::Command(args) => {
                let command = args
                    .get("command")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                format!("Execute command: {command}")
            }
            PermissionPath::Path(path) => format!("{tool_name} on path: {path}"),
            PermissionPath::None => format!("{tool_name} operation"),
        }
    }
}

/// A single call awaiting approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub tool_name: String,
    pub path: PermissionPath,
    /// Set when the call belongs to a parallel batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

/// One consolidated approval request covering every protected call of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchApproval {
    pub batch_id: String,
    pub requests: Vec<PermissionRequest>,
    /// Pre-rendered prompt listing every operation.
    pub prompt: String,
}

/// External trust decision.
///
/// Implementations may block on user input. Returning `false` is a denial,
/// which callers keep distinct from a tool failure.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Approve or deny one call.
    async fn check_permission(&self, request: &PermissionRequest) -> bool;

    /// Approve or deny a whole batch with one decision.
    async fn approve_batch(&self, approval: &BatchApproval) -> bool;
}
