//! Permission handling in front of the external trust decision.
//!
//! [`PermissionManager`] adds two things on top of a [`PermissionGate`]:
//! an `auto_confirm` switch, and memory of approved batch ids so that the
//! per-call check inside an approved parallel batch does not prompt again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use helmsman_core::permission::{BatchApproval, PermissionGate, PermissionPath, PermissionRequest};
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Name of the shell-execution tool; its approval shows the whole argument mapping.
pub const SHELL_TOOL: &str = "bash";

const PATH_ARGUMENTS: [&str; 2] = ["path", "file_path"];

/// Derive the subject shown to the user when approving a call.
pub fn permission_path(tool_name: &str, arguments: &Map<String, Value>) -> PermissionPath {
    if tool_name == SHELL_TOOL {
        return PermissionPath::Command(arguments.clone());
    }

    arguments
        .iter()
        .find_map(|(name, value)| match value {
            Value::String(path) if PATH_ARGUMENTS.contains(&name.as_str()) => {
                Some(PermissionPath::Path(path.clone()))
            }
            _ => None,
        })
        .unwrap_or(PermissionPath::None)
}

/// Render the consolidated prompt for a batch of protected calls.
pub fn batch_prompt(requests: &[PermissionRequest]) -> String {
    let mut text = String::from("Permission required for the following operations:\n");
    for (i, req) in requests.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, req.path.describe(&req.tool_name)));
    }
    text
}

pub struct PermissionManager {
    gate: Arc<dyn PermissionGate>,
    auto_confirm: AtomicBool,
    approved_batches: Mutex<HashSet<String>>,
}

impl PermissionManager {
    pub fn new(gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            gate,
            auto_confirm: AtomicBool::new(false),
            approved_batches: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_auto_confirm(self, enabled: bool) -> Self {
        self.set_auto_confirm(enabled);
        self
    }

    pub fn set_auto_confirm(&self, enabled: bool) {
        self.auto_confirm.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_confirm(&self) -> bool {
        self.auto_confirm.load(Ordering::SeqCst)
    }

    /// Approve or deny a single protected call.
    ///
    /// Inside an already-approved batch this is a no-op approval.
    pub async fn check(&self, tool_name: &str, arguments: &Map<String, Value>, batch_id: Option<&str>) -> bool {
        if self.auto_confirm() {
            return true;
        }
        if let Some(id) = batch_id
            && self.is_batch_approved(id)
        {
            debug!(tool = %tool_name, batch_id = %id, "Covered by batch approval");
            return true;
        }

        let request = PermissionRequest {
            tool_name: tool_name.to_string(),
            path: permission_path(tool_name, arguments),
            batch_id: batch_id.map(str::to_string),
        };
        self.gate.check_permission(&request).await
    }

    /// One decision for every protected call of a parallel batch.
    pub async fn approve_batch(&self, batch_id: &str, requests: Vec<PermissionRequest>) -> bool {
        if requests.is_empty() || self.auto_confirm() {
            self.remember_batch(batch_id);
            return true;
        }

        let approval = BatchApproval {
            batch_id: batch_id.to_string(),
            prompt: batch_prompt(&requests),
            requests,
        };
        let approved = self.gate.approve_batch(&approval).await;
        info!(batch_id = %batch_id, operations = approval.requests.len(), approved, "Batch permission decided");
        if approved {
            self.remember_batch(batch_id);
        }
        approved
    }

    /// Drop a finished batch so its approval cannot leak into later calls.
    pub fn forget_batch(&self, batch_id: &str) {
        self.batches().remove(batch_id);
    }

    pub fn is_batch_approved(&self, batch_id: &str) -> bool {
        self.batches().contains(batch_id)
    }

    fn remember_batch(&self, batch_id: &str) {
        self.batches().insert(batch_id.to_string());
    }

    fn batches(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.approved_batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
