//! Tool dispatch: sequential and parallel execution of normalized calls.
//!
//! The dispatcher never touches the conversation log. It returns one
//! [`CallResult`] per valid call and leaves appending to the orchestrator.
//! Every failure except a permission denial is folded into a failed
//! [`ToolResult`]; a denial aborts the batch through [`PermissionDenied`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{FutureExt, StreamExt, stream};
use helmsman_core::event::{DomainEvent, EventBus};
use helmsman_core::message::Message;
use helmsman_core::permission::PermissionRequest;
use helmsman_core::tool::{ToolRegistry, ToolResult};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cleanup::clean_content;
use crate::normalizer::NormalizedCall;
use crate::permission::{PermissionManager, permission_path};
use crate::redundancy::RedundancyFilter;

/// Upper bound on concurrently running tools in one parallel batch.
pub const MAX_PARALLEL_WORKERS: usize = 5;

const CONTEXT_CHECK_HINT: &str = " Please check your context for the previous result.";

/// Result of one dispatched call, addressed by its call id.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub call_id: String,
    pub tool_name: String,
    pub result: ToolResult,
}

impl CallResult {
    /// The `tool`-role message answering this call.
    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.call_id, &self.tool_name, clean_content(&self.result.to_content()))
    }
}

/// A permission denial that aborted a batch.
///
/// `completed` holds the results of calls that finished before the denial
/// (always empty for a parallel batch, which is approved up front).
/// `denied` is the refused call's own failure result; a denied parallel
/// batch has none because nothing in it was attempted.
#[derive(Debug, thiserror::Error)]
#[error("Permission denied for {tool_name}")]
pub struct PermissionDenied {
    pub tool_name: String,
    pub batch_id: Option<String>,
    pub completed: Vec<CallResult>,
    pub denied: Option<CallResult>,
}

/// Outcome of a single call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Finished(ToolResult),
    Denied(ToolResult),
}

impl CallOutcome {
    pub fn result(&self) -> &ToolResult {
        match self {
            CallOutcome::Finished(result) | CallOutcome::Denied(result) => result,
        }
    }

    pub fn into_result(self) -> ToolResult {
        match self {
            CallOutcome::Finished(result) | CallOutcome::Denied(result) => result,
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, CallOutcome::Denied(_))
    }
}

pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    recent: RedundancyFilter,
    permissions: Arc<PermissionManager>,
    events: Arc<EventBus>,
    check_context_msg: bool,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, permissions: Arc<PermissionManager>, events: Arc<EventBus>) -> Self {
        Self {
            registry,
            recent: RedundancyFilter::new(),
            permissions,
            events,
            check_context_msg: true,
        }
    }

    /// Append the "check your context" hint to redundant-call errors.
    pub fn with_context_check(mut self, enabled: bool) -> Self {
        self.check_context_msg = enabled;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn recent_calls(&self) -> &RedundancyFilter {
        &self.recent
    }

    /// Run one call through the unknown / redundant / permission / execute pipeline.
    pub async fn execute(&self, call: &NormalizedCall, batch_id: Option<&str>) -> CallOutcome {
        let name = call.tool_name.as_str();
        let Some(tool) = self.registry.get(name).cloned() else {
            warn!(tool = %name, call_id = %call.call_id, "Unknown tool requested");
            return CallOutcome::Finished(ToolResult::failure(format!("Unknown tool: {name}")));
        };

        // Records the call when it is not redundant, so a later failure still counts.
        if self.recent.check_and_record(name, &call.arguments) {
            debug!(tool = %name, "Redundant tool call suppressed");
            let mut error = format!("Redundant call to {name}. Directory was already shown.");
            if self.check_context_msg {
                error.push_str(CONTEXT_CHECK_HINT);
            }
            return CallOutcome::Finished(ToolResult::failure(error));
        }

        if tool.requires_confirmation() && !self.permissions.check(name, &call.arguments, batch_id).await {
            info!(tool = %name, call_id = %call.call_id, "Permission denied");
            self.events.publish(DomainEvent::PermissionDenied {
                tool_name: name.to_string(),
                batch_id: batch_id.map(str::to_string),
                timestamp: Utc::now(),
            });
            return CallOutcome::Denied(ToolResult::failure(format!("Permission denied for {name}")));
        }

        self.events.publish(DomainEvent::ToolCallStarted {
            call_id: call.call_id.clone(),
            tool_name: name.to_string(),
            arguments: Value::Object(call.arguments.clone()),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let result = match AssertUnwindSafe(tool.execute(call.arguments.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => tool.format_result(result),
            Ok(Err(e)) => ToolResult::failure(format!("Error executing {name}: {e}")),
            Err(panic) => ToolResult::failure(format!("Error executing {name}: {}", panic_message(panic.as_ref()))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        if result.success {
            debug!(tool = %name, call_id = %call.call_id, duration_ms, "Tool executed");
        } else {
            warn!(tool = %name, call_id = %call.call_id, error = %result.error_message(), "Tool failed");
        }
        self.events.publish(DomainEvent::ToolExecuted {
            call_id: call.call_id.clone(),
            tool_name: name.to_string(),
            success: result.success,
            error: result.error.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        CallOutcome::Finished(result)
    }

    /// Execute calls one at a time in request order.
    ///
    /// A denial stops the batch; the calls after it are never attempted.
    pub async fn execute_sequential(&self, calls: &[NormalizedCall]) -> Result<Vec<CallResult>, PermissionDenied> {
        let mut completed = Vec::with_capacity(calls.len());
        for call in calls {
            if !self.accept(call) {
                continue;
            }
            match self.execute(call, None).await {
                CallOutcome::Denied(result) => {
                    return Err(PermissionDenied {
                        tool_name: call.tool_name.clone(),
                        batch_id: None,
                        completed,
                        denied: Some(CallResult {
                            call_id: call.call_id.clone(),
                            tool_name: call.tool_name.clone(),
                            result,
                        }),
                    });
                }
                CallOutcome::Finished(result) => completed.push(CallResult {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    result,
                }),
            }
        }
        Ok(completed)
    }

    /// Execute calls concurrently after one consolidated approval.
    ///
    /// Results come back in completion order. On denial nothing runs.
    pub async fn execute_parallel(&self, calls: &[NormalizedCall]) -> Result<Vec<CallResult>, PermissionDenied> {
        let valid: Vec<&NormalizedCall> = calls.iter().filter(|c| self.accept(c)).collect();
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let batch_id = format!("parallel-{}", Utc::now().timestamp_millis());
        let protected: Vec<PermissionRequest> = valid
            .iter()
            .filter(|c| self.registry.get(&c.tool_name).is_some_and(|t| t.requires_confirmation()))
            .map(|c| PermissionRequest {
                tool_name: c.tool_name.clone(),
                path: permission_path(&c.tool_name, &c.arguments),
                batch_id: Some(batch_id.clone()),
            })
            .collect();

        if let Some(first) = protected.first().map(|r| r.tool_name.clone())
            && !self.permissions.approve_batch(&batch_id, protected).await
        {
            info!(batch_id = %batch_id, "Parallel batch denied");
            self.events.publish(DomainEvent::PermissionDenied {
                tool_name: first.clone(),
                batch_id: Some(batch_id.clone()),
                timestamp: Utc::now(),
            });
            return Err(PermissionDenied {
                tool_name: first,
                batch_id: Some(batch_id),
                completed: Vec::new(),
                denied: None,
            });
        }

        let workers = valid.len().min(MAX_PARALLEL_WORKERS);
        info!(batch_id = %batch_id, calls = valid.len(), workers, "Executing tool batch in parallel");
        self.events.publish(DomainEvent::BatchStarted {
            batch_id: batch_id.clone(),
            size: valid.len(),
            timestamp: Utc::now(),
        });

        let results: Vec<CallResult> = stream::iter(valid)
            .map(|call| {
                let batch_id = batch_id.as_str();
                async move {
                    let result = self.execute(call, Some(batch_id)).await.into_result();
                    CallResult {
                        call_id: call.call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        result,
                    }
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        self.permissions.forget_batch(&batch_id);
        Ok(results)
    }

    fn accept(&self, call: &NormalizedCall) -> bool {
        if call.is_valid() {
            return true;
        }
        warn!(call_id = %call.call_id, "Skipping tool call without a name");
        self.events.publish(DomainEvent::InvalidToolCall {
            call_id: call.call_id.clone(),
            timestamp: Utc::now(),
        });
        false
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_string()
    }
}
