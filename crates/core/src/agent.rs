//! Conversation state and turn outcome types.

use serde::{Deserialize, Serialize};

/// Where the orchestrator is within a turn.
///
/// `Idle → AwaitingModelResponse → (ProcessingToolCalls → AwaitingModelResponse)* → Idle`,
/// with `Interrupted` reachable from `AwaitingModelResponse`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting for user input
    #[default]
    Idle,
    /// A model request is in flight
    AwaitingModelResponse,
    /// Tool calls from the last reply are being dispatched
    ProcessingToolCalls,
    /// The last turn was cancelled; the next input starts fresh
    Interrupted,
}

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered with plain text
    Completed(String),
    /// The user cancelled generation
    Interrupted,
    /// The user denied permission for a tool call
    PermissionDenied(String),
    /// The follow-up loop hit its bound before a text answer
    FollowUpLimit,
}

impl TurnOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TurnOutcome::Completed(_))
    }
}
