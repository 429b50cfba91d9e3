//! Domain event system: decoupled communication between the core and its surfaces.
//!
//! The orchestrator and dispatcher publish events; the interactive surface
//! subscribes and renders them. Nothing in the core depends on a subscriber
//! being present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A normalized call is about to be dispatched
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// A tool call finished (successfully or with a structured failure)
    ToolExecuted {
        call_id: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A model-issued call had no usable tool name and was skipped
    InvalidToolCall {
        call_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A parallel batch is about to run
    BatchStarted {
        batch_id: String,
        size: usize,
        timestamp: DateTime<Utc>,
    },

    /// The user denied a call or a whole batch
    PermissionDenied {
        tool_name: String,
        batch_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The model produced a final text reply
    ResponseGenerated {
        conversation_id: String,
        model: String,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// The message log was compacted
    ConversationCompacted {
        before_percent: u32,
        after_percent: u32,
        messages_removed: usize,
        automatic: bool,
        timestamp: DateTime<Utc>,
    },

    /// The current turn was cancelled
    TurnInterrupted {
        conversation_id: String,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
