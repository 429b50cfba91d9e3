//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the orchestrator:
//! user input → model request → tool calls → tool results → follow-up request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key marking synthetic messages inserted by the orchestrator.
pub const KIND_KEY: &str = "kind";

/// Metadata value for the system message inserted by compaction.
pub const COMPACTION_NOTICE_KIND: &str = "compaction_notice";

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions and orchestrator notices
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A raw, model-supplied tool invocation.
///
/// The shape depends on the vendor: usually `{id, type, function: {name, arguments}}`,
/// sometimes a bare `{name, arguments}` object. It is kept verbatim so that the
/// normalizer sees exactly what the model produced and the follow-up request
/// echoes it back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolCallRef(pub serde_json::Value);

impl ToolCallRef {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// Build the standard `{id, type: "function", function: {name, arguments}}` shape.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<serde_json::Value>,
    ) -> Self {
        Self(serde_json::json!({
            "id": id.into(),
            "type": "function",
            "function": {
                "name": name.into(),
                "arguments": arguments.into(),
            }
        }))
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.0
    }

    /// The model-supplied call id, if present and non-empty.
    pub fn id(&self) -> Option<&str> {
        self.0
            .get("id")
            .and_then(|v| v.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Fill in the call id when the model did not supply one.
    pub fn ensure_id(&mut self, id: &str) {
        if self.id().is_some() {
            return;
        }
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("id".into(), serde_json::Value::String(id.to_string()));
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    #[serde(default)]
    pub content: String,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name for tool-role messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRef>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (orchestrator markers, provider info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            name: None,
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRef>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content);
        msg.tool_calls = tool_calls;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg.name = Some(tool_name.into());
        msg
    }

    /// Create the system message that marks a compaction point.
    pub fn compaction_notice(content: impl Into<String>) -> Self {
        let mut msg = Self::system(content);
        msg.metadata.insert(
            KIND_KEY.into(),
            serde_json::Value::String(COMPACTION_NOTICE_KIND.into()),
        );
        msg
    }

    pub fn is_compaction_notice(&self) -> bool {
        self.role == Role::System
            && self.metadata.get(KIND_KEY).and_then(|v| v.as_str()) == Some(COMPACTION_NOTICE_KIND)
    }
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the log last changed
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Swap the whole log in one step (compaction, `/clear`).
    pub fn replace(&mut self, messages: Vec<Message>) {
        self.updated_at = Utc::now();
        self.messages = messages;
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Serialize the log as a pretty JSON array of messages.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.messages)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
