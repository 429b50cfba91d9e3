//! Model client trait: the abstraction over LLM backends.
//!
//! A ModelClient knows how to send the message log plus the available
//! function definitions to a model and return its reply. The orchestrator
//! treats the reply as an opaque protocol boundary: tool calls stay in their
//! raw vendor shape and are normalized later.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::{Message, ToolCallRef};

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) reply from the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Generated text, possibly empty when the model only calls tools
    #[serde(default)]
    pub content: String,

    /// Multi-call format: `[{id, function: {name, arguments}}]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRef>,

    /// Older single-call format: `{name, arguments}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<serde_json::Value>,

    /// Set when generation was cancelled by the user
    #[serde(default)]
    pub interrupted: bool,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded
    #[serde(default)]
    pub model: String,
}

impl ModelResponse {
    /// A plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A reply requesting tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRef>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            ..Self::default()
        }
    }

    /// A reply flagged as interrupted.
    pub fn interrupted() -> Self {
        Self {
            interrupted: true,
            ..Self::default()
        }
    }
}

/// The core ModelClient trait.
///
/// Every backend (OpenAI-compatible endpoints, Ollama, test doubles)
/// implements this trait. Exactly one request is in flight per conversation.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Context window of the configured model, in tokens.
    fn context_size(&self) -> usize;

    /// Send the log and available functions, wait for the complete reply.
    async fn send(
        &self,
        messages: &[Message],
        functions: &[ToolDefinition],
        include_reasoning: bool,
    ) -> std::result::Result<ModelResponse, ProviderError>;
}
