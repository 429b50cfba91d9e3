//! # Helmsman Core
//!
//! Domain types, traits, and error definitions for the Helmsman tool-calling
//! orchestrator. This crate has **no framework dependencies**; it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model client, tool, permission gate) is a
//! trait here. Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod permission;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentState, TurnOutcome};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{Conversation, ConversationId, Message, Role, ToolCallRef};
pub use permission::{BatchApproval, PermissionGate, PermissionPath, PermissionRequest};
pub use provider::{ModelClient, ModelResponse, ToolDefinition, Usage};
pub use tool::{ParamType, ParameterSpec, Tool, ToolRegistry, ToolResult};
