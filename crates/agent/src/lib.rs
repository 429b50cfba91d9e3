//! The Helmsman orchestration core.
//!
//! A user turn flows through these pieces:
//!
//! 1. **Orchestrator** appends the input and asks the model
//! 2. **Normalizer** turns each raw tool call into `(call_id, tool_name, arguments)`
//! 3. **Dispatcher** runs the calls, sequentially or on a bounded parallel pool,
//!    after the **redundancy filter** and the **permission manager** had their say
//! 4. Tool results go back into the log and the model is asked again
//!
//! The **token tracker** watches the log and triggers compaction when the
//! context window runs full.

pub mod cleanup;
pub mod commands;
pub mod context;
pub mod dispatcher;
pub mod normalizer;
pub mod orchestrator;
pub mod permission;
pub mod redundancy;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use commands::{Command, CommandOutcome};
pub use context::{TokenTracker, compact};
pub use dispatcher::{CallOutcome, CallResult, PermissionDenied, ToolDispatcher};
pub use normalizer::{NormalizedCall, normalize};
pub use orchestrator::{CompactionReport, InterruptHandle, Orchestrator};
pub use permission::PermissionManager;
pub use redundancy::RedundancyFilter;
