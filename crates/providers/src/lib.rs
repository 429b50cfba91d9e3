//! Model client implementations for Helmsman.
//!
//! Every client implements `helmsman_core::ModelClient`. The orchestrator
//! only sees raw responses; tool call shapes are normalized downstream.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;
