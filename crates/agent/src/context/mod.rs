//! Context budget: token estimation and compaction.

pub mod compaction;
pub mod token;

pub use compaction::{COMPACTION_NOTICE, compact};
pub use token::TokenTracker;
