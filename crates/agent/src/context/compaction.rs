//! Lossy history truncation.

use helmsman_core::message::{Message, Role};

/// Logs shorter than this are never compacted.
pub const MIN_MESSAGES_FOR_COMPACTION: usize = 4;

pub const COMPACTION_NOTICE: &str =
    "Conversation history compacted to save context space. Earlier messages were removed; \
     the original request and the most recent exchanges are kept.";

/// Compact a log to `[first system, first user, notice, last keep_recent]`.
///
/// Returns `None` when the log is too short to bother. Earlier compaction
/// notices are dropped, so the result holds exactly one. Tool results whose
/// calling assistant message falls outside the tail are dropped with it.
pub fn compact(messages: &[Message], keep_recent: usize) -> Option<Vec<Message>> {
    if messages.len() < MIN_MESSAGES_FOR_COMPACTION {
        return None;
    }

    let system = messages
        .iter()
        .position(|m| m.role == Role::System && !m.is_compaction_notice());
    let first_user = messages.iter().position(|m| m.role == Role::User);

    let remaining: Vec<&Message> = messages
        .iter()
        .enumerate()
        .filter(|(i, m)| Some(*i) != system && Some(*i) != first_user && !m.is_compaction_notice())
        .map(|(_, m)| m)
        .collect();
    let mut start = remaining.len().saturating_sub(keep_recent);
    // A tool result cannot open the tail once its assistant call is gone.
    while start < remaining.len() && remaining[start].role == Role::Tool {
        start += 1;
    }
    let tail = &remaining[start..];

    let mut compacted = Vec::with_capacity(keep_recent + 3);
    compacted.extend(system.map(|i| messages[i].clone()));
    compacted.extend(first_user.map(|i| messages[i].clone()));
    compacted.push(Message::compaction_notice(COMPACTION_NOTICE));
    compacted.extend(tail.iter().map(|m| (*m).clone()));
    Some(compacted)
}
