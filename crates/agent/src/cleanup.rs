//! Vendor tag stripping and the interruption sentinels.

use std::sync::LazyLock;

use regex_lite::Regex;

/// Assistant content recorded when the user cancels generation.
pub const INTERRUPTED: &str = "[Request interrupted by user]";

/// Assistant content recorded when the user cancels tool use.
pub const INTERRUPTED_FOR_TOOL_USE: &str = "[Request interrupted by user for tool use]";

/// Assistant content recorded when a tool batch is aborted by a permission denial.
pub const PERMISSION_DENIED: &str = "[Request interrupted by user due to permission denial]";

/// Replaces a leftover [`PERMISSION_DENIED`] sentinel once the user speaks again.
pub const PERMISSION_DENIAL_FOLLOW_UP: &str =
    "I understand you denied permission. Let me know how I can better assist you.";

const REMOVED_BLOCKS: [&str; 2] = [
    r"(?s)<search_reminders>.*?</search_reminders>",
    r"(?s)<automated_reminder_from_anthropic>.*?</automated_reminder_from_anthropic>",
];

static TOOL_RESPONSE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<tool_response>(.*?)</tool_response>").ok());

static REMOVED: LazyLock<Vec<Regex>> =
    LazyLock::new(|| REMOVED_BLOCKS.iter().filter_map(|p| Regex::new(p).ok()).collect());

/// Whether content is one of the three cancellation sentinels.
pub fn is_interrupt_sentinel(content: &str) -> bool {
    matches!(content.trim(), INTERRUPTED | INTERRUPTED_FOR_TOOL_USE | PERMISSION_DENIED)
}

/// Strip stray vendor tags from model or tool text.
///
/// `<tool_response>` wrappers are unwrapped; reminder blocks are removed
/// together with their contents.
pub fn clean_content(text: &str) -> String {
    let mut cleaned = match TOOL_RESPONSE.as_ref() {
        Some(re) => re.replace_all(text, "$1").into_owned(),
        None => text.to_string(),
    };
    for re in REMOVED.iter() {
        cleaned = re.replace_all(&cleaned, "").into_owned();
    }
    cleaned.trim().to_string()
}
