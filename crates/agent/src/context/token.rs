//! Token budget estimation.
//!
//! Character-based heuristic: every message costs a fixed overhead for the
//! message frame and the role, plus its text length divided by
//! `chars_per_token`. Tool call names and argument payloads count as text too.

use std::collections::HashMap;
use std::time::Duration;

use helmsman_config::BudgetConfig;
use helmsman_core::message::{Message, Role};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// Estimates context usage and decides when compaction is due.
#[derive(Debug)]
pub struct TokenTracker {
    context_size: usize,
    estimated_tokens: usize,
    last_compaction: Option<Instant>,
    threshold: f64,
    min_interval: Duration,
    chars_per_token: f64,
    tokens_per_message: usize,
    tokens_per_role: usize,
    cache: HashMap<(Role, String, String), f64>,
}

impl TokenTracker {
    pub fn new(context_size: usize, budget: &BudgetConfig) -> Self {
        Self {
            context_size: context_size.max(1),
            estimated_tokens: 0,
            last_compaction: None,
            threshold: budget.compaction_threshold,
            min_interval: Duration::from_secs(budget.min_compaction_interval_secs),
            chars_per_token: budget.chars_per_token,
            tokens_per_message: budget.tokens_per_message,
            tokens_per_role: budget.tokens_per_role,
            cache: HashMap::new(),
        }
    }

    pub fn context_size(&self) -> usize {
        self.context_size
    }

    /// The most recent estimate.
    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }

    /// Re-estimate the whole log and remember the result.
    pub fn update(&mut self, messages: &[Message]) -> usize {
        self.estimated_tokens = self.estimate(messages);
        self.estimated_tokens
    }

    /// Estimate the token cost of `messages`. Never less than 1.
    pub fn estimate(&mut self, messages: &[Message]) -> usize {
        let total: f64 = messages.iter().map(|m| self.message_tokens(m)).sum();
        (total.floor() as usize).max(1)
    }

    /// Context usage as a whole percentage.
    pub fn percentage(&self) -> u32 {
        (self.estimated_tokens as f64 / self.context_size as f64 * 100.0) as u32
    }

    /// Over the threshold and outside the minimum interval since the last compaction.
    pub fn should_compact(&self) -> bool {
        let ratio = self.estimated_tokens as f64 / self.context_size as f64;
        if ratio <= self.threshold {
            return false;
        }
        match self.last_compaction {
            Some(at) => at.elapsed() >= self.min_interval,
            None => true,
        }
    }

    pub fn mark_compacted(&mut self) {
        self.last_compaction = Some(Instant::now());
    }

    pub fn last_compaction(&self) -> Option<Instant> {
        self.last_compaction
    }

    fn message_tokens(&mut self, message: &Message) -> f64 {
        let payload = tool_payload_text(message);
        let key = (message.role, message.content.clone(), payload);
        if let Some(tokens) = self.cache.get(&key) {
            return *tokens;
        }

        let chars = message.content.len() + key.2.len();
        let tokens = (self.tokens_per_message + self.tokens_per_role) as f64 + chars as f64 / self.chars_per_token;
        debug!(role = %message.role.as_str(), tokens, "Estimated message tokens");
        self.cache.insert(key, tokens);
        tokens
    }
}

/// Tool call names and argument payloads, serialized to text.
fn tool_payload_text(message: &Message) -> String {
    let mut text = String::new();
    for call in &message.tool_calls {
        let raw = call.raw();
        let function = raw.get("function").unwrap_or(raw);
        if let Some(name) = function.get("name").and_then(Value::as_str) {
            text.push_str(name);
        }
        match function.get("arguments") {
            Some(Value::String(args)) => text.push_str(args),
            Some(Value::Null) | None => {}
            Some(args) => text.push_str(&args.to_string()),
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_core::message::ToolCallRef;

    fn tracker(context_size: usize) -> TokenTracker {
        TokenTracker::new(context_size, &BudgetConfig::default())
    }

    #[test]
    fn message_overhead_and_characters() {
        let mut t = tracker(1000);
        // 4 + 1 + 8/4
        assert_eq!(t.estimate(&[Message::user("abcdefgh")]), 7);
    }

    #[test]
    fn fractional_parts_summed_before_flooring() {
        let mut t = tracker(1000);
        // 2 * (5 + 2/4) = 11
        assert_eq!(t.estimate(&[Message::user("ab"), Message::assistant("cd")]), 11);
    }

    #[test]
    fn empty_log_is_at_least_one() {
        assert_eq!(tracker(1000).estimate(&[]), 1);
    }

    #[test]
    fn tool_call_arguments_counted() {
        let mut t = tracker(1000);
        let plain = t.estimate(&[Message::assistant("")]);
        let call = ToolCallRef::function("c1", "file_read", "{\"path\": \"/a/long/path.rs\"}");
        let with_calls = t.estimate(&[Message::assistant_with_calls("", vec![call])]);
        assert!(with_calls > plain);
    }

    #[test]
    fn estimate_monotonic_for_repeated_messages() {
        let mut t = tracker(100_000);
        let mut log = Vec::new();
        let mut previous = 0;
        for _ in 0..20 {
            log.push(Message::user("same text every time"));
            let now = t.estimate(&log);
            assert!(now >= previous);
            previous = now;
        }
        assert_eq!(t.estimate(&log), previous);
    }

    #[test]
    fn percentage_is_whole_number() {
        let mut t = tracker(100);
        t.update(&[Message::user("a".repeat(160))]);
        // 5 + 40 = 45
        assert_eq!(t.percentage(), 45);
    }

    #[tokio::test(start_paused = true)]
    async fn compaction_respects_threshold_and_interval() {
        let mut t = tracker(100);
        t.update(&[Message::user("a".repeat(360))]);
        assert_eq!(t.estimated_tokens(), 95);
        assert!(!t.should_compact(), "exactly at threshold");

        t.update(&[Message::user("a".repeat(400))]);
        assert!(t.should_compact());

        t.mark_compacted();
        assert!(!t.should_compact());

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!t.should_compact());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(t.should_compact());
    }
}
