//! Redundant tool call detection over a small window of recent calls.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::{Map, Value};

/// Number of recent calls remembered.
pub const RECENT_CALL_WINDOW: usize = 5;

/// Directory listings are treated as shown once any `ls` is in the window.
pub const LISTING_TOOL: &str = "ls";

/// A recorded call: tool name plus its arguments sorted by key.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentCallRecord {
    pub tool_name: String,
    pub arguments: Vec<(String, Value)>,
}

impl RecentCallRecord {
    pub fn new(tool_name: &str, arguments: &Map<String, Value>) -> Self {
        let mut arguments: Vec<(String, Value)> = arguments
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        arguments.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            tool_name: tool_name.to_string(),
            arguments,
        }
    }
}

/// Fixed-size FIFO of recent calls.
///
/// Shared by concurrent workers of a parallel batch, so the window sits behind
/// a mutex and the check and the record happen under one lock acquisition.
#[derive(Debug)]
pub struct RedundancyFilter {
    window: Mutex<VecDeque<RecentCallRecord>>,
    capacity: usize,
}

impl RedundancyFilter {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_CALL_WINDOW)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Whether this call duplicates recent work.
    pub fn is_redundant(&self, tool_name: &str, arguments: &Map<String, Value>) -> bool {
        let record = RecentCallRecord::new(tool_name, arguments);
        Self::matches(&self.lock(), &record)
    }

    /// Remember a call, evicting the oldest record when full.
    pub fn record(&self, tool_name: &str, arguments: &Map<String, Value>) {
        let record = RecentCallRecord::new(tool_name, arguments);
        self.push(&mut self.lock(), record);
    }

    /// Check and, if not redundant, record under a single lock.
    ///
    /// Returns `true` when the call is redundant (and was not recorded).
    pub fn check_and_record(&self, tool_name: &str, arguments: &Map<String, Value>) -> bool {
        let record = RecentCallRecord::new(tool_name, arguments);
        let mut window = self.lock();
        if Self::matches(&window, &record) {
            return true;
        }
        self.push(&mut window, record);
        false
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn matches(window: &VecDeque<RecentCallRecord>, record: &RecentCallRecord) -> bool {
        if record.tool_name == LISTING_TOOL && window.iter().any(|r| r.tool_name == LISTING_TOOL) {
            return true;
        }
        window.contains(record)
    }

    fn push(&self, window: &mut VecDeque<RecentCallRecord>, record: RecentCallRecord) {
        window.push_back(record);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RecentCallRecord>> {
        // A poisoned window only means a panic happened mid-push; the data is still a valid deque.
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RedundancyFilter {
    fn default() -> Self {
        Self::new()
    }
}
