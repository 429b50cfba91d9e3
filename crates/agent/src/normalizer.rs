//! Tool call normalization.
//!
//! Models emit tool calls in several shapes and frequently produce arguments
//! that are not valid JSON. `normalize` turns any raw call into a
//! [`NormalizedCall`] and never fails: unparsable arguments degrade through a
//! fallback chain instead of raising.
//!
//! Argument fallback chain:
//! 1. native JSON object → used as-is
//! 2. strict JSON parse of the string payload
//! 3. single quotes replaced by double quotes, then JSON parse
//! 4. naive `key: value` extraction over top-level commas
//! 5. `{"raw_args": <original string>}`

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

/// Key used when the argument payload could not be interpreted at all.
pub const RAW_ARGS_KEY: &str = "raw_args";

/// Canonical internal form of a model-issued tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCall {
    /// Always populated; generated when the model did not supply one.
    pub call_id: String,
    /// Empty means "invalid call, skip"; such a call is never executed.
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl NormalizedCall {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.tool_name.is_empty()
    }
}

/// Normalize one raw call. `index` is the call's position in its batch and
/// keeps generated ids unique within the batch.
pub fn normalize(raw: &Value, index: usize) -> NormalizedCall {
    let call_id = raw
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generated_call_id(index));

    let function = raw.get("function").filter(|f| f.is_object());
    let tool_name = extract_tool_name(raw, function);

    // Arguments live next to the name: inside `function` when present, else top-level.
    let arguments = function
        .and_then(|f| f.get("arguments"))
        .or_else(|| raw.get("arguments"))
        .map(parse_arguments)
        .unwrap_or_default();

    NormalizedCall {
        call_id,
        tool_name,
        arguments,
    }
}

/// Id used when the model omitted one.
pub fn generated_call_id(index: usize) -> String {
    format!("auto-id-{}-{index}", Utc::now().timestamp_millis())
}

fn extract_tool_name(raw: &Value, function: Option<&Value>) -> String {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    non_empty(function.and_then(|f| f.get("name")))
        .or_else(|| non_empty(raw.get("name")))
        .or_else(|| non_empty(function.and_then(|f| f.get("function")).and_then(|f| f.get("name"))))
        .unwrap_or_default()
}

/// Interpret an argument payload of any shape as a mapping.
pub fn parse_arguments(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        Value::String(text) => parse_argument_text(text),
        other => raw_args(&other.to_string()),
    }
}

fn parse_argument_text(text: &str) -> Map<String, Value> {
    if text.trim().is_empty() {
        return Map::new();
    }

    if let Some(map) = parse_json_object(text) {
        return map;
    }

    if let Some(map) = parse_json_object(&text.replace('\'', "\"")) {
        debug!("Recovered single-quoted tool arguments");
        return map;
    }

    if let Some(map) = extract_key_values(text) {
        debug!(pairs = map.len(), "Recovered tool arguments from key:value pairs");
        return map;
    }

    debug!("Tool arguments unparsable, passing through as raw_args");
    raw_args(text)
}

fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn raw_args(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(RAW_ARGS_KEY.into(), Value::String(text.to_string()));
    map
}

/// Last structured attempt: `{a: 1, 'b': "x, y"}` → `{"a": "1", "b": "x, y"}`.
///
/// Values stay strings. Returns `None` when no pair was found.
fn extract_key_values(text: &str) -> Option<Map<String, Value>> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed);

    let mut map = Map::new();
    for pair in split_top_level(body, ',') {
        let Some((key, value)) = pair.split_once(':') else {
            continue;
        };
        let key = strip_quotes(key);
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), Value::String(strip_quotes(value).to_string()));
    }

    (!map.is_empty()).then_some(map)
}

/// Split on `sep`, ignoring separators nested in brackets or quotes.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '{' | '[' | '(') => depth += 1,
            (None, '}' | ']' | ')') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn strip_quotes(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '"' || c == '\'')
}
