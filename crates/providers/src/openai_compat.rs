//! OpenAI-compatible model client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, LM Studio, and any endpoint
//! exposing `/v1/chat/completions` with function calling.
//!
//! Tool calls are returned to the orchestrator as the raw JSON the endpoint
//! produced, so vendor quirks are handled in one place (the normalizer).

use std::time::Duration;

use async_trait::async_trait;
use helmsman_config::ModelConfig;
use helmsman_core::error::ProviderError;
use helmsman_core::message::{Message, ToolCallRef};
use helmsman_core::provider::{ModelClient, ModelResponse, ToolDefinition, Usage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 300;

pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    context_size: usize,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: 0.7,
            context_size: 32_000,
            client,
        })
    }

    /// Build a client from the `[model]` configuration section.
    pub fn from_config(config: &ModelConfig) -> Result<Self, ProviderError> {
        Ok(Self::new(&config.base_url, &config.model, config.api_key.clone())?
            .with_temperature(config.temperature)
            .with_context_size(config.context_size))
    }

    /// Ollama on its default local port.
    pub fn ollama(model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("http://localhost:11434/v1", model, None)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_context_size(mut self, context_size: usize) -> Self {
        self.context_size = context_size;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, messages: &[Message], functions: &[ToolDefinition], include_reasoning: bool) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": to_api_messages(messages),
            "temperature": self.temperature,
            "stream": false,
        });
        if !functions.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(functions));
            body["tool_choice"] = serde_json::json!("auto");
        }
        if include_reasoning {
            body["include_reasoning"] = Value::Bool(true);
        }
        body
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    async fn send(
        &self,
        messages: &[Message],
        functions: &[ToolDefinition],
        include_reasoning: bool,
    ) -> Result<ModelResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, functions, include_reasoning);

        debug!(model = %self.model, messages = messages.len(), tools = functions.len(), "Sending completion request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        match status {
            200 => {}
            429 => return Err(ProviderError::RateLimited { retry_after_secs: 5 }),
            401 | 403 => {
                return Err(ProviderError::AuthenticationFailed(
                    "Invalid API key or insufficient permissions".into(),
                ));
            }
            404 => return Err(ProviderError::ModelNotFound(self.model.clone())),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Model endpoint returned error");
                return Err(ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                });
            }
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        into_model_response(api_response)
    }
}

/// Convert the log into wire messages. Tool calls are re-shaped into the
/// standard `{id, type, function: {name, arguments: string}}` form.
fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| {
            let tool_calls: Vec<ApiToolCall> = m.tool_calls.iter().filter_map(to_api_tool_call).collect();
            ApiMessage {
                role: m.role.as_str().to_string(),
                content: Some(m.content.clone()),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: m.tool_call_id.clone(),
                name: m.name.clone(),
            }
        })
        .collect()
}

fn to_api_tool_call(call: &ToolCallRef) -> Option<ApiToolCall> {
    let raw = call.raw();
    let function = raw.get("function").filter(|f| f.is_object()).unwrap_or(raw);
    let Some(name) = function.get("name").and_then(Value::as_str) else {
        warn!("Dropping tool call without a name from outgoing request");
        return None;
    };
    let arguments = match function.get("arguments") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "{}".to_string(),
        Some(other) => other.to_string(),
    };
    Some(ApiToolCall {
        id: call.id().unwrap_or_default().to_string(),
        r#type: "function".into(),
        function: ApiFunction {
            name: name.to_string(),
            arguments,
        },
    })
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

fn into_model_response(api_response: ApiResponse) -> Result<ModelResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

    Ok(ModelResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ToolCallRef::new)
            .collect(),
        function_call: choice.message.function_call.filter(|f| !f.is_null()),
        interrupted: false,
        usage: api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        model: api_response.model,
    })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

/// Tool calls stay raw so the normalizer sees the vendor's shape.
#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<Value>>,
    function_call: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ollama_constructor() {
        let client = OpenAiCompatClient::ollama("qwen2.5-coder:14b").unwrap();
        assert_eq!(client.name(), "qwen2.5-coder:14b");
        assert!(client.base_url.contains("localhost:11434"));
        assert!(client.api_key.is_none());
    }

    #[test]
    fn from_config_applies_settings() {
        let config = ModelConfig {
            base_url: "https://api.example.com/v1/".into(),
            model: "gpt-test".into(),
            temperature: 0.2,
            context_size: 8000,
            api_key: Some("sk-test".into()),
        };
        let client = OpenAiCompatClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v1");
        assert_eq!(client.context_size(), 8000);
        assert_eq!(client.temperature, 0.2);
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
        assert!(api_messages[1].tool_calls.is_none());
    }

    #[test]
    fn tool_calls_reshaped_to_standard_form() {
        let calls = vec![
            ToolCallRef::function("call_1", "bash", r#"{"command":"ls"}"#),
            ToolCallRef::new(json!({"id": "manual-id-1", "name": "file_read", "arguments": {"path": "/a"}})),
        ];
        let api_msgs = to_api_messages(&[Message::assistant_with_calls("", calls)]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc.len(), 2);
        assert_eq!(tc[0].function.arguments, r#"{"command":"ls"}"#);
        assert_eq!(tc[1].id, "manual-id-1");
        assert_eq!(tc[1].function.name, "file_read");
        assert_eq!(tc[1].function.arguments, r#"{"path":"/a"}"#);
    }

    #[test]
    fn tool_response_keeps_call_id_and_name() {
        let api_msgs = to_api_messages(&[Message::tool_result("call_1", "ls", "{}")]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api_msgs[0].name.as_deref(), Some("ls"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "bash".into(),
            description: "Run a shell command".into(),
            parameters: json!({"type": "object"}),
        }];
        let api_tools = to_api_tools(&tools);
        assert_eq!(api_tools[0].function.name, "bash");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn request_body_includes_tools_and_reasoning_flag() {
        let client = OpenAiCompatClient::ollama("m").unwrap();
        let tools = vec![ToolDefinition {
            name: "ls".into(),
            description: "List".into(),
            parameters: json!({"type": "object"}),
        }];
        let body = client.request_body(&[Message::user("hi")], &tools, true);
        assert_eq!(body["tools"][0]["function"]["name"], "ls");
        assert_eq!(body["include_reasoning"], true);

        let plain = client.request_body(&[Message::user("hi")], &[], false);
        assert!(plain.get("tools").is_none());
        assert!(plain.get("include_reasoning").is_none());
    }

    #[test]
    fn response_keeps_raw_tool_calls() {
        let api: ApiResponse = serde_json::from_value(json!({
            "model": "m",
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "ls", "arguments": "{'path': '.'}"}}]
            }}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();
        let response = into_model_response(api).unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.tool_calls[0].raw()["function"]["arguments"], "{'path': '.'}");
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn legacy_function_call_passed_through() {
        let api: ApiResponse = serde_json::from_value(json!({
            "choices": [{"message": {"content": "", "function_call": {"name": "ls", "arguments": "{}"}}}]
        }))
        .unwrap();
        let response = into_model_response(api).unwrap();
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.function_call.unwrap()["name"], "ls");
    }

    #[test]
    fn empty_choices_is_error() {
        let api: ApiResponse = serde_json::from_value(json!({"model": "m", "choices": []})).unwrap();
        assert!(matches!(into_model_response(api), Err(ProviderError::ApiError { .. })));
    }
}
