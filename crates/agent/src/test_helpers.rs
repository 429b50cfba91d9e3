//! Shared test doubles for the orchestrator, dispatcher, and permission tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use helmsman_core::error::{ProviderError, ToolError};
use helmsman_core::message::{Message, ToolCallRef};
use helmsman_core::permission::{BatchApproval, PermissionGate, PermissionRequest};
use helmsman_core::provider::{ModelClient, ModelResponse, ToolDefinition};
use helmsman_core::tool::{ParamType, ParameterSpec, Tool, ToolResult};
use serde_json::{Map, Value, json};

use crate::orchestrator::InterruptHandle;

/// A permission gate with a fixed answer that counts how it was consulted.
pub struct ScriptedGate {
    allow: bool,
    single: AtomicUsize,
    batches: AtomicUsize,
    prompt: Mutex<String>,
}

impl ScriptedGate {
    pub fn allow() -> Self {
        Self::answering(true)
    }

    pub fn deny() -> Self {
        Self::answering(false)
    }

    fn answering(allow: bool) -> Self {
        Self {
            allow,
            single: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            prompt: Mutex::new(String::new()),
        }
    }

    pub fn single_checks(&self) -> usize {
        self.single.load(Ordering::SeqCst)
    }

    pub fn batch_prompts(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> String {
        self.prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl PermissionGate for ScriptedGate {
    async fn check_permission(&self, _request: &PermissionRequest) -> bool {
        self.single.fetch_add(1, Ordering::SeqCst);
        self.allow
    }

    async fn approve_batch(&self, approval: &BatchApproval) -> bool {
        self.batches.fetch_add(1, Ordering::SeqCst);
        *self.prompt.lock().unwrap() = approval.prompt.clone();
        self.allow
    }
}

/// A tool that counts executions and tracks peak concurrency.
///
/// `{"fail": true}` makes it return a `ToolError`.
pub struct CountingTool {
    name: String,
    confirm: bool,
    calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            confirm: false,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn confirming(name: &str) -> Self {
        Self {
            confirm: true,
            ..Self::new(name)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Counts invocations"
    }

    fn requires_confirmation(&self) -> bool {
        self.confirm
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::optional("path", ParamType::String, "Target path")]
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<ToolResult, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if arguments.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name.clone(),
                reason: "asked to fail".into(),
            });
        }
        Ok(ToolResult::ok(json!({"tool": self.name, "arguments": arguments})))
    }
}

/// A tool whose execution panics.
pub struct PanickingTool;

#[async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    async fn execute(&self, _arguments: Map<String, Value>) -> Result<ToolResult, ToolError> {
        panic!("boom");
    }
}

/// What the scripted client does on its next request.
pub enum Step {
    Respond(ModelResponse),
    Fail(ProviderError),
    /// Never answers; only an interrupt ends the request.
    Hang,
    /// Fires the armed interrupt handle the moment the request starts, then hangs.
    InterruptImmediately,
}

/// A model client that replays a script and records every request.
pub struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Vec<Message>>>,
    context_size: usize,
    interrupter: Mutex<Option<InterruptHandle>>,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            context_size: 32_000,
            interrupter: Mutex::new(None),
        }
    }

    pub fn arm(&self, handle: InterruptHandle) {
        *self.interrupter.lock().unwrap() = Some(handle);
    }

    pub fn with_context_size(mut self, size: usize) -> Self {
        self.context_size = size;
        self
    }

    pub fn text(reply: &str) -> Step {
        Step::Respond(ModelResponse::text(reply))
    }

    pub fn calls(calls: Vec<ToolCallRef>) -> Step {
        Step::Respond(ModelResponse::with_tool_calls("", calls))
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    async fn send(
        &self,
        messages: &[Message],
        _functions: &[ToolDefinition],
        _include_reasoning: bool,
    ) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedClient: script exhausted"));
        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
            Step::InterruptImmediately => {
                let handle = self.interrupter.lock().unwrap().clone().expect("client not armed");
                assert!(handle.interrupt(), "request should be in flight");
                std::future::pending().await
            }
        }
    }
}
