//! End-to-end tests for the orchestration core.
//!
//! These drive full user turns through the orchestrator with a scripted model
//! client, real tools from `helmsman-tools`, and a scripted permission gate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use helmsman_agent::{Orchestrator, PermissionManager, ToolDispatcher, commands, compact, normalize};
use helmsman_config::BudgetConfig;
use helmsman_core::agent::{AgentState, TurnOutcome};
use helmsman_core::error::ProviderError;
use helmsman_core::event::{DomainEvent, EventBus};
use helmsman_core::message::{Message, Role, ToolCallRef};
use helmsman_core::permission::{BatchApproval, PermissionGate, PermissionRequest};
use helmsman_core::provider::{ModelClient, ModelResponse, ToolDefinition};
use helmsman_tools::default_registry;
use serde_json::json;

// ── Doubles ──────────────────────────────────────────────────────────────

/// Replays scripted responses and records each request's log.
struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<Vec<Message>>>,
    saw_tools: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            saw_tools: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    fn context_size(&self) -> usize {
        32_000
    }

    async fn send(
        &self,
        messages: &[Message],
        functions: &[ToolDefinition],
        _include_reasoning: bool,
    ) -> Result<ModelResponse, ProviderError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        *self.saw_tools.lock().unwrap() = functions.iter().map(|f| f.name.clone()).collect();
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("script exhausted".into()))
    }
}

/// Answers every prompt the same way and counts prompts.
struct FixedGate {
    allow: bool,
    prompts: AtomicUsize,
}

impl FixedGate {
    fn new(allow: bool) -> Self {
        Self {
            allow,
            prompts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PermissionGate for FixedGate {
    async fn check_permission(&self, _request: &PermissionRequest) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.allow
    }

    async fn approve_batch(&self, _approval: &BatchApproval) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.allow
    }
}

fn build(model: Arc<ScriptedModel>, gate: Arc<FixedGate>, events: Arc<EventBus>) -> Orchestrator {
    let registry = Arc::new(default_registry(5));
    let permissions = Arc::new(PermissionManager::new(gate));
    let dispatcher = ToolDispatcher::new(registry, permissions, events.clone());
    Orchestrator::new(model, dispatcher, events).with_system_prompt("You are a coding assistant.")
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRef {
    ToolCallRef::function(id, name, args.to_string())
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn two_tools_one_follow_up_then_idle() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "remember the milk").unwrap();
    let dir_path = dir.path().to_string_lossy().to_string();
    let file_path = dir.path().join("notes.txt").to_string_lossy().to_string();

    let model = Arc::new(ScriptedModel::new(vec![
        ModelResponse::with_tool_calls(
            "Let me look.",
            vec![
                call("call_ls", "ls", json!({"path": dir_path})),
                call("call_read", "file_read", json!({"path": file_path})),
            ],
        ),
        ModelResponse::text("The notes say: remember the milk."),
    ]));
    let gate = Arc::new(FixedGate::new(false));
    let mut orchestrator = build(model.clone(), gate.clone(), Arc::new(EventBus::default()));

    let outcome = orchestrator.process_user_input("What is in my notes?").await.unwrap();

    assert_eq!(outcome, TurnOutcome::Completed("The notes say: remember the milk.".into()));
    assert_eq!(orchestrator.state(), AgentState::Idle);
    assert_eq!(model.requests().len(), 2, "exactly one follow-up request");
    assert_eq!(gate.prompts.load(Ordering::SeqCst), 0, "read-only tools never prompt");

    let messages = orchestrator.messages();
    let tool_ids: Vec<_> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.clone())
        .collect();
    assert_eq!(tool_ids.len(), 2);
    assert!(tool_ids.contains(&"call_ls".to_string()));
    assert!(tool_ids.contains(&"call_read".to_string()));

    let finals = messages
        .iter()
        .filter(|m| m.role == Role::Assistant && m.tool_calls.is_empty())
        .count();
    assert_eq!(finals, 1);
    assert!(
        model.saw_tools.lock().unwrap().contains(&"bash".to_string()),
        "function definitions are sent with every request"
    );
}

fn unanswered_call_ids(messages: &[Message]) -> Vec<String> {
    let answered: Vec<&str> = messages.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
    messages
        .iter()
        .flat_map(|m| &m.tool_calls)
        .filter_map(|c| c.id())
        .filter(|id| !answered.contains(id))
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn denied_batch_leaves_a_sendable_log() {
    for parallel in [true, false] {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::with_tool_calls(
                "",
                vec![
                    call("c1", "ls", json!({"path": dir.path().to_string_lossy()})),
                    call("c2", "file_write", json!({"path": target.to_string_lossy(), "content": "x"})),
                ],
            ),
            ModelResponse::text("No problem."),
        ]));
        let mut orchestrator = build(model.clone(), Arc::new(FixedGate::new(false)), Arc::new(EventBus::default()))
            .with_parallel_tools(parallel);

        orchestrator.process_user_input("write a file").await.unwrap();
        let outcome = orchestrator.process_user_input("never mind").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Completed("No problem.".into()));
        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert!(
            unanswered_call_ids(&requests[1]).is_empty(),
            "parallel={parallel}: {:?}",
            unanswered_call_ids(&requests[1])
        );
        assert!(!target.exists());
    }
}

#[tokio::test]
async fn parallel_denial_executes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let model = Arc::new(ScriptedModel::new(vec![ModelResponse::with_tool_calls(
        "",
        vec![
            call("c1", "ls", json!({"path": dir.path().to_string_lossy()})),
            call("c2", "file_write", json!({"path": target.to_string_lossy(), "content": "x"})),
            call("c3", "file_read", json!({"path": target.to_string_lossy()})),
        ],
    )]));
    let gate = Arc::new(FixedGate::new(false));
    let events = Arc::new(EventBus::default());
    let mut rx = events.subscribe();
    let mut orchestrator = build(model.clone(), gate.clone(), events);

    let outcome = orchestrator.process_user_input("write a file").await.unwrap();

    assert_eq!(outcome, TurnOutcome::PermissionDenied("file_write".into()));
    assert_eq!(gate.prompts.load(Ordering::SeqCst), 1, "one consolidated prompt");
    assert!(!target.exists());
    assert!(orchestrator.messages().iter().all(|m| m.role != Role::Tool));
    assert_eq!(model.requests().len(), 1);

    let mut executed = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event.as_ref(), DomainEvent::ToolExecuted { .. }) {
            executed += 1;
        }
    }
    assert_eq!(executed, 0);
}

#[tokio::test]
async fn approved_batch_writes_and_reports_back() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("hello.txt");
    let model = Arc::new(ScriptedModel::new(vec![
        ModelResponse::with_tool_calls(
            "",
            vec![
                call("w1", "file_write", json!({"path": target.to_string_lossy(), "content": "hi"})),
                call("b1", "bash", json!({"command": "echo done"})),
            ],
        ),
        ModelResponse::text("Wrote the file."),
    ]));
    let gate = Arc::new(FixedGate::new(true));
    let mut orchestrator = build(model, gate.clone(), Arc::new(EventBus::default()));

    let outcome = orchestrator.process_user_input("create hello.txt").await.unwrap();

    assert!(outcome.is_completed());
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "hi");
    assert_eq!(gate.prompts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_arguments_reach_the_model_as_failures() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelResponse::with_tool_calls("", vec![call("c1", "file_read", json!("path=/nowhere"))]),
        ModelResponse::with_tool_calls("", vec![call("c2", "teleport", json!({}))]),
        ModelResponse::text("I could not do that."),
    ]));
    let mut orchestrator = build(model.clone(), Arc::new(FixedGate::new(true)), Arc::new(EventBus::default()));

    let outcome = orchestrator.process_user_input("go").await.unwrap();
    assert!(outcome.is_completed());

    let tool_messages: Vec<_> = orchestrator.messages().iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_messages.len(), 2);
    assert!(tool_messages[0].content.contains(r#""success":false"#));
    assert!(tool_messages[1].content.contains("Unknown tool: teleport"));
}

#[tokio::test]
async fn repeated_listing_is_suppressed() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelResponse::with_tool_calls("", vec![call("c1", "ls", json!({"path": "."}))]),
        ModelResponse::with_tool_calls("", vec![call("c2", "ls", json!({"path": ".."}))]),
        ModelResponse::text("Seen it."),
    ]));
    let mut orchestrator = build(model, Arc::new(FixedGate::new(true)), Arc::new(EventBus::default()));
    orchestrator.process_user_input("list twice").await.unwrap();

    let second = orchestrator
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("c2"))
        .unwrap();
    assert!(second.content.contains("Redundant call to ls"));
}

#[tokio::test]
async fn dump_command_round_trips_log() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::new(vec![ModelResponse::text("hello")]));
    let mut orchestrator =
        build(model, Arc::new(FixedGate::new(true)), Arc::new(EventBus::default())).with_dump_dir(dir.path());
    orchestrator.process_user_input("hi").await.unwrap();

    let command = commands::parse("/dump session.json").unwrap();
    let outcome = commands::execute(&mut orchestrator, command).await;
    assert!(!outcome.is_error());

    let text = std::fs::read_to_string(dir.path().join("session.json")).unwrap();
    let parsed: Vec<Message> = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.len(), 3);
    assert_eq!(parsed[2].content, "hello");
}

#[test]
fn normalizer_and_compaction_properties() {
    let single_quoted = normalize(&json!({"function": {"name": "m", "arguments": "{'a': 1}"}}), 0);
    assert_eq!(serde_json::Value::Object(single_quoted.arguments), json!({"a": 1}));

    let mut log = vec![Message::system("s")];
    log.extend((0..10).map(|i| if i % 2 == 0 { Message::user("u") } else { Message::assistant("a") }));
    let budget = BudgetConfig::default();
    assert_eq!(compact(&log, budget.keep_recent).unwrap().len(), 9);
    assert!(compact(&log[..3], budget.keep_recent).is_none());
}
