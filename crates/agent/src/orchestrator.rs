//! The conversation orchestrator.
//!
//! Drives one user turn: append the input, ask the model, dispatch any tool
//! calls, append their results, and ask again until the model answers in
//! plain text. The orchestrator is the only owner of the message log.
//!
//! ```text
//! Idle → AwaitingModelResponse → (ProcessingToolCalls → AwaitingModelResponse)* → Idle
//!                 └──────────── interrupt ────────────→ Interrupted → Idle
//! ```

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Local, Utc};
use helmsman_config::{AgentSettings, BudgetConfig};
use helmsman_core::agent::{AgentState, TurnOutcome};
use helmsman_core::error::{ProviderError, Result};
use helmsman_core::event::{DomainEvent, EventBus};
use helmsman_core::message::{Conversation, Message, Role, ToolCallRef};
use helmsman_core::provider::{ModelClient, ModelResponse};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cleanup::{PERMISSION_DENIAL_FOLLOW_UP, PERMISSION_DENIED, clean_content, is_interrupt_sentinel};
use crate::context::{TokenTracker, compact};
use crate::dispatcher::{CallResult, ToolDispatcher};
use crate::normalizer::{NormalizedCall, normalize};

/// Context usage before and after a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub before_percent: u32,
    pub after_percent: u32,
    pub messages_removed: usize,
}

/// Cancels the model request currently in flight, from any task.
#[derive(Clone)]
pub struct InterruptHandle {
    in_flight: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptHandle {
    /// Returns `false` when there was no request to cancel.
    pub fn interrupt(&self) -> bool {
        if !self.in_flight.load(Ordering::SeqCst) {
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Clears the in-flight flag when dropped, whichever way the request ended.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn set(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    dispatcher: ToolDispatcher,
    events: Arc<EventBus>,
    conversation: Conversation,
    tracker: TokenTracker,
    state: AgentState,
    parallel_tools: bool,
    max_follow_ups: u32,
    keep_recent: usize,
    verbose: bool,
    auto_dump: bool,
    dump_dir: PathBuf,
    in_flight: Arc<AtomicBool>,
    interrupt: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ModelClient>, dispatcher: ToolDispatcher, events: Arc<EventBus>) -> Self {
        let defaults = AgentSettings::default();
        let budget = BudgetConfig::default();
        let tracker = TokenTracker::new(client.context_size(), &budget);
        Self {
            client,
            dispatcher,
            events,
            conversation: Conversation::new(),
            tracker,
            state: AgentState::Idle,
            parallel_tools: defaults.parallel_tools,
            max_follow_ups: defaults.max_follow_ups,
            keep_recent: budget.keep_recent,
            verbose: defaults.verbose,
            auto_dump: defaults.auto_dump,
            dump_dir: defaults.dump_dir,
            in_flight: Arc::new(AtomicBool::new(false)),
            interrupt: Arc::new(Notify::new()),
        }
    }

    /// Apply the `[agent]` and `[budget]` configuration sections.
    pub fn with_settings(mut self, agent: &AgentSettings, budget: &BudgetConfig) -> Self {
        self.parallel_tools = agent.parallel_tools;
        self.max_follow_ups = agent.max_follow_ups;
        self.verbose = agent.verbose;
        self.auto_dump = agent.auto_dump;
        self.dump_dir = agent.dump_dir.clone();
        self.keep_recent = budget.keep_recent;
        self.tracker = TokenTracker::new(self.client.context_size(), budget);
        if let Some(prompt) = &agent.system_prompt {
            self = self.with_system_prompt(prompt.clone());
        }
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let message = Message::system(prompt);
        if self.conversation.messages.first().is_some_and(|m| m.role == Role::System) {
            self.conversation.messages[0] = message;
        } else {
            self.conversation.messages.insert(0, message);
        }
        self.tracker.update(&self.conversation.messages);
        self
    }

    pub fn with_parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    pub fn with_max_follow_ups(mut self, max: u32) -> Self {
        self.max_follow_ups = max;
        self
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = dir.into();
        self
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.conversation.messages
    }

    pub fn tracker(&self) -> &TokenTracker {
        &self.tracker
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            in_flight: self.in_flight.clone(),
            notify: self.interrupt.clone(),
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn auto_dump(&self) -> bool {
        self.auto_dump
    }

    /// Run one user turn to completion.
    ///
    /// Provider failures end the turn with `Err` and leave the orchestrator idle.
    pub async fn process_user_input(&mut self, input: &str) -> Result<TurnOutcome> {
        self.soften_permission_denial();

        self.tracker.update(&self.conversation.messages);
        if self.tracker.should_compact() {
            self.compact(true);
        }

        self.append(Message::user(input));
        info!(
            conversation_id = %self.conversation.id,
            messages = self.conversation.len(),
            tokens = self.tracker.estimated_tokens(),
            "Processing user input"
        );

        let outcome = self.run_turn().await;
        self.state = AgentState::Idle;
        if let Err(e) = &outcome {
            self.events.publish(DomainEvent::ErrorOccurred {
                context: "model request".into(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }
        outcome
    }

    async fn run_turn(&mut self) -> Result<TurnOutcome> {
        let mut follow_ups = 0u32;

        loop {
            let Some(response) = self.request_model().await? else {
                return Ok(self.interrupted());
            };
            if response.interrupted || is_interrupt_sentinel(&response.content) {
                return Ok(self.interrupted());
            }

            let content = clean_content(&response.content);
            let mut calls = take_tool_calls(response);

            if calls.is_empty() {
                self.append(Message::assistant(content.clone()));
                self.events.publish(DomainEvent::ResponseGenerated {
                    conversation_id: self.conversation.id.to_string(),
                    model: self.client.name().to_string(),
                    content: content.clone(),
                    timestamp: Utc::now(),
                });
                return Ok(TurnOutcome::Completed(content));
            }

            self.state = AgentState::ProcessingToolCalls;
            let normalized: Vec<NormalizedCall> = calls
                .iter()
                .enumerate()
                .map(|(i, call)| normalize(call.raw(), i))
                .collect();
            for (call, norm) in calls.iter_mut().zip(&normalized) {
                call.ensure_id(&norm.call_id);
            }
            warn_duplicate_ids(&normalized);
            let assistant_index = self.conversation.len();
            self.append(Message::assistant_with_calls(content, calls));

            let dispatched = if self.parallel_tools && normalized.len() > 1 {
                self.dispatcher.execute_parallel(&normalized).await
            } else {
                self.dispatcher.execute_sequential(&normalized).await
            };

            match dispatched {
                Ok(results) => {
                    self.append_results(&results);
                    self.settle_tool_calls(assistant_index);
                }
                Err(denied) => {
                    warn!(tool = %denied.tool_name, "Tool batch aborted by permission denial");
                    self.append_results(&denied.completed);
                    self.append_results(denied.denied.as_slice());
                    self.settle_tool_calls(assistant_index);
                    self.append(Message::assistant(PERMISSION_DENIED));
                    return Ok(TurnOutcome::PermissionDenied(denied.tool_name));
                }
            }

            if follow_ups >= self.max_follow_ups {
                warn!(follow_ups, "Follow-up limit reached, ending turn");
                return Ok(TurnOutcome::FollowUpLimit);
            }
            follow_ups += 1;
            debug!(follow_ups, "Requesting follow-up after tool results");
        }
    }

    /// Send the log to the model; `None` when the request was interrupted.
    async fn request_model(&mut self) -> std::result::Result<Option<ModelResponse>, ProviderError> {
        self.state = AgentState::AwaitingModelResponse;
        let functions = self.dispatcher.registry().definitions();

        // Register for the interrupt before the flag is visible to other tasks.
        let interrupted = self.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();
        let _in_flight = InFlightGuard::set(&self.in_flight);

        tokio::select! {
            response = self.client.send(&self.conversation.messages, &functions, self.verbose) => {
                response.map(Some)
            }
            _ = &mut interrupted => Ok(None),
        }
    }

    fn interrupted(&mut self) -> TurnOutcome {
        info!(conversation_id = %self.conversation.id, "Turn interrupted");
        self.state = AgentState::Interrupted;
        self.events.publish(DomainEvent::TurnInterrupted {
            conversation_id: self.conversation.id.to_string(),
            timestamp: Utc::now(),
        });
        TurnOutcome::Interrupted
    }

    /// A denial sentinel left at the end of the log becomes a polite acknowledgement.
    fn soften_permission_denial(&mut self) {
        if let Some(last) = self.conversation.messages.last_mut()
            && last.role == Role::Assistant
            && last.content == PERMISSION_DENIED
        {
            last.content = PERMISSION_DENIAL_FOLLOW_UP.to_string();
        }
    }

    fn append(&mut self, message: Message) {
        self.conversation.push(message);
        self.tracker.update(&self.conversation.messages);
    }

    fn append_results(&mut self, results: &[CallResult]) {
        for result in results {
            self.conversation.push(result.to_message());
        }
        self.tracker.update(&self.conversation.messages);
    }

    /// Drop calls from the assistant message at `index` that got no `tool` reply.
    ///
    /// Skipped invalid calls and calls cut off by a denial never run, and the
    /// endpoint rejects a log with unanswered call ids. An assistant message
    /// left with neither calls nor text is removed.
    fn settle_tool_calls(&mut self, index: usize) {
        let answered: HashSet<String> = self
            .conversation
            .messages
            .iter()
            .skip(index + 1)
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        let Some(assistant) = self.conversation.messages.get_mut(index) else {
            return;
        };

        let before = assistant.tool_calls.len();
        assistant
            .tool_calls
            .retain(|call| call.id().is_some_and(|id| answered.contains(id)));
        let dropped = before - assistant.tool_calls.len();
        if dropped == 0 {
            return;
        }

        debug!(dropped, "Removed tool calls that were never answered");
        if assistant.tool_calls.is_empty() && assistant.content.trim().is_empty() {
            self.conversation.messages.remove(index);
        }
        self.tracker.update(&self.conversation.messages);
    }

    /// Compact the log now, ignoring threshold and interval.
    ///
    /// Returns `None` when the log is too short to compact.
    pub fn compact(&mut self, automatic: bool) -> Option<CompactionReport> {
        let before_percent = {
            self.tracker.update(&self.conversation.messages);
            self.tracker.percentage()
        };
        let before_len = self.conversation.len();
        let compacted = compact(&self.conversation.messages, self.keep_recent)?;

        self.conversation.replace(compacted);
        self.tracker.update(&self.conversation.messages);
        self.tracker.mark_compacted();

        let report = CompactionReport {
            before_percent,
            after_percent: self.tracker.percentage(),
            messages_removed: before_len.saturating_sub(self.conversation.len()),
        };
        info!(
            before = report.before_percent,
            after = report.after_percent,
            removed = report.messages_removed,
            automatic,
            "Conversation compacted"
        );
        self.events.publish(DomainEvent::ConversationCompacted {
            before_percent: report.before_percent,
            after_percent: report.after_percent,
            messages_removed: report.messages_removed,
            automatic,
            timestamp: Utc::now(),
        });
        Some(report)
    }

    /// Drop everything but the system prompt and forget recent tool calls.
    pub fn clear(&mut self) {
        let kept: Vec<Message> = self
            .conversation
            .messages
            .iter()
            .filter(|m| m.role == Role::System && !m.is_compaction_notice())
            .cloned()
            .collect();
        self.conversation.replace(kept);
        self.dispatcher.recent_calls().clear();
        self.tracker.update(&self.conversation.messages);
    }

    /// Write the log as a JSON array under the dump directory.
    pub async fn dump(&self, file_name: Option<&str>) -> Result<PathBuf> {
        let file_name = match file_name {
            Some(name) => name.to_string(),
            None => format!("conversation_{}.json", Local::now().format("%Y%m%d_%H%M%S")),
        };
        tokio::fs::create_dir_all(&self.dump_dir).await?;
        let path = self.dump_dir.join(file_name);
        tokio::fs::write(&path, self.conversation.to_json()?).await?;
        info!(path = %path.display(), messages = self.conversation.len(), "Conversation dumped");
        Ok(path)
    }
}

/// Tool calls from either response shape; a bare `function_call` gets a synthetic id.
fn take_tool_calls(response: ModelResponse) -> Vec<ToolCallRef> {
    if !response.tool_calls.is_empty() {
        return response.tool_calls;
    }
    match response.function_call {
        Some(raw) if !raw.is_null() => {
            let mut call = ToolCallRef::new(raw);
            call.ensure_id(&format!("manual-id-{}", Utc::now().timestamp()));
            vec![call]
        }
        _ => Vec::new(),
    }
}

fn warn_duplicate_ids(calls: &[NormalizedCall]) {
    let mut seen = HashSet::new();
    for call in calls {
        if !seen.insert(call.call_id.as_str()) {
            warn!(call_id = %call.call_id, tool = %call.tool_name, "Duplicate tool call id in batch");
        }
    }
}
