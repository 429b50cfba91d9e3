//! `helmsman chat`: interactive or single-message mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use helmsman_agent::commands::{self as slash, CommandOutcome};
use helmsman_agent::{InterruptHandle, Orchestrator, PermissionManager, ToolDispatcher};
use helmsman_config::AppConfig;
use helmsman_core::agent::TurnOutcome;
use helmsman_core::error::Error;
use helmsman_core::event::{DomainEvent, EventBus};
use helmsman_providers::OpenAiCompatClient;
use tokio::sync::{Notify, broadcast};
use tracing::{debug, warn};

use crate::console::{Console, ConsolePermissionGate};

pub struct ChatOptions {
    pub config_path: Option<PathBuf>,
    pub message: Option<String>,
    pub verbose: bool,
    pub no_parallel: bool,
    pub auto_confirm: bool,
}

pub async fn run(options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(options.config_path.as_deref())?;

    let console = Console::spawn();
    let events = Arc::new(EventBus::default());
    let mut orchestrator = build_orchestrator(&config, &options, console.clone(), events.clone())?;

    let renderer = tokio::spawn(render_events(events.subscribe()));

    if let Some(message) = options.message {
        let outcome = orchestrator.process_user_input(&message).await;
        print_outcome(outcome, &config);
        renderer.abort();
        return Ok(());
    }

    println!();
    println!("  Helmsman, interactive mode");
    println!("  Model:     {}", config.model.model);
    println!("  Endpoint:  {}", config.model.base_url);
    println!("  Tools:     {}", orchestrator.dispatcher().registry().names().join(", "));
    println!();
    println!("  Type /help for commands, Ctrl+C to interrupt, Ctrl+D to quit.");
    println!();

    let quit = Arc::new(Notify::new());
    let turn_running = Arc::new(AtomicBool::new(false));
    tokio::spawn(watch_ctrl_c(orchestrator.interrupt_handle(), turn_running.clone(), quit.clone()));

    loop {
        console.prompt("  You > ");
        let line = tokio::select! {
            line = console.read_line() => line,
            _ = quit.notified() => None,
        };
        let Some(line) = line else { break };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        if let Some(command) = slash::parse(input) {
            match slash::execute(&mut orchestrator, command).await {
                CommandOutcome::Info(text) => println!("  {text}"),
                CommandOutcome::Error(text) => eprintln!("  [Error] {text}"),
            }
            println!();
            continue;
        }

        turn_running.store(true, Ordering::SeqCst);
        let outcome = orchestrator.process_user_input(input).await;
        turn_running.store(false, Ordering::SeqCst);
        print_outcome(outcome, &config);
    }

    if orchestrator.auto_dump() && orchestrator.messages().len() > 1 {
        match orchestrator.dump(None).await {
            Ok(path) => println!("\n  Conversation saved to {}", path.display()),
            Err(e) => eprintln!("\n  [Error] Failed to save conversation: {e}"),
        }
    }

    renderer.abort();
    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Load the chosen (or default) config file with environment overrides.
fn load_config(path: Option<&Path>) -> Result<AppConfig, Error> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(AppConfig::config_path);
    AppConfig::load_with_env(&path).map_err(|e| Error::Config { message: e.to_string() })
}

fn build_orchestrator(
    config: &AppConfig,
    options: &ChatOptions,
    console: Console,
    events: Arc<EventBus>,
) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let client = Arc::new(OpenAiCompatClient::from_config(&config.model)?);
    let registry = Arc::new(helmsman_tools::default_registry(config.tools.bash_timeout_secs));

    let gate = Arc::new(ConsolePermissionGate::new(console));
    let permissions =
        Arc::new(PermissionManager::new(gate).with_auto_confirm(config.agent.auto_confirm || options.auto_confirm));

    let dispatcher =
        ToolDispatcher::new(registry, permissions, events.clone()).with_context_check(config.agent.check_context_msg);

    let mut orchestrator = Orchestrator::new(client, dispatcher, events).with_settings(&config.agent, &config.budget);
    if options.no_parallel {
        orchestrator = orchestrator.with_parallel_tools(false);
    }
    if options.verbose {
        orchestrator.set_verbose(true);
    }
    debug!(model = %config.model.model, context_size = config.model.context_size, "Orchestrator ready");
    Ok(orchestrator)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CtrlCAction {
    /// The in-flight model request was cancelled
    Interrupted,
    /// A turn is busy with tools; there is nothing to cancel
    Ignored,
    Quit,
}

fn ctrl_c_action(interrupted: bool, turn_running: bool) -> CtrlCAction {
    match (interrupted, turn_running) {
        (true, _) => CtrlCAction::Interrupted,
        (false, true) => CtrlCAction::Ignored,
        (false, false) => CtrlCAction::Quit,
    }
}

/// Ctrl-C cancels the in-flight request, is ignored while tools run, and
/// quits at the input prompt.
async fn watch_ctrl_c(handle: InterruptHandle, turn_running: Arc<AtomicBool>, quit: Arc<Notify>) {
    loop {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Ctrl-C handler unavailable");
            return;
        }
        match ctrl_c_action(handle.interrupt(), turn_running.load(Ordering::SeqCst)) {
            CtrlCAction::Interrupted => {}
            CtrlCAction::Ignored => println!("\n  [Tools are running; Ctrl+C only cancels model requests]"),
            CtrlCAction::Quit => quit.notify_one(),
        }
    }
}

fn print_outcome(outcome: Result<TurnOutcome, Error>, config: &AppConfig) {
    match outcome {
        Ok(TurnOutcome::Completed(text)) => {
            println!();
            for line in text.lines() {
                println!("  Assistant > {line}");
            }
        }
        Ok(TurnOutcome::Interrupted) => println!("\n  [Interrupted]"),
        Ok(TurnOutcome::PermissionDenied(tool)) => {
            println!("\n  Permission denied for {tool}. Tell the assistant how to continue.")
        }
        Ok(TurnOutcome::FollowUpLimit) => println!(
            "\n  Stopped after {} follow-up requests without a final answer.",
            config.agent.max_follow_ups
        ),
        Err(e) => eprintln!("\n  [Error] {e}"),
    }
    println!();
}

async fn render_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Event renderer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        match event.as_ref() {
            DomainEvent::ToolCallStarted { tool_name, arguments, .. } => {
                println!("  [tool] {tool_name} {arguments}");
            }
            DomainEvent::ToolExecuted {
                tool_name,
                success: false,
                error,
                ..
            } => {
                println!("  [tool] {tool_name} failed: {}", error.as_deref().unwrap_or("unknown error"));
            }
            DomainEvent::InvalidToolCall { call_id, .. } => {
                println!("  [tool] skipped malformed call {call_id}");
            }
            DomainEvent::ConversationCompacted {
                before_percent,
                after_percent,
                automatic: true,
                ..
            } => {
                println!("  Auto-compacted: {before_percent}% → {after_percent}%");
            }
            _ => {}
        }
    }
}
