//! Slash commands. Handled locally, never sent to the model.

use crate::orchestrator::Orchestrator;

pub const HELP_TEXT: &str = "\
Available commands:
  /help            Show this help
  /clear           Clear the conversation history (system prompt is kept)
  /compact         Compact the conversation now
  /dump [file]     Save the conversation as JSON
  /verbose         Toggle verbose mode";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Clear,
    Compact,
    Dump(Option<String>),
    Verbose,
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Info(String),
    Error(String),
}

impl CommandOutcome {
    pub fn text(&self) -> &str {
        match self {
            CommandOutcome::Info(text) | CommandOutcome::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CommandOutcome::Error(_))
    }
}

/// Parse a line as a slash command. `None` means it is ordinary input.
pub fn parse(input: &str) -> Option<Command> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default().to_lowercase();
    let arg = parts.next().map(str::to_string);

    Some(match name.as_str() {
        "help" => Command::Help,
        "clear" => Command::Clear,
        "compact" => Command::Compact,
        "dump" => Command::Dump(arg),
        "verbose" => Command::Verbose,
        _ => Command::Unknown(name),
    })
}

pub async fn execute(orchestrator: &mut Orchestrator, command: Command) -> CommandOutcome {
    match command {
        Command::Help => CommandOutcome::Info(HELP_TEXT.to_string()),
        Command::Clear => {
            orchestrator.clear();
            CommandOutcome::Info("Conversation history cleared.".into())
        }
        Command::Compact => match orchestrator.compact(false) {
            Some(report) => CommandOutcome::Info(format!(
                "Compacted: {}% → {}% ({} messages removed)",
                report.before_percent, report.after_percent, report.messages_removed
            )),
            None => CommandOutcome::Info("Conversation is too short to compact.".into()),
        },
        Command::Dump(file) => match orchestrator.dump(file.as_deref()).await {
            Ok(path) => CommandOutcome::Info(format!("Conversation saved to {}", path.display())),
            Err(e) => CommandOutcome::Error(format!("Failed to save conversation: {e}")),
        },
        Command::Verbose => {
            let verbose = !orchestrator.verbose();
            orchestrator.set_verbose(verbose);
            let state = if verbose { "enabled" } else { "disabled" };
            CommandOutcome::Info(format!("Verbose mode {state}"))
        }
        Command::Unknown(name) => CommandOutcome::Error(format!("Unknown command: /{name}. Type /help for commands.")),
    }
}
