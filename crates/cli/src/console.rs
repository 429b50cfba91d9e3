//! Terminal input shared by the chat loop and the permission prompt.
//!
//! Stdin is read on a dedicated blocking thread and forwarded line by line,
//! so a permission prompt raised mid-turn consumes the next line the user
//! types instead of racing the chat loop for it.

use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use helmsman_core::permission::{BatchApproval, PermissionGate, PermissionRequest};
use tokio::sync::{Mutex, mpsc};

#[derive(Clone)]
pub struct Console {
    lines: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Console {
    /// Start the stdin reader thread. The channel closes on EOF.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Next line of input, `None` once stdin is closed.
    pub async fn read_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }

    pub fn prompt(&self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Asks on the terminal. Anything but `y`/`yes` is a denial, including EOF.
pub struct ConsolePermissionGate {
    console: Console,
}

impl ConsolePermissionGate {
    pub fn new(console: Console) -> Self {
        Self { console }
    }

    async fn ask(&self, text: &str) -> bool {
        println!();
        println!("{text}");
        self.console.prompt("  Allow? [y/N] ");
        match self.console.read_line().await {
            Some(answer) => is_affirmative(&answer),
            None => false,
        }
    }
}

#[async_trait]
impl PermissionGate for ConsolePermissionGate {
    async fn check_permission(&self, request: &PermissionRequest) -> bool {
        let text = format!(
            "Permission required: {}",
            request.path.describe(&request.tool_name)
        );
        self.ask(&text).await
    }

    async fn approve_batch(&self, approval: &BatchApproval) -> bool {
        self.ask(approval.prompt.trim_end()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES \n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("yep"));
    }
}
