//! Helmsman CLI, the main entry point.
//!
//! Commands:
//! - `init`  Write a default config file
//! - `chat`  Interactive chat or single-message mode

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod console;

#[derive(Parser)]
#[command(
    name = "helmsman",
    about = "Helmsman: tool-calling conversations with a local or hosted model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and ask the model for its reasoning
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.helmsman/config.toml
    #[arg(short, long, global = true, env = "HELMSMAN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Chat with the model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Run multi-call batches one at a time
        #[arg(long)]
        no_parallel: bool,

        /// Approve every protected tool call without prompting
        #[arg(long)]
        auto_confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run(cli.config).await?,
        Commands::Chat {
            message,
            no_parallel,
            auto_confirm,
        } => {
            let options = commands::chat::ChatOptions {
                config_path: cli.config,
                message,
                verbose: cli.verbose,
                no_parallel,
                auto_confirm,
            };
            commands::chat::run(options).await?
        }
    }

    Ok(())
}
