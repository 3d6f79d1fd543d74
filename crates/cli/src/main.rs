//! Parley CLI — the main entry point.
//!
//! Commands:
//! - `onboard`    — Write a starter config and workspace
//! - `chat`       — Talk to an agent through the widget channel
//! - `broadcast`  — Send a message on every channel of an agent
//! - `status`     — Show configuration, agents and channels

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "parley", about = "Parley — multi-tenant conversational agent runtime", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config and workspace
    Onboard,

    /// Chat with an agent
    Chat {
        /// Agent id
        #[arg(short, long)]
        agent: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Send a message on every enabled channel of an agent
    Broadcast {
        #[arg(short, long)]
        agent: String,

        text: String,
    },

    /// Show configuration, agents and channels
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Onboard => commands::onboard::run(config)?,
        Commands::Chat { agent, message } => commands::chat::run(config, &agent, message).await?,
        Commands::Broadcast { agent, text } => commands::broadcast::run(config, &agent, &text).await?,
        Commands::Status => commands::status::run(config).await?,
    }

    Ok(())
}
