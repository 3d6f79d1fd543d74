//! `parley chat` — talk to an agent through the widget channel.

use std::path::Path;

use anyhow::bail;
use parley::{App, Bootstrap};
use parley_config::AppConfig;
use parley_core::{ChannelType, InboundMessage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use super::load_config;

const VISITOR_ID: &str = "cli";

pub async fn run(config_path: Option<&Path>, agent_id: &str, message: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    if !config.has_api_key() && config.providers.values().all(|p| p.api_key.is_none()) {
        eprintln!();
        eprintln!("  No API key configured. Set PARLEY_API_KEY or add api_key to");
        eprintln!("  {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        bail!("no API key");
    }

    let app = Bootstrap::new(config).build().await?;
    let Some(agent) = app.directory.get_agent(agent_id).await? else {
        bail!("unknown agent '{agent_id}'. Run `parley status` to list agents");
    };

    if let Some(message) = message {
        for line in ask(&app, agent_id, &message).await? {
            println!("{line}");
        }
        return Ok(());
    }

    println!();
    println!("  Chatting with {} ({}). Type 'exit' or Ctrl+D to quit.", agent.name, agent.id);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        match ask(&app, agent_id, line).await {
            Ok(replies) => {
                println!();
                for reply in replies {
                    for text in reply.lines() {
                        println!("  {} > {text}", agent.name);
                    }
                }
                println!();
            }
            Err(e) => eprintln!("  [error] {e}\n"),
        }
    }

    app.router.shutdown().await;
    println!("\n  Goodbye!\n");
    Ok(())
}

/// One turn through the router; returns whatever landed in the widget outbox.
async fn ask(app: &App, agent_id: &str, text: &str) -> anyhow::Result<Vec<String>> {
    let mut inbound = InboundMessage::new(ChannelType::Widget, VISITOR_ID, VISITOR_ID, text);
    inbound.agent_id = Some(agent_id.to_string());
    inbound.reply_target = Some(VISITOR_ID.to_string());

    if app.router.process_inbound(inbound).await?.is_none() {
        bail!("message was dropped");
    }
    Ok(app.widget.drain(VISITOR_ID).into_iter().map(|m| m.text).collect())
}
