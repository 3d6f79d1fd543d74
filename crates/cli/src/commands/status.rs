//! `parley status` — configuration, agents and channels.

use std::path::Path;

use parley::Bootstrap;
use parley_config::AppConfig;

use super::load_config;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Parley status");
    println!("=============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Workspace:    {}", config.workspace_dir().display());
    println!("  Database:     {}", config.database_url());
    println!("  Provider:     {}", config.default_provider);
    println!("  Model:        {}", config.default_model);
    println!("  Memory:       {}", config.memory.backend);
    println!(
        "  Sessions:     {} min window, summary after {} messages",
        config.session.activity_window_minutes, config.session.summary_threshold
    );
    println!("  API key:      {}", if config.has_api_key() { "set" } else { "missing" });

    let app = Bootstrap::new(config).build().await?;
    let agents = app.directory.list_agents().await?;
    println!("\n  Agents ({}):", agents.len());
    for agent in &agents {
        let conversations = app.conversations.list_conversations(&agent.id).await?;
        println!(
            "    {:<16} {:<24} {} conversation(s)",
            agent.id,
            agent.name,
            conversations.len()
        );
        for channel in app.directory.channel_configs(&agent.id).await? {
            println!(
                "      - {} {} -> {}{}",
                channel.channel_type,
                channel.channel_id,
                channel.default_target.as_deref().unwrap_or("(reply only)"),
                if channel.enabled { "" } else { " [disabled]" }
            );
        }
    }
    if agents.is_empty() {
        println!("    none. Run `parley onboard` to create a starter agent.");
    }
    Ok(())
}
