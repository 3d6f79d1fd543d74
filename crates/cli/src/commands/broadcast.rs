//! `parley broadcast` — one message on every channel of an agent.

use std::path::Path;

use parley::Bootstrap;

use super::load_config;

pub async fn run(config_path: Option<&Path>, agent_id: &str, text: &str) -> anyhow::Result<()> {
    let app = Bootstrap::new(load_config(config_path)?).build().await?;
    let configured = app.directory.channel_configs(agent_id).await?;
    let delivered = app.router.send_to_all(agent_id, text).await?;

    let enabled = configured.iter().filter(|c| c.enabled).count();
    println!("Delivered to {delivered} of {enabled} channel(s).");
    if delivered < enabled {
        println!("Run with --verbose for the failed deliveries.");
    }
    app.router.shutdown().await;
    Ok(())
}
