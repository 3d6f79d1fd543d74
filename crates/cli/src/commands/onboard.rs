//! `parley onboard` — first-time setup.

use std::path::Path;

use anyhow::Context;
use parley_config::AppConfig;
use parley_core::{AgentFeatures, AgentProfile};

const STARTER_INSTRUCTIONS: &str = "You are a friendly assistant. Answer clearly and briefly, \
     and say so when you are not sure.";

/// The config written by `onboard`: defaults plus one starter agent.
pub fn starter_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.agents.push(
        AgentProfile::new("assistant", "Assistant")
            .with_instructions(STARTER_INSTRUCTIONS)
            .with_features(AgentFeatures {
                cron: true,
                ..AgentFeatures::default()
            }),
    );
    config
}

pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    println!("Parley — first-time setup");
    println!("=========================\n");

    if let Some(dir) = config_path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        println!("  Created config directory: {}", dir.display());
    }

    let config = starter_config();
    let workspace = config.workspace_dir();
    if !workspace.exists() {
        std::fs::create_dir_all(&workspace).with_context(|| format!("creating {}", workspace.display()))?;
        println!("  Created workspace: {}", workspace.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at {}", config_path.display());
        println!("  Edit it, or delete it and run onboard again.\n");
        return Ok(());
    }

    let toml = toml::to_string_pretty(&config).context("serializing starter config")?;
    std::fs::write(&config_path, toml).with_context(|| format!("writing {}", config_path.display()))?;
    println!("  Wrote {}", config_path.display());
    println!("\n  Next steps:");
    println!("    1. Set PARLEY_API_KEY (or add api_key to the config)");
    println!("    2. Run: parley chat --agent assistant\n");
    Ok(())
}
