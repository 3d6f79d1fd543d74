pub mod broadcast;
pub mod chat;
pub mod onboard;
pub mod status;

use std::path::Path;

use anyhow::Context;
use parley_config::AppConfig;

/// Load the config from an explicit path, or the default location.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_with_env(path).with_context(|| format!("loading {}", path.display())),
        None => AppConfig::load().context("loading config"),
    }
}
