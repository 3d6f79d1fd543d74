//! Tool name resolution.
//!
//! Every tool name the model emits resolves to exactly one [`ToolRoute`].
//! Built-in prefixes are checked first so a capability provider can never
//! shadow a built-in group.

use parley_core::CapabilityRegistry;

/// Separator of legacy `provider__method` tool names.
pub const LEGACY_SEPARATOR: &str = "__";

/// Where a tool call goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRoute {
    BuiltinMemory,
    BuiltinCron,
    BuiltinAgentSpawn,
    BuiltinBrowser,
    BuiltinFilesystem,
    /// One-tool-per-provider call carrying `action` + `params`
    ProviderRouted { provider: String },
    /// Old-style `provider__method` name; arguments are the params
    LegacyNamespaced { provider: String, action: String },
    Unknown,
}

impl ToolRoute {
    /// Resolve a tool name. Total: unmatched names are [`ToolRoute::Unknown`].
    pub fn resolve(name: &str, capabilities: &CapabilityRegistry) -> Self {
        if name.starts_with("memory_") {
            return ToolRoute::BuiltinMemory;
        }
        if name.starts_with("cron_") {
            return ToolRoute::BuiltinCron;
        }
        if name.starts_with("agent_spawn") {
            return ToolRoute::BuiltinAgentSpawn;
        }
        if name.starts_with("browser_") {
            return ToolRoute::BuiltinBrowser;
        }
        if name.starts_with("fs_") {
            return ToolRoute::BuiltinFilesystem;
        }

        if capabilities.contains(name) {
            return ToolRoute::ProviderRouted {
                provider: name.to_string(),
            };
        }

        if let Some((provider, action)) = name.split_once(LEGACY_SEPARATOR)
            && !action.is_empty()
            && capabilities.contains(provider)
        {
            return ToolRoute::LegacyNamespaced {
                provider: provider.to_string(),
                action: action.to_string(),
            };
        }

        ToolRoute::Unknown
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        match self {
            ToolRoute::BuiltinMemory => "memory",
            ToolRoute::BuiltinCron => "cron",
            ToolRoute::BuiltinAgentSpawn => "agent_spawn",
            ToolRoute::BuiltinBrowser => "browser",
            ToolRoute::BuiltinFilesystem => "filesystem",
            ToolRoute::ProviderRouted { .. } => "capability",
            ToolRoute::LegacyNamespaced { .. } => "capability_legacy",
            ToolRoute::Unknown => "unknown",
        }
    }
}
