//! Agent profile types.

use serde::{Deserialize, Serialize};

/// How an agent's base identity is composed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    /// Static `instructions` field only (default)
    #[default]
    Basic,
    /// Soul + context document
    Composed,
}

/// Per-agent feature flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentFeatures {
    /// Master switch for tool calling
    #[serde(default = "default_true")]
    pub tools: bool,

    #[serde(default = "default_true")]
    pub memory: bool,

    #[serde(default)]
    pub cron: bool,

    #[serde(default)]
    pub spawn: bool,

    #[serde(default)]
    pub browser: bool,

    #[serde(default)]
    pub filesystem: bool,

    /// Surface prior session summaries in the system prompt
    #[serde(default = "default_true")]
    pub session_summaries: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AgentFeatures {
    fn default() -> Self {
        Self {
            tools: true,
            memory: true,
            cron: false,
            spawn: false,
            browser: false,
            filesystem: false,
            session_summaries: true,
        }
    }
}

impl AgentFeatures {
    /// Everything off: a plain chat agent.
    pub fn none() -> Self {
        Self {
            tools: false,
            memory: false,
            cron: false,
            spawn: false,
            browser: false,
            filesystem: false,
            session_summaries: false,
        }
    }
}

/// A configured agent: personality, model, capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,

    pub name: String,

    /// Model override; the runtime default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Static instructions (Basic tier)
    #[serde(default)]
    pub instructions: String,

    /// Personality document (Composed tier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soul: Option<String>,

    /// Business context document (Composed tier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_document: Option<String>,

    #[serde(default)]
    pub memory_tier: MemoryTier,

    /// External capability providers this agent may use
    #[serde(default)]
    pub enabled_capabilities: Vec<String>,

    #[serde(default)]
    pub features: AgentFeatures,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: None,
            temperature: None,
            instructions: String::new(),
            soul: None,
            context_document: None,
            memory_tier: MemoryTier::Basic,
            enabled_capabilities: Vec::new(),
            features: AgentFeatures::default(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_features(mut self, features: AgentFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.enabled_capabilities = capabilities;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether tool calling is on for this agent.
    pub fn tools_enabled(&self) -> bool {
        self.features.tools
    }

    /// The base identity block of the system prompt.
    pub fn base_identity(&self) -> String {
        match self.memory_tier {
            MemoryTier::Composed => {
                let parts: Vec<&str> = [self.soul.as_deref(), self.context_document.as_deref()]
                    .into_iter()
                    .flatten()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.is_empty() {
                    self.instructions.clone()
                } else {
                    parts.join("\n\n")
                }
            }
            MemoryTier::Basic => self.instructions.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tier_uses_instructions() {
        let mut agent = AgentProfile::new("a1", "Helper").with_instructions("Be brief.");
        agent.soul = Some("ignored".into());
        assert_eq!(agent.base_identity(), "Be brief.");
    }

    #[test]
    fn composed_tier_joins_soul_and_context() {
        let mut agent = AgentProfile::new("a1", "Helper").with_instructions("fallback");
        agent.memory_tier = MemoryTier::Composed;
        agent.soul = Some("I am warm and precise.".into());
        agent.context_document = Some("We sell bikes.".into());
        assert_eq!(agent.base_identity(), "I am warm and precise.\n\nWe sell bikes.");

        agent.soul = None;
        agent.context_document = None;
        assert_eq!(agent.base_identity(), "fallback");
    }

    #[test]
    fn profile_parses_from_toml_with_defaults() {
        let agent: AgentProfile = toml_like(serde_json::json!({
            "id": "a1",
            "name": "Helper",
            "memory_tier": "composed",
            "features": { "spawn": true }
        }));
        assert_eq!(agent.memory_tier, MemoryTier::Composed);
        assert!(agent.features.tools);
        assert!(agent.features.spawn);
        assert!(!agent.features.browser);
        assert!(agent.enabled_capabilities.is_empty());
    }

    fn toml_like(value: serde_json::Value) -> AgentProfile {
        serde_json::from_value(value).unwrap()
    }
}
