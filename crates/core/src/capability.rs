//! Capability registry — external integrations exposed as tools.
//!
//! Each [`CapabilityProvider`] (a market-data source, a calendar, a CRM...)
//! is presented to the model as a single tool whose input names an `action`
//! and carries a `params` object. This keeps the tool count bounded no
//! matter how many methods a provider exposes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::tool::{ToolContext, ToolDescriptor};

/// One method of a capability provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the action's `params`
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object" }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// The structured outcome of a capability call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapabilityOutcome {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Text fed back to the model.
    pub fn render(&self) -> String {
        match (&self.data, &self.error) {
            (_, Some(error)) => format!("Error: {error}"),
            (Some(serde_json::Value::String(s)), None) => s.clone(),
            (Some(data), None) => {
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            }
            (None, None) => "OK".to_string(),
        }
    }
}

/// An external integration that can execute named actions.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Provider name, which is also the tool name exposed to the model.
    fn name(&self) -> &str;

    /// What this integration does (sent to the LLM).
    fn description(&self) -> &str;

    /// The actions this provider supports.
    fn actions(&self) -> Vec<ActionSpec>;

    /// Execute one action.
    async fn execute(
        &self,
        action: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<serde_json::Value, ToolError>;
}

/// Registry of capability providers keyed by name.
#[derive(Default)]
pub struct CapabilityRegistry {
    providers: BTreeMap<String, Arc<dyn CapabilityProvider>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. Replaces any existing provider with the same name.
    pub fn register(&mut self, provider: Arc<dyn CapabilityProvider>) {
        let name = provider.name().to_string();
        info!(capability = %name, "Registered capability provider");
        self.providers.insert(name, provider);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// The single "one tool per provider" descriptor for a provider.
    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        let provider = self.providers.get(name)?;
        let actions = provider.actions();
        let action_names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        let action_help = actions
            .iter()
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect::<Vec<_>>()
            .join("\n");

        Some(ToolDescriptor::new(
            name,
            format!("{}\n\nAvailable actions:\n{}", provider.description(), action_help),
            serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": action_names,
                        "description": "The action to perform"
                    },
                    "params": {
                        "type": "object",
                        "description": "Parameters for the chosen action"
                    }
                },
                "required": ["action"]
            }),
        ))
    }

    /// Descriptors for the enabled providers that are registered.
    /// Unknown names are skipped.
    pub fn descriptors_for(&self, enabled: &[String]) -> Vec<ToolDescriptor> {
        enabled.iter().filter_map(|name| self.descriptor(name)).collect()
    }

    /// Execute an action on a provider. Never fails: errors become a
    /// failed outcome.
    pub async fn execute(
        &self,
        provider_name: &str,
        action: &str,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> CapabilityOutcome {
        let Some(provider) = self.providers.get(provider_name) else {
            return CapabilityOutcome::err(format!("Capability '{provider_name}' is not available"));
        };

        if !provider.actions().iter().any(|a| a.name == action) {
            return CapabilityOutcome::err(format!(
                "Unknown action '{action}' for capability '{provider_name}'"
            ));
        }

        debug!(capability = %provider_name, action = %action, agent_id = %ctx.agent_id, "Executing capability");
        match provider.execute(action, params, ctx).await {
            Ok(data) => CapabilityOutcome::ok(data),
            Err(e) => {
                warn!(capability = %provider_name, action = %action, error = %e, "Capability call failed");
                CapabilityOutcome::err(e.to_string())
            }
        }
    }
}
