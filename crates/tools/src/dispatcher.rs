//! Tool dispatch — the catalog an agent sees and the executor behind it.
//!
//! [`ToolDispatcher::descriptors_for`] decides which tools a given agent is
//! offered; [`ToolDispatcher::dispatch`] routes a call through
//! [`ToolRoute::resolve`] and always produces a bounded [`ToolResult`].

use std::sync::Arc;
use std::time::Instant;

use parley_core::error::ToolError;
use parley_core::tool::DEFAULT_MAX_OUTPUT_CHARS;
use parley_core::{
    AgentProfile, CapabilityRegistry, MessageToolCall, ToolCall, ToolContext, ToolDescriptor,
    ToolGroup, ToolResult,
};
use tracing::{debug, warn};

use crate::route::ToolRoute;

/// Routes tool calls to built-in groups and capability providers.
#[derive(Clone)]
pub struct ToolDispatcher {
    capabilities: Arc<CapabilityRegistry>,
    memory: Option<Arc<dyn ToolGroup>>,
    cron: Option<Arc<dyn ToolGroup>>,
    spawn: Option<Arc<dyn ToolGroup>>,
    browser: Option<Arc<dyn ToolGroup>>,
    filesystem: Option<Arc<dyn ToolGroup>>,
    max_output_chars: usize,
}

impl ToolDispatcher {
    pub fn new(capabilities: Arc<CapabilityRegistry>) -> Self {
        Self {
            capabilities,
            memory: None,
            cron: None,
            spawn: None,
            browser: None,
            filesystem: None,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    pub fn with_memory(mut self, group: Arc<dyn ToolGroup>) -> Self {
        self.memory = Some(group);
        self
    }

    pub fn with_cron(mut self, group: Arc<dyn ToolGroup>) -> Self {
        self.cron = Some(group);
        self
    }

    pub fn with_spawn(mut self, group: Arc<dyn ToolGroup>) -> Self {
        self.spawn = Some(group);
        self
    }

    pub fn with_browser(mut self, group: Arc<dyn ToolGroup>) -> Self {
        self.browser = Some(group);
        self
    }

    pub fn with_filesystem(mut self, group: Arc<dyn ToolGroup>) -> Self {
        self.filesystem = Some(group);
        self
    }

    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max;
        self
    }

    /// The same dispatcher minus `agent_spawn`. Used for sub-agents.
    pub fn without_spawn(&self) -> Self {
        Self {
            spawn: None,
            ..self.clone()
        }
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn max_output_chars(&self) -> usize {
        self.max_output_chars
    }

    /// The built-in group a route targets, if the agent may use it and the
    /// group is configured.
    fn group_for(&self, route: &ToolRoute, profile: &AgentProfile) -> Option<&Arc<dyn ToolGroup>> {
        let features = &profile.features;
        match route {
            ToolRoute::BuiltinMemory if features.memory => self.memory.as_ref(),
            ToolRoute::BuiltinCron if features.cron => self.cron.as_ref(),
            ToolRoute::BuiltinAgentSpawn if features.spawn => self.spawn.as_ref(),
            ToolRoute::BuiltinBrowser if features.browser => self.browser.as_ref(),
            ToolRoute::BuiltinFilesystem if features.filesystem => self.filesystem.as_ref(),
            _ => None,
        }
    }

    /// Every tool the agent is offered: one descriptor per enabled
    /// capability provider, then the enabled built-in groups.
    ///
    /// Empty when the agent has tools switched off.
    pub fn descriptors_for(&self, profile: &AgentProfile) -> Vec<ToolDescriptor> {
        if !profile.tools_enabled() {
            return Vec::new();
        }

        let mut descriptors = self.capabilities.descriptors_for(&profile.enabled_capabilities);

        let builtin_routes = [
            ToolRoute::BuiltinMemory,
            ToolRoute::BuiltinCron,
            ToolRoute::BuiltinAgentSpawn,
            ToolRoute::BuiltinBrowser,
            ToolRoute::BuiltinFilesystem,
        ];
        for route in &builtin_routes {
            if let Some(group) = self.group_for(route, profile) {
                descriptors.extend(group.descriptors());
            }
        }
        descriptors
    }

    /// Execute one call. Never fails: every error becomes a failed result,
    /// and output is clipped to the configured maximum.
    pub async fn dispatch(&self, profile: &AgentProfile, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let started = Instant::now();
        let route = ToolRoute::resolve(&call.name, &self.capabilities);
        let not_found = || ToolResult {
            call_id: call.id.clone(),
            success: false,
            output: format!("Tool '{}' not found", call.name),
        };

        let result = match &route {
            ToolRoute::Unknown => not_found(),

            ToolRoute::ProviderRouted { provider } => {
                if !profile.enabled_capabilities.contains(provider) {
                    not_found()
                } else {
                    let action = call.arguments.get("action").and_then(|v| v.as_str());
                    match action {
                        None => ToolResult::failure(
                            &call.id,
                            ToolError::InvalidArguments("Missing 'action' argument".into()),
                        ),
                        Some(action) => {
                            let params = call
                                .arguments
                                .get("params")
                                .cloned()
                                .unwrap_or_else(|| serde_json::json!({}));
                            let outcome = self.capabilities.execute(provider, action, params, ctx).await;
                            ToolResult {
                                call_id: call.id.clone(),
                                success: outcome.success,
                                output: outcome.render(),
                            }
                        }
                    }
                }
            }

            ToolRoute::LegacyNamespaced { provider, action } => {
                if !profile.enabled_capabilities.contains(provider) {
                    not_found()
                } else {
                    let outcome = self
                        .capabilities
                        .execute(provider, action, call.arguments.clone(), ctx)
                        .await;
                    ToolResult {
                        call_id: call.id.clone(),
                        success: outcome.success,
                        output: outcome.render(),
                    }
                }
            }

            builtin => match self.group_for(builtin, profile) {
                None => not_found(),
                Some(group) => match group.execute(&call.name, call.arguments.clone(), ctx).await {
                    Ok(output) => ToolResult::success(&call.id, output),
                    Err(ToolError::NotFound(_)) => not_found(),
                    Err(e) => ToolResult::failure(&call.id, e),
                },
            },
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if result.success {
            debug!(tool = %call.name, route = route.label(), agent_id = %ctx.agent_id, elapsed_ms, "Tool call succeeded");
        } else {
            warn!(tool = %call.name, route = route.label(), agent_id = %ctx.agent_id, elapsed_ms, output = %result.output, "Tool call failed");
        }

        result.bounded(self.max_output_chars)
    }
}

/// Turn a model-emitted tool call into an executable [`ToolCall`].
///
/// Empty argument strings are treated as `{}`.
pub fn parse_call(call: &MessageToolCall) -> Result<ToolCall, ToolError> {
    let raw = call.arguments.trim();
    let arguments = if raw.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(raw).map_err(|e| {
            ToolError::InvalidArguments(format!("Arguments for '{}' are not valid JSON: {e}", call.name))
        })?
    };

    Ok(ToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments,
    })
}
