//! Tool types — what the model can call and what it gets back.
//!
//! Tools are exposed to the model as [`ToolDescriptor`]s. Built-in tool
//! groups implement [`ToolGroup`]; external integrations are reached through
//! the capability registry instead.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// Marker appended to tool output clipped by [`truncate_output`].
pub const TRUNCATION_MARKER: &str = "\n[OUTPUT TRUNCATED]";

/// Default maximum characters of tool output fed back to the model.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 20_000;

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,
}

impl ToolResult {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: format!("Error: {error}"),
        }
    }

    /// Clip the output to `max_chars` characters (see [`truncate_output`]).
    pub fn bounded(mut self, max_chars: usize) -> Self {
        self.output = truncate_output(&self.output, max_chars);
        self
    }
}

/// Clip `output` to `max_chars` characters followed by [`TRUNCATION_MARKER`].
///
/// Idempotent: output that already consists of at most `max_chars`
/// characters plus the marker is returned unchanged.
pub fn truncate_output(output: &str, max_chars: usize) -> String {
    if let Some(body) = output.strip_suffix(TRUNCATION_MARKER)
        && body.chars().count() <= max_chars
    {
        return output.to_string();
    }

    match output.char_indices().nth(max_chars) {
        None => output.to_string(),
        Some((cut, _)) => format!("{}{}", &output[..cut], TRUNCATION_MARKER),
    }
}

/// Per-call context handed to tool implementations.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub agent_id: String,
    pub conversation_id: Option<String>,
}

impl ToolContext {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            conversation_id: None,
        }
    }
}

/// A first-class built-in tool group (memory, cron, browser, ...).
///
/// A group owns a fixed set of tool names sharing one prefix and executes
/// any of them.
#[async_trait]
pub trait ToolGroup: Send + Sync {
    /// Group label used in logs (e.g., "memory").
    fn group(&self) -> &str;

    /// Descriptors for every tool in the group.
    fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Execute one tool of the group; returns the textual output.
    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> std::result::Result<String, ToolError>;
}

/// Fetch a required string argument.
pub fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> std::result::Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}
