//! `agent_spawn` — hand a self-contained task to an isolated sub-agent.
//!
//! The actual sub-agent lives in the agent crate; this group only validates
//! arguments and forwards them through [`SubAgentSpawner`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{ToolContext, ToolDescriptor, ToolGroup, required_str};

/// Runs one sub-agent turn to completion or timeout.
#[async_trait]
pub trait SubAgentSpawner: Send + Sync {
    /// Run `task` as a fresh, isolated turn for the calling agent.
    /// `timeout` is `None` for the spawner's default.
    async fn spawn(
        &self,
        ctx: &ToolContext,
        task: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ToolError>;
}

/// The `agent_spawn` tool.
pub struct SpawnTool {
    spawner: Arc<dyn SubAgentSpawner>,
}

impl SpawnTool {
    pub fn new(spawner: Arc<dyn SubAgentSpawner>) -> Self {
        Self { spawner }
    }
}

#[async_trait]
impl ToolGroup for SpawnTool {
    fn group(&self) -> &str {
        "agent_spawn"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "agent_spawn",
            "Delegate a self-contained task to a sub-agent and wait for its answer. \
             The sub-agent starts with no conversation history.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "description": "Complete description of what the sub-agent should do"
                    },
                    "timeout_secs": {
                        "type": "integer",
                        "description": "Optional time limit in seconds"
                    }
                },
                "required": ["task"]
            }),
        )]
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        if tool_name != "agent_spawn" {
            return Err(ToolError::NotFound(tool_name.to_string()));
        }

        let task = required_str(&arguments, "task")?;
        if task.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'task' must not be empty".into()));
        }
        let timeout = match arguments.get("timeout_secs") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(0) | None => {
                    return Err(ToolError::InvalidArguments(
                        "'timeout_secs' must be a positive integer".into(),
                    ));
                }
                Some(secs) => Some(Duration::from_secs(secs)),
            },
        };

        self.spawner.spawn(ctx, task, timeout).await
    }
}
