//! Memory tools — let the agent search and extend its long-term memory.
//!
//! Bridges the tool loop with a [`MemoryBackend`]. Every call is scoped to
//! the calling agent.

use std::sync::Arc;

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{ToolContext, ToolDescriptor, ToolGroup, required_str};
use parley_core::MemoryBackend;
use tracing::debug;

const DEFAULT_LIMIT: usize = 5;
const MAX_LIMIT: usize = 20;

/// `memory_search` and `memory_save`.
pub struct MemoryTools {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryTools {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    async fn search(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let query = required_str(arguments, "query")?;
        let limit = arguments
            .get("limit")
            .and_then(|v| v.as_u64())
            .map_or(DEFAULT_LIMIT, |n| (n as usize).clamp(1, MAX_LIMIT));

        let results = self
            .backend
            .search(&ctx.agent_id, query, limit)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "memory_search".into(),
                reason: e.to_string(),
            })?;

        debug!(agent_id = %ctx.agent_id, hits = results.len(), "memory_search");

        if results.is_empty() {
            return Ok(format!("No memories found matching \"{query}\"."));
        }

        let mut output = format!("Found {} memories:\n", results.len());
        for (i, snippet) in results.iter().enumerate() {
            output.push_str(&format!(
                "{}. [{}] (similarity: {:.2}) {}\n",
                i + 1,
                snippet.source_key,
                snippet.similarity,
                snippet.text
            ));
        }
        Ok(output)
    }

    async fn save(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let text = required_str(arguments, "text")?;
        if text.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'text' must not be empty".into()));
        }
        let source_key = arguments
            .get("source_key")
            .and_then(|v| v.as_str())
            .unwrap_or("agent");

        let id = self
            .backend
            .store(&ctx.agent_id, text, source_key)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "memory_save".into(),
                reason: e.to_string(),
            })?;

        Ok(format!("Saved memory {id}"))
    }
}

#[async_trait]
impl ToolGroup for MemoryTools {
    fn group(&self) -> &str {
        "memory"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "memory_search",
                "Search your long-term memory for relevant facts and stored knowledge. \
                 Use this when you need to recall something you've been told before.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to look for"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of memories to return (default 5)",
                            "default": DEFAULT_LIMIT
                        }
                    },
                    "required": ["query"]
                }),
            ),
            ToolDescriptor::new(
                "memory_save",
                "Store a fact in long-term memory so it can be recalled in later conversations.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "The fact to remember"
                        },
                        "source_key": {
                            "type": "string",
                            "description": "Optional label for where the fact came from"
                        }
                    },
                    "required": ["text"]
                }),
            ),
        ]
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        match tool_name {
            "memory_search" => self.search(&arguments, ctx).await,
            "memory_save" => self.save(&arguments, ctx).await,
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}
