//! No-op memory backend — disables long-term memory entirely.

use async_trait::async_trait;
use parley_core::error::MemoryError;
use parley_core::memory::{MemoryBackend, MemorySnippet};

/// A no-op memory backend that stores nothing.
pub struct NoopMemory;

#[async_trait]
impl MemoryBackend for NoopMemory {
    fn name(&self) -> &str { "none" }

    async fn search(&self, _agent_id: &str, _query: &str, _top_k: usize) -> Result<Vec<MemorySnippet>, MemoryError> {
        Ok(Vec::new())
    }

    async fn store(&self, _agent_id: &str, _text: &str, _source_key: &str) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    async fn count(&self, _agent_id: &str) -> Result<usize, MemoryError> {
        Ok(0)
    }
}
