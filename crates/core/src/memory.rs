//! Memory trait — per-agent long-term knowledge recall.
//!
//! The runtime only ever asks for ranked snippets for a query; how they are
//! ranked (keyword, vector, hybrid) is the backend's business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A recalled piece of memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnippet {
    /// The snippet text
    pub text: String,

    /// Relevance in `[0, 1]`, higher is better
    pub similarity: f32,

    /// Where the snippet came from (document, conversation, tool output...)
    pub source_key: String,

    /// Line range within the source, when the source is a document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<(u32, u32)>,
}

impl MemorySnippet {
    pub fn new(text: impl Into<String>, similarity: f32, source_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            similarity,
            source_key: source_key.into(),
            line_range: None,
        }
    }
}

/// The core MemoryBackend trait.
///
/// Implementations: SQLite full-text, in-memory (for testing), none (no-op).
/// Every operation is scoped to one agent.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory", "none").
    fn name(&self) -> &str;

    /// Ranked snippets for a query, best first, at most `top_k`.
    async fn search(
        &self,
        agent_id: &str,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<Vec<MemorySnippet>, MemoryError>;

    /// Store a piece of text. Returns the new entry's id.
    async fn store(
        &self,
        agent_id: &str,
        text: &str,
        source_key: &str,
    ) -> std::result::Result<String, MemoryError>;

    /// Number of entries stored for an agent.
    async fn count(&self, agent_id: &str) -> std::result::Result<usize, MemoryError>;
}

/// Keep the snippets at or above `min_similarity`, preserving order.
pub fn filter_relevant(snippets: Vec<MemorySnippet>, min_similarity: f32) -> Vec<MemorySnippet> {
    snippets
        .into_iter()
        .filter(|s| s.similarity >= min_similarity)
        .collect()
}
