//! In-memory backend — useful for testing and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use parley_core::error::MemoryError;
use parley_core::memory::{MemoryBackend, MemorySnippet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::term_overlap;

struct Entry {
    id: String,
    text: String,
    source_key: String,
}

/// An in-memory backend keeping each agent's entries in a Vec.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Vec<Entry>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str { "in_memory" }

    async fn search(&self, agent_id: &str, query: &str, top_k: usize) -> Result<Vec<MemorySnippet>, MemoryError> {
        let entries = self.entries.read().await;
        let Some(agent_entries) = entries.get(agent_id) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<MemorySnippet> = agent_entries
            .iter()
            .filter_map(|e| {
                let similarity = term_overlap(query, &e.text);
                (similarity > 0.0).then(|| MemorySnippet::new(&e.text, similarity, &e.source_key))
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);
        Ok(results)
    }

    async fn store(&self, agent_id: &str, text: &str, source_key: &str) -> Result<String, MemoryError> {
        let id = Uuid::new_v4().to_string();
        self.entries
            .write()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .push(Entry {
                id: id.clone(),
                text: text.to_string(),
                source_key: source_key.to_string(),
            });
        Ok(id)
    }

    async fn count(&self, agent_id: &str) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.get(agent_id).map_or(0, Vec::len))
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("id", &self.id).finish()
    }
}
