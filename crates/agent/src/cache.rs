//! Short-lived cache of agent profiles.
//!
//! Profiles are read on every turn. Entries expire after a fixed TTL measured
//! against the injected [`Clock`], so a stale read lasts at most one window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_core::error::StoreError;
use parley_core::{AgentDirectory, AgentProfile, Clock};
use tokio::sync::RwLock;
use tracing::debug;

struct CachedProfile {
    profile: AgentProfile,
    fetched_at: DateTime<Utc>,
}

/// TTL cache in front of an [`AgentDirectory`].
pub struct AgentCache {
    directory: Arc<dyn AgentDirectory>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedProfile>>,
}

impl AgentCache {
    pub fn new(directory: Arc<dyn AgentDirectory>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            directory,
            clock,
            ttl: Duration::seconds(ttl_secs as i64),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a profile, serving from cache while the entry is fresh.
    /// Missing agents are not cached.
    pub async fn get(&self, agent_id: &str) -> Result<Option<AgentProfile>, StoreError> {
        let now = self.clock.now();
        if let Some(entry) = self.entries.read().await.get(agent_id)
            && now - entry.fetched_at < self.ttl
        {
            return Ok(Some(entry.profile.clone()));
        }

        let fetched = self.directory.get_agent(agent_id).await?;
        let mut entries = self.entries.write().await;
        match &fetched {
            Some(profile) => {
                debug!(agent_id, "Agent profile cached");
                entries.insert(
                    agent_id.to_string(),
                    CachedProfile {
                        profile: profile.clone(),
                        fetched_at: now,
                    },
                );
            }
            None => {
                entries.remove(agent_id);
            }
        }
        Ok(fetched)
    }

    /// Drop one agent's entry so the next read goes to the directory.
    pub async fn invalidate(&self, agent_id: &str) {
        self.entries.write().await.remove(agent_id);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub fn directory(&self) -> &Arc<dyn AgentDirectory> {
        &self.directory
    }
}
