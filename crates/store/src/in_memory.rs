//! In-memory store — useful for testing and ephemeral deployments.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::StoreError;
use parley_core::{
    AgentDirectory, AgentProfile, ChannelConfig, ChannelType, Conversation, ConversationId,
    ConversationStore, NewMessage, SessionKey, SessionSummary, StoredMessage,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<StoredMessage>>,
    next_seq: i64,
    agents: BTreeMap<String, AgentProfile>,
    channels: BTreeMap<String, ChannelConfig>,
}

/// Everything behind one lock, so each operation is trivially atomic.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(id: &ConversationId) -> StoreError {
    StoreError::NotFound(format!("conversation {id}"))
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn find_active(
        &self,
        key: &SessionKey,
        since: DateTime<Utc>,
    ) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .values()
            .filter(|c| c.key() == *key && c.last_message_at.is_some_and(|at| at >= since))
            .max_by_key(|c| c.last_message_at)
            .cloned())
    }

    async fn find_unused(&self, key: &SessionKey) -> Result<Option<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .values()
            .filter(|c| c.key() == *key && c.last_message_at.is_none())
            .min_by_key(|c| c.created_at)
            .cloned())
    }

    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.conversations.contains_key(&conversation.id) {
            return Err(StoreError::Database(format!(
                "conversation {} already exists",
                conversation.id
            )));
        }
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.read().await.conversations.get(id).cloned())
    }

    async fn record_turn(&self, id: &ConversationId, now: DateTime<Utc>) -> Result<u32, StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversations.get_mut(id).ok_or_else(|| not_found(id))?;
        conversation.message_count += 1;
        conversation.last_message_at = Some(now);
        conversation.updated_at = now;
        Ok(conversation.message_count)
    }

    async fn set_summary(
        &self,
        id: &ConversationId,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversations.get_mut(id).ok_or_else(|| not_found(id))?;
        conversation.summary = Some(summary.to_string());
        conversation.updated_at = now;
        Ok(())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<StoredMessage, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(id) {
            return Err(not_found(id));
        }
        inner.next_seq += 1;
        let stored = StoredMessage {
            seq: inner.next_seq,
            conversation_id: id.clone(),
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            created_at: now,
        };
        inner.messages.entry(id.clone()).or_default().push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<StoredMessage> = inner.messages.get(id).cloned().unwrap_or_default();
        messages.sort_by(|a, b| b.seq.cmp(&a.seq));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn recent_summaries(
        &self,
        agent_id: &str,
        exclude: &ConversationId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StoreError> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<SessionSummary> = inner
            .conversations
            .values()
            .filter(|c| c.agent_id == agent_id && c.id != *exclude)
            .filter_map(|c| {
                c.summary.as_ref().map(|summary| SessionSummary {
                    conversation_id: c.id.clone(),
                    channel_type: c.channel_type.clone(),
                    summary: summary.clone(),
                    updated_at: c.updated_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn list_conversations(&self, agent_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(conversations)
    }
}

#[async_trait]
impl AgentDirectory for InMemoryStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>, StoreError> {
        Ok(self.inner.read().await.agents.get(agent_id).cloned())
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>, StoreError> {
        Ok(self.inner.read().await.agents.values().cloned().collect())
    }

    async fn upsert_agent(&self, agent: &AgentProfile) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .agents
            .insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn channel_configs(&self, agent_id: &str) -> Result<Vec<ChannelConfig>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .values()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect())
    }

    async fn find_channel_config(
        &self,
        channel_type: &ChannelType,
        channel_id: &str,
    ) -> Result<Option<ChannelConfig>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .values()
            .find(|c| c.enabled && c.channel_type == *channel_type && c.channel_id == channel_id)
            .cloned())
    }

    async fn upsert_channel_config(&self, config: &ChannelConfig) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .channels
            .insert(config.id.clone(), config.clone());
        Ok(())
    }
}
