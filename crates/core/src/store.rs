//! Persistence traits — conversations, messages, agents, channel bindings.
//!
//! Implementations live in `parley-store` (in-memory and SQLite). Every
//! mutating operation is a single-row transaction; the runtime never needs
//! multi-row atomicity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::agent::AgentProfile;
use crate::channel::{ChannelConfig, ChannelType};
use crate::conversation::{
    Conversation, ConversationId, NewMessage, SessionKey, SessionSummary, StoredMessage,
};
use crate::error::StoreError;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Conversation and message persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The most recently active conversation for `key` whose last message
    /// arrived at or after `since`.
    async fn find_active(
        &self,
        key: &SessionKey,
        since: DateTime<Utc>,
    ) -> StoreResult<Option<Conversation>>;

    /// A conversation for `key` that has never recorded a turn.
    async fn find_unused(&self, key: &SessionKey) -> StoreResult<Option<Conversation>>;

    /// Insert a new conversation.
    async fn create(&self, conversation: &Conversation) -> StoreResult<()>;

    async fn get(&self, id: &ConversationId) -> StoreResult<Option<Conversation>>;

    /// Increment the message count and stamp the last-message time in one
    /// atomic update. Returns the new count.
    async fn record_turn(&self, id: &ConversationId, now: DateTime<Utc>) -> StoreResult<u32>;

    /// Persist a summary for a conversation.
    async fn set_summary(
        &self,
        id: &ConversationId,
        summary: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Append a message. The store assigns the sequence number.
    async fn append_message(
        &self,
        id: &ConversationId,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> StoreResult<StoredMessage>;

    /// Up to `limit` messages of a conversation, most recent first.
    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<StoredMessage>>;

    /// Summaries of the agent's other conversations, most recently updated
    /// first.
    async fn recent_summaries(
        &self,
        agent_id: &str,
        exclude: &ConversationId,
        limit: usize,
    ) -> StoreResult<Vec<SessionSummary>>;

    /// All conversations of an agent, newest first.
    async fn list_conversations(&self, agent_id: &str) -> StoreResult<Vec<Conversation>>;
}

/// Agent profiles and channel configurations.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, agent_id: &str) -> StoreResult<Option<AgentProfile>>;

    async fn list_agents(&self) -> StoreResult<Vec<AgentProfile>>;

    async fn upsert_agent(&self, agent: &AgentProfile) -> StoreResult<()>;

    /// Channel configurations belonging to an agent.
    async fn channel_configs(&self, agent_id: &str) -> StoreResult<Vec<ChannelConfig>>;

    /// The enabled configuration bound to a platform channel.
    async fn find_channel_config(
        &self,
        channel_type: &ChannelType,
        channel_id: &str,
    ) -> StoreResult<Option<ChannelConfig>>;

    async fn upsert_channel_config(&self, config: &ChannelConfig) -> StoreResult<()>;
}
