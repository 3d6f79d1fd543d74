//! Conversation (session) and persisted message records.
//!
//! A conversation binds the messages of one channel identity
//! (agent + channel type + channel id) over time. The runtime never deletes
//! conversations; it rotates to a new one once a channel identity goes idle.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelType;
use crate::message::Role;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity a session is bound to. Also used as the lookup and
/// creation-lock key by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub agent_id: String,
    pub channel_type: Option<ChannelType>,
    pub channel_id: Option<String>,
}

impl SessionKey {
    pub fn new(
        agent_id: impl Into<String>,
        channel_type: Option<ChannelType>,
        channel_id: Option<&str>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            channel_type,
            channel_id: channel_id.map(str::to_string),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.agent_id,
            self.channel_type.as_ref().map(|c| c.as_str()).unwrap_or("default"),
            self.channel_id.as_deref().unwrap_or("-"),
        )
    }
}

/// A conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,

    /// Owning agent
    pub agent_id: String,

    /// Platform user this session belongs to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,

    /// `None` for the default (widget) channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<ChannelType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    /// Number of turns recorded against this conversation
    pub message_count: u32,

    /// `None` until the first turn is recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a fresh, never-used conversation for a session key.
    pub fn new(key: &SessionKey, external_user_id: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: ConversationId::new(),
            agent_id: key.agent_id.clone(),
            external_user_id: external_user_id.map(str::to_string),
            channel_type: key.channel_type.clone(),
            channel_id: key.channel_id.clone(),
            message_count: 0,
            last_message_at: None,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The channel identity this conversation is bound to.
    pub fn key(&self) -> SessionKey {
        SessionKey {
            agent_id: self.agent_id.clone(),
            channel_type: self.channel_type.clone(),
            channel_id: self.channel_id.clone(),
        }
    }

    /// Whether a message arrived within `window` of `now`.
    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_message_at.is_some_and(|at| now - at <= window)
    }

    /// Whether this conversation is bound to a channel other than the
    /// default chat widget.
    pub fn is_external_channel(&self) -> bool {
        self.channel_type
            .as_ref()
            .is_some_and(|c| *c != ChannelType::Widget)
    }

    /// Channel label used in summaries and logs.
    pub fn channel_label(&self) -> &str {
        self.channel_type
            .as_ref()
            .map(|c| c.as_str())
            .unwrap_or("chat")
    }
}

/// A persisted conversation message.
///
/// `seq` is assigned by the store and totally orders messages by insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub seq: i64,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// A message about to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// A summary of an earlier session, surfaced to later sessions of the same
/// agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub conversation_id: ConversationId,
    pub channel_type: Option<ChannelType>,
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}
