//! Channel adapter contract — the abstraction over messaging platforms.
//!
//! An adapter translates one platform's wire format (Slack events, Teams
//! activities, webhook payloads...) into [`InboundMessage`]s and delivers
//! [`ChannelMessage`]s back out. The router never looks past this trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// The kind of messaging platform a channel talks to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelType {
    /// The embedded chat widget (the default channel)
    Widget,
    Slack,
    Teams,
    Webhook,
    /// Any other adapter registered under a custom name
    Other(String),
}

impl ChannelType {
    pub fn as_str(&self) -> &str {
        match self {
            ChannelType::Widget => "widget",
            ChannelType::Slack => "slack",
            ChannelType::Teams => "teams",
            ChannelType::Webhook => "webhook",
            ChannelType::Other(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "widget" | "chat" => ChannelType::Widget,
            "slack" => ChannelType::Slack,
            "teams" => ChannelType::Teams,
            "webhook" => ChannelType::Webhook,
            other => ChannelType::Other(other.to_string()),
        }
    }
}

impl From<String> for ChannelType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<ChannelType> for String {
    fn from(c: ChannelType) -> Self {
        c.as_str().to_string()
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw inbound request as handed over by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl InboundRequest {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// A message received from a channel, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel_type: ChannelType,

    /// Channel-scoped id (Slack channel, Teams conversation, webhook source)
    pub channel_id: String,

    /// Platform-specific user ID of the sender
    pub sender_id: String,

    pub text: String,

    /// Thread or conversation id the message belongs to, if the platform has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Explicit destination for the reply, overriding everything else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_target: Option<String>,

    /// Owning agent, for channel types that are not pre-registered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,

    /// Platform-specific metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl InboundMessage {
    pub fn new(
        channel_type: ChannelType,
        channel_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            channel_type,
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            text: text.into(),
            thread_id: None,
            reply_target: None,
            agent_id: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// An outbound message, independent of the destination platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub text: String,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChannelMessage {
    pub fn new(agent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            agent_id: agent_id.into(),
            conversation_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// A stored channel configuration: which agent answers on which channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub id: String,
    pub agent_id: String,
    pub channel_type: ChannelType,

    /// Platform channel id this configuration is bound to
    pub channel_id: String,

    /// Where replies and broadcasts go when the event names no target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Adapter-specific settings (tokens, callback URLs...)
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl ChannelConfig {
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }
}

/// The contract every channel adapter satisfies.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The platform this adapter serves.
    fn channel_type(&self) -> ChannelType;

    /// Prepare the adapter for one channel configuration.
    async fn initialize(&self, _config: &ChannelConfig) -> std::result::Result<(), ChannelError> {
        Ok(())
    }

    /// Deliver a message to a platform destination.
    async fn send_message(
        &self,
        target_id: &str,
        message: &ChannelMessage,
    ) -> std::result::Result<(), ChannelError>;

    /// Translate a raw request into an inbound message.
    ///
    /// `Ok(None)` means the event should be ignored (bot echo, verification
    /// challenge, empty message).
    async fn handle_inbound(
        &self,
        _request: &InboundRequest,
    ) -> std::result::Result<Option<InboundMessage>, ChannelError> {
        Ok(None)
    }

    /// Verify a webhook's authenticity (signature, token).
    fn verify_webhook(&self, _request: &InboundRequest) -> bool {
        true
    }

    /// Release platform resources.
    async fn shutdown(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}
