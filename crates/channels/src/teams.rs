//! Microsoft Teams adapter (Bot Framework activities).
//!
//! The reply target is the Bot Framework conversation id. Replies are posted
//! to the service URL the conversation last arrived from, or the configured
//! `service_url` when none has been seen.
//!
//! Bot credentials are scoped like Slack tokens: the config for the target
//! channel when the sending agent owns it, otherwise any config of the
//! sending agent. Remembered service URLs are bounded; the oldest
//! conversation is forgotten first and falls back to the configured URL.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use parley_core::channel::{ChannelAdapter, ChannelConfig, ChannelMessage, ChannelType, InboundMessage, InboundRequest};
use parley_core::error::ChannelError;
use tracing::{debug, info};

/// Conversations whose service URL is remembered at once.
pub const DEFAULT_CONVERSATION_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Default)]
struct TeamsSettings {
    agent_id: String,
    bot_token: Option<String>,
    service_url: Option<String>,
}

/// Service URL per conversation, evicting the least recently seen.
#[derive(Debug, Default)]
struct ServiceUrls {
    entries: HashMap<String, (u64, String)>,
    seq: u64,
}

impl ServiceUrls {
    fn remember(&mut self, conversation_id: &str, url: String, capacity: usize) {
        self.seq += 1;
        if !self.entries.contains_key(conversation_id) && self.entries.len() >= capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (seen, _))| *seen)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(conversation_id.to_string(), (self.seq, url));
    }

    fn get(&self, conversation_id: &str) -> Option<String> {
        self.entries.get(conversation_id).map(|(_, url)| url.clone())
    }
}

/// Teams channel adapter.
pub struct TeamsAdapter {
    client: reqwest::Client,
    /// Settings per configured channel id
    channels: RwLock<HashMap<String, TeamsSettings>>,
    /// First settings seen per agent id
    agents: RwLock<HashMap<String, TeamsSettings>>,
    service_urls: RwLock<ServiceUrls>,
    capacity: usize,
}

impl Default for TeamsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl TeamsAdapter {
    pub fn new() -> Self {
        Self {
            client: crate::http_client(Duration::from_secs(15)),
            channels: RwLock::new(HashMap::new()),
            agents: RwLock::new(HashMap::new()),
            service_urls: RwLock::new(ServiceUrls::default()),
            capacity: DEFAULT_CONVERSATION_CAPACITY,
        }
    }

    pub fn with_conversation_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Settings the agent may send to `target_id` with.
    fn settings_for(&self, target_id: &str, agent_id: &str) -> Option<TeamsSettings> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        match channels.get(target_id) {
            Some(settings) if settings.agent_id == agent_id => Some(settings.clone()),
            Some(_) => None,
            None => self
                .agents
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(agent_id)
                .cloned(),
        }
    }

    fn seen_service_url(&self, conversation_id: &str) -> Option<String> {
        self.service_urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
    }
}

/// Drop `<at>Bot</at>` mentions and surrounding whitespace.
fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<at>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</at>") {
            Some(end) => rest = &rest[start + end + "</at>".len()..],
            None => {
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ChannelAdapter for TeamsAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Teams
    }

    async fn initialize(&self, config: &ChannelConfig) -> Result<(), ChannelError> {
        let settings = TeamsSettings {
            agent_id: config.agent_id.clone(),
            bot_token: config.setting_str("bot_token").map(str::to_string),
            service_url: config
                .setting_str("service_url")
                .map(|url| url.trim_end_matches('/').to_string()),
        };
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(config.agent_id.clone())
            .or_insert_with(|| settings.clone());
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(config.channel_id.clone(), settings);
        info!(config_id = %config.id, channel_id = %config.channel_id, "Teams channel initialized");
        Ok(())
    }

    async fn send_message(&self, target_id: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let settings = self.settings_for(target_id, &message.agent_id).ok_or_else(|| {
            ChannelError::NotConfigured(format!(
                "no Teams config for agent {} in conversation {target_id}",
                message.agent_id
            ))
        })?;
        let service_url = self
            .seen_service_url(target_id)
            .or(settings.service_url)
            .ok_or_else(|| ChannelError::NotConfigured(format!("no Teams service URL for {target_id}")))?;

        let url = format!("{service_url}/v3/conversations/{target_id}/activities");
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "type": "message",
            "text": message.text,
            "textFormat": "markdown",
        }));
        if let Some(token) = settings.bot_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| ChannelError::DeliveryFailed {
            channel: "teams".into(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(ChannelError::DeliveryFailed {
                channel: "teams".into(),
                reason: format!("HTTP {}", response.status()),
            });
        }
        Ok(())
    }

    async fn handle_inbound(&self, request: &InboundRequest) -> Result<Option<InboundMessage>, ChannelError> {
        let activity: serde_json::Value = serde_json::from_str(&request.body)
            .map_err(|e| ChannelError::InvalidPayload(format!("teams: {e}")))?;

        if activity["type"].as_str() != Some("message") {
            debug!(kind = ?activity["type"].as_str(), "Ignoring Teams activity");
            return Ok(None);
        }
        if activity["from"]["role"].as_str() == Some("bot") {
            return Ok(None);
        }

        let text = strip_mentions(activity["text"].as_str().unwrap_or_default());
        let (Some(conversation_id), Some(sender)) =
            (activity["conversation"]["id"].as_str(), activity["from"]["id"].as_str())
        else {
            return Err(ChannelError::InvalidPayload("teams: missing conversation or sender".into()));
        };
        if text.is_empty() {
            return Ok(None);
        }

        if let Some(url) = activity["serviceUrl"].as_str() {
            self.service_urls.write().unwrap_or_else(PoisonError::into_inner).remember(
                conversation_id,
                url.trim_end_matches('/').to_string(),
                self.capacity,
            );
        }

        let channel_id = activity["channelData"]["channel"]["id"]
            .as_str()
            .unwrap_or(conversation_id);
        let mut inbound = InboundMessage::new(ChannelType::Teams, channel_id, sender, text);
        inbound.thread_id = Some(conversation_id.to_string());
        if let Some(name) = activity["from"]["name"].as_str() {
            inbound.metadata.insert("sender_name".into(), name.into());
        }
        Ok(Some(inbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activity(text: &str) -> InboundRequest {
        InboundRequest::new(
            serde_json::json!({
                "type": "message",
                "text": text,
                "from": {"id": "29:user", "name": "Dana"},
                "conversation": {"id": "19:conv@thread"},
                "serviceUrl": "https://smba.example.com/emea/"
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn parses_message_activity() {
        let adapter = TeamsAdapter::new();
        let inbound = adapter
            .handle_inbound(&activity("<at>Parley</at> what's new?"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.channel_type, ChannelType::Teams);
        assert_eq!(inbound.channel_id, "19:conv@thread");
        assert_eq!(inbound.sender_id, "29:user");
        assert_eq!(inbound.text, "what's new?");
        assert_eq!(inbound.thread_id.as_deref(), Some("19:conv@thread"));
        assert_eq!(
            adapter.seen_service_url("19:conv@thread").as_deref(),
            Some("https://smba.example.com/emea")
        );
    }

    #[tokio::test]
    async fn ignores_non_messages_and_bots() {
        let adapter = TeamsAdapter::new();
        let typing = InboundRequest::new(r#"{"type":"typing","from":{"id":"u"},"conversation":{"id":"c"}}"#);
        assert!(adapter.handle_inbound(&typing).await.unwrap().is_none());

        let bot = InboundRequest::new(
            r#"{"type":"message","text":"hi","from":{"id":"b","role":"bot"},"conversation":{"id":"c"}}"#,
        );
        assert!(adapter.handle_inbound(&bot).await.unwrap().is_none());

        assert!(adapter.handle_inbound(&activity("<at>Parley</at>")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_conversation_is_invalid() {
        let adapter = TeamsAdapter::new();
        let req = InboundRequest::new(r#"{"type":"message","text":"hi","from":{"id":"u"}}"#);
        assert!(matches!(
            adapter.handle_inbound(&req).await,
            Err(ChannelError::InvalidPayload(_))
        ));
    }

    #[tokio::test]
    async fn send_needs_service_url() {
        let adapter = TeamsAdapter::new();
        let err = adapter
            .send_message("19:unknown", &ChannelMessage::new("a1", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    fn bot(agent_id: &str, conversation_id: &str, token: &str) -> ChannelConfig {
        serde_json::from_value(serde_json::json!({
            "id": format!("cfg-{agent_id}"),
            "agent_id": agent_id,
            "channel_type": "teams",
            "channel_id": conversation_id,
            "settings": { "bot_token": token, "service_url": format!("https://{agent_id}.example.com/") }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn credentials_stay_with_their_agent() {
        let adapter = TeamsAdapter::new();
        adapter.initialize(&bot("agent-a", "19:a", "token-A")).await.unwrap();
        adapter.initialize(&bot("agent-b", "19:b", "token-B")).await.unwrap();

        let a = adapter.settings_for("19:a", "agent-a").unwrap();
        assert_eq!(a.bot_token.as_deref(), Some("token-A"));
        assert_eq!(a.service_url.as_deref(), Some("https://agent-a.example.com"));
        let b = adapter.settings_for("19:b", "agent-b").unwrap();
        assert_eq!(b.bot_token.as_deref(), Some("token-B"));

        // An unconfigured conversation uses the sender's own bot
        let adhoc = adapter.settings_for("19:new", "agent-a").unwrap();
        assert_eq!(adhoc.bot_token.as_deref(), Some("token-A"));

        assert!(adapter.settings_for("19:b", "agent-a").is_none());
        assert!(adapter.settings_for("19:a", "agent-c").is_none());
        let err = adapter
            .send_message("19:a", &ChannelMessage::new("agent-c", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn service_urls_are_bounded() {
        let adapter = TeamsAdapter::new().with_conversation_capacity(2);
        for (conversation, region) in [("19:one", "emea"), ("19:two", "amer"), ("19:three", "apac")] {
            let req = InboundRequest::new(
                serde_json::json!({
                    "type": "message",
                    "text": "hi",
                    "from": {"id": "29:user"},
                    "conversation": {"id": conversation},
                    "serviceUrl": format!("https://smba.example.com/{region}")
                })
                .to_string(),
            );
            adapter.handle_inbound(&req).await.unwrap();
        }
        assert!(adapter.seen_service_url("19:one").is_none());
        assert_eq!(
            adapter.seen_service_url("19:three").as_deref(),
            Some("https://smba.example.com/apac")
        );
        assert!(adapter.seen_service_url("19:two").is_some());
    }

    #[test]
    fn mention_stripping() {
        assert_eq!(strip_mentions("<at>Bot</at>  hello   there"), "hello there");
        assert_eq!(strip_mentions("no mentions"), "no mentions");
        assert_eq!(strip_mentions("a <at>unclosed"), "a");
    }
}
