//! Slack adapter (Events API in, `chat.postMessage` out).
//!
//! Reply targets are `"<channel>"` or `"<channel>:<thread_ts>"`. Inbound
//! requests are verified with Slack's `v0` signing scheme when a signing
//! secret is known.
//!
//! Bot tokens belong to the agent whose channel config supplied them. A
//! send only ever uses a token owned by the sending agent: the one
//! configured for the target channel, or for targets that agent has no
//! config for (DMs, ad-hoc channels), a token from one of its own configs.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parley_core::channel::{ChannelAdapter, ChannelConfig, ChannelMessage, ChannelType, InboundMessage, InboundRequest};
use parley_core::error::ChannelError;
use sha2::Sha256;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

const SLACK_API: &str = "https://slack.com/api";

/// Slack channel adapter.
pub struct SlackAdapter {
    client: reqwest::Client,
    api_base: String,
    signing_secrets: RwLock<Vec<String>>,
    /// Bot token per configured Slack channel id
    bot_tokens: RwLock<HashMap<String, BotToken>>,
    /// Bot token per agent id
    agent_tokens: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Clone)]
struct BotToken {
    agent_id: String,
    token: String,
}

impl Default for SlackAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SlackAdapter {
    pub fn new() -> Self {
        Self {
            client: crate::http_client(Duration::from_secs(15)),
            api_base: SLACK_API.to_string(),
            signing_secrets: RwLock::new(Vec::new()),
            bot_tokens: RwLock::new(HashMap::new()),
            agent_tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_signing_secret(self, secret: impl Into<String>) -> Self {
        self.add_signing_secret(secret.into());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn add_signing_secret(&self, secret: String) {
        let mut secrets = self.signing_secrets.write().unwrap_or_else(PoisonError::into_inner);
        if !secret.is_empty() && !secrets.contains(&secret) {
            secrets.push(secret);
        }
    }

    fn token_for(&self, channel: &str, agent_id: &str) -> Option<String> {
        let tokens = self.bot_tokens.read().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(channel) {
            Some(bot) if bot.agent_id == agent_id => Some(bot.token.clone()),
            // Another agent's channel
            Some(_) => None,
            None => self
                .agent_tokens
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(agent_id)
                .cloned(),
        }
    }
}

/// `v0=<hex hmac of "v0:<timestamp>:<body>">`
pub fn slack_signature(secret: &str, timestamp: &str, body: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(format!("v0:{timestamp}:{body}").as_bytes());
    Some(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

fn verify_v0(secret: &str, timestamp: &str, body: &str, signature: &str) -> bool {
    let Some(provided) = signature.strip_prefix("v0=").and_then(|h| hex::decode(h).ok()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{timestamp}:{body}").as_bytes());
    mac.verify_slice(&provided).is_ok()
}

/// Split `"C1:1700.01"` into channel and thread timestamp.
fn split_target(target_id: &str) -> (&str, Option<&str>) {
    match target_id.split_once(':') {
        Some((channel, ts)) if !ts.is_empty() => (channel, Some(ts)),
        _ => (target_id, None),
    }
}

#[async_trait]
impl ChannelAdapter for SlackAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Slack
    }

    async fn initialize(&self, config: &ChannelConfig) -> Result<(), ChannelError> {
        let token = config.setting_str("bot_token").ok_or_else(|| {
            ChannelError::InitFailed(format!("slack config '{}' has no bot_token", config.id))
        })?;
        self.bot_tokens.write().unwrap_or_else(PoisonError::into_inner).insert(
            config.channel_id.clone(),
            BotToken {
                agent_id: config.agent_id.clone(),
                token: token.to_string(),
            },
        );
        self.agent_tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(config.agent_id.clone())
            .or_insert_with(|| token.to_string());
        if let Some(secret) = config.setting_str("signing_secret") {
            self.add_signing_secret(secret.to_string());
        }
        info!(config_id = %config.id, channel_id = %config.channel_id, "Slack channel initialized");
        Ok(())
    }

    async fn send_message(&self, target_id: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let (channel, thread_ts) = split_target(target_id);
        let token = self.token_for(channel, &message.agent_id).ok_or_else(|| {
            ChannelError::NotConfigured(format!(
                "no Slack bot token for agent {} in channel {channel}",
                message.agent_id
            ))
        })?;

        let mut body = serde_json::json!({ "channel": channel, "text": message.text });
        if let Some(ts) = thread_ts {
            body["thread_ts"] = serde_json::Value::String(ts.to_string());
        }

        let delivery_failed = |reason: String| ChannelError::DeliveryFailed {
            channel: "slack".into(),
            reason,
        };
        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| delivery_failed(e.to_string()))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| delivery_failed(format!("unreadable response ({status}): {e}")))?;
        if payload["ok"].as_bool() != Some(true) {
            let error = payload["error"].as_str().unwrap_or("unknown_error");
            return Err(delivery_failed(error.to_string()));
        }
        Ok(())
    }

    async fn handle_inbound(&self, request: &InboundRequest) -> Result<Option<InboundMessage>, ChannelError> {
        let payload: serde_json::Value = serde_json::from_str(&request.body)
            .map_err(|e| ChannelError::InvalidPayload(format!("slack: {e}")))?;

        match payload["type"].as_str() {
            Some("url_verification") => {
                debug!("Ignoring Slack URL verification");
                return Ok(None);
            }
            Some("event_callback") => {}
            other => {
                debug!(kind = ?other, "Ignoring Slack payload");
                return Ok(None);
            }
        }

        let event = &payload["event"];
        if !matches!(event["type"].as_str(), Some("message") | Some("app_mention")) {
            return Ok(None);
        }
        if event.get("bot_id").is_some_and(|v| !v.is_null()) || event["subtype"].as_str().is_some() {
            debug!("Ignoring Slack bot or subtype message");
            return Ok(None);
        }

        let text = event["text"].as_str().unwrap_or_default().trim();
        let (Some(channel), Some(user)) = (event["channel"].as_str(), event["user"].as_str()) else {
            return Ok(None);
        };
        if text.is_empty() {
            return Ok(None);
        }

        let mut inbound = InboundMessage::new(ChannelType::Slack, channel, user, text);
        inbound.thread_id = Some(match event["thread_ts"].as_str() {
            Some(ts) => format!("{channel}:{ts}"),
            None => channel.to_string(),
        });
        if let Some(team) = payload["team_id"].as_str() {
            inbound.metadata.insert("team_id".into(), team.into());
        }
        Ok(Some(inbound))
    }

    fn verify_webhook(&self, request: &InboundRequest) -> bool {
        let secrets = self.signing_secrets.read().unwrap_or_else(PoisonError::into_inner);
        if secrets.is_empty() {
            return true;
        }
        let (Some(timestamp), Some(signature)) = (
            request.header("x-slack-request-timestamp"),
            request.header("x-slack-signature"),
        ) else {
            return false;
        };
        secrets
            .iter()
            .any(|secret| verify_v0(secret, timestamp, &request.body, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChannelConfig {
        serde_json::from_value(serde_json::json!({
            "id": "cfg-slack",
            "agent_id": "a1",
            "channel_type": "slack",
            "channel_id": "C1",
            "settings": { "bot_token": "xoxb-test", "signing_secret": "shh" }
        }))
        .unwrap()
    }

    fn event(event: serde_json::Value) -> InboundRequest {
        InboundRequest::new(
            serde_json::json!({"type": "event_callback", "team_id": "T1", "event": event}).to_string(),
        )
    }

    #[tokio::test]
    async fn parses_channel_message() {
        let adapter = SlackAdapter::new();
        let inbound = adapter
            .handle_inbound(&event(serde_json::json!({
                "type": "message", "channel": "C1", "user": "U1", "text": " hi there ", "ts": "1700.01"
            })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.channel_id, "C1");
        assert_eq!(inbound.sender_id, "U1");
        assert_eq!(inbound.text, "hi there");
        assert_eq!(inbound.thread_id.as_deref(), Some("C1"));
        assert_eq!(inbound.metadata["team_id"], "T1");
    }

    #[tokio::test]
    async fn threads_reply_into_thread() {
        let adapter = SlackAdapter::new();
        let inbound = adapter
            .handle_inbound(&event(serde_json::json!({
                "type": "message", "channel": "C1", "user": "U1", "text": "more", "thread_ts": "1700.01"
            })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(inbound.thread_id.as_deref(), Some("C1:1700.01"));
    }

    #[tokio::test]
    async fn ignores_verification_bots_and_empty_text() {
        let adapter = SlackAdapter::new();
        let challenge = InboundRequest::new(r#"{"type":"url_verification","challenge":"abc"}"#);
        assert!(adapter.handle_inbound(&challenge).await.unwrap().is_none());

        for ev in [
            serde_json::json!({"type": "message", "channel": "C1", "bot_id": "B1", "text": "echo"}),
            serde_json::json!({"type": "message", "subtype": "message_changed", "channel": "C1", "user": "U1", "text": "x"}),
            serde_json::json!({"type": "message", "channel": "C1", "user": "U1", "text": "   "}),
            serde_json::json!({"type": "reaction_added", "user": "U1"}),
        ] {
            assert!(adapter.handle_inbound(&event(ev)).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_payload() {
        let adapter = SlackAdapter::new();
        let err = adapter.handle_inbound(&InboundRequest::new("not json")).await.unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn verifies_v0_signature_from_config_secret() {
        let adapter = SlackAdapter::new();
        let body = r#"{"type":"event_callback"}"#;
        let unsigned = InboundRequest::new(body);
        assert!(adapter.verify_webhook(&unsigned), "no secret known yet");

        adapter.initialize(&config()).await.unwrap();
        assert!(!adapter.verify_webhook(&unsigned));

        let good = InboundRequest::new(body)
            .with_header("X-Slack-Request-Timestamp", "1700000000")
            .with_header("X-Slack-Signature", slack_signature("shh", "1700000000", body).unwrap());
        assert!(adapter.verify_webhook(&good));

        let tampered = InboundRequest::new(r#"{"type":"evil"}"#)
            .with_header("X-Slack-Request-Timestamp", "1700000000")
            .with_header("X-Slack-Signature", slack_signature("shh", "1700000000", body).unwrap());
        assert!(!adapter.verify_webhook(&tampered));
    }

    #[tokio::test]
    async fn initialize_requires_bot_token() {
        let adapter = SlackAdapter::new();
        let mut cfg = config();
        cfg.settings.remove("bot_token");
        assert!(matches!(adapter.initialize(&cfg).await, Err(ChannelError::InitFailed(_))));
    }

    #[tokio::test]
    async fn send_without_token_is_not_configured() {
        let adapter = SlackAdapter::new();
        let err = adapter
            .send_message("C1", &ChannelMessage::new("a1", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    fn tenant(agent_id: &str, channel_id: &str, token: &str) -> ChannelConfig {
        serde_json::from_value(serde_json::json!({
            "id": format!("cfg-{agent_id}"),
            "agent_id": agent_id,
            "channel_type": "slack",
            "channel_id": channel_id,
            "settings": { "bot_token": token }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn tokens_never_cross_agents() {
        let adapter = SlackAdapter::new();
        adapter.initialize(&tenant("tenant-a", "CA", "xoxb-tenant-a")).await.unwrap();
        adapter.initialize(&tenant("tenant-c", "CC", "xoxb-tenant-c")).await.unwrap();

        assert_eq!(adapter.token_for("CA", "tenant-a").as_deref(), Some("xoxb-tenant-a"));
        // DMs fall back to the agent's own token
        assert_eq!(adapter.token_for("D-tenant-a-dm", "tenant-a").as_deref(), Some("xoxb-tenant-a"));
        assert_eq!(adapter.token_for("CC", "tenant-a"), None);
        assert_eq!(adapter.token_for("D-tenant-b-dm", "tenant-b"), None);
        assert_eq!(adapter.token_for("CA", "tenant-b"), None);

        let err = adapter
            .send_message("D-tenant-b-dm", &ChannelMessage::new("tenant-b", "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }

    #[test]
    fn target_splitting() {
        assert_eq!(split_target("C1"), ("C1", None));
        assert_eq!(split_target("C1:1700.01"), ("C1", Some("1700.01")));
        assert_eq!(split_target("C1:"), ("C1:", None));
    }
}
