//! Generic webhook adapter.
//!
//! Accepts JSON posts of the form
//! `{"sender", "text", "channel_id", "reply_to"?, "agent_id"?}`. When a shared
//! secret is configured, the `X-Webhook-Signature` header must carry
//! `sha256=<hex hmac of the body>`. Replies are POSTed to the reply target if
//! it is a URL, otherwise to the configured callback URL.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use parley_core::channel::{ChannelAdapter, ChannelConfig, ChannelMessage, ChannelType, InboundMessage, InboundRequest};
use parley_core::error::ChannelError;
use serde::Deserialize;
use sha2::Sha256;
use tracing::info;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Webhook adapter settings.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    /// HMAC shared secret. `None` skips signature validation.
    pub shared_secret: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    sender: String,
    text: String,
    channel_id: String,
    #[serde(default)]
    reply_to: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
}

/// Webhook channel adapter.
pub struct WebhookAdapter {
    client: reqwest::Client,
    config: RwLock<WebhookConfig>,
}

impl WebhookAdapter {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: crate::http_client(Duration::from_secs(15)),
            config: RwLock::new(config),
        }
    }

    fn config(&self) -> WebhookConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// `sha256=<hex hmac>` for a payload.
pub fn sign_payload(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a hex HMAC-SHA256 signature, with or without the `sha256=` prefix.
pub fn validate_signature(secret: Option<&str>, payload: &[u8], signature: &str) -> bool {
    let secret = match secret {
        None | Some("") => return true,
        Some(secret) => secret,
    };
    let sig_hex = signature.strip_prefix("sha256=").unwrap_or(signature);
    let Ok(provided) = hex::decode(sig_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

#[async_trait]
impl ChannelAdapter for WebhookAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Webhook
    }

    async fn initialize(&self, config: &ChannelConfig) -> Result<(), ChannelError> {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(secret) = config.setting_str("shared_secret") {
            current.shared_secret = Some(secret.to_string());
        }
        if let Some(url) = config.setting_str("callback_url") {
            current.callback_url = Some(url.to_string());
        }
        info!(config_id = %config.id, channel_id = %config.channel_id, "Webhook channel initialized");
        Ok(())
    }

    async fn send_message(&self, target_id: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let url = if target_id.starts_with("http://") || target_id.starts_with("https://") {
            target_id.to_string()
        } else {
            self.config().callback_url.ok_or_else(|| {
                ChannelError::NotConfigured(format!("no callback URL for webhook target {target_id}"))
            })?
        };

        let body = serde_json::json!({
            "target": target_id,
            "agent_id": message.agent_id,
            "conversation_id": message.conversation_id,
            "text": message.text,
        })
        .to_string();
        let signature = self
            .config()
            .shared_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|secret| sign_payload(secret, body.as_bytes()));

        let mut request = self.client.post(&url).header("Content-Type", "application/json");
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        let request = request.body(body);

        let response = request.send().await.map_err(|e| ChannelError::DeliveryFailed {
            channel: "webhook".into(),
            reason: e.to_string(),
        })?;
        if !response.status().is_success() {
            return Err(ChannelError::DeliveryFailed {
                channel: "webhook".into(),
                reason: format!("callback returned HTTP {}", response.status()),
            });
        }
        Ok(())
    }

    async fn handle_inbound(&self, request: &InboundRequest) -> Result<Option<InboundMessage>, ChannelError> {
        let payload: WebhookPayload = serde_json::from_str(&request.body)
            .map_err(|e| ChannelError::InvalidPayload(format!("webhook: {e}")))?;
        if payload.text.trim().is_empty() {
            return Ok(None);
        }

        let mut inbound = InboundMessage::new(
            ChannelType::Webhook,
            payload.channel_id,
            payload.sender,
            payload.text.trim(),
        );
        inbound.reply_target = payload.reply_to;
        inbound.agent_id = payload.agent_id;
        Ok(Some(inbound))
    }

    fn verify_webhook(&self, request: &InboundRequest) -> bool {
        let config = self.config();
        match request.header(SIGNATURE_HEADER) {
            Some(signature) => validate_signature(config.shared_secret.as_deref(), request.body.as_bytes(), signature),
            None => matches!(config.shared_secret.as_deref(), None | Some("")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secured() -> WebhookAdapter {
        WebhookAdapter::new(WebhookConfig {
            shared_secret: Some("topsecret".into()),
            callback_url: None,
        })
    }

    #[tokio::test]
    async fn parses_payload() {
        let adapter = WebhookAdapter::new(WebhookConfig::default());
        let req = InboundRequest::new(
            r#"{"sender":"crm","text":" New lead ","channel_id":"crm-hooks","reply_to":"https://crm.example.com/cb","agent_id":"sales"}"#,
        );
        let inbound = adapter.handle_inbound(&req).await.unwrap().unwrap();
        assert_eq!(inbound.channel_type, ChannelType::Webhook);
        assert_eq!(inbound.channel_id, "crm-hooks");
        assert_eq!(inbound.sender_id, "crm");
        assert_eq!(inbound.text, "New lead");
        assert_eq!(inbound.reply_target.as_deref(), Some("https://crm.example.com/cb"));
        assert_eq!(inbound.agent_id.as_deref(), Some("sales"));
    }

    #[tokio::test]
    async fn empty_text_ignored_and_bad_json_rejected() {
        let adapter = WebhookAdapter::new(WebhookConfig::default());
        let empty = InboundRequest::new(r#"{"sender":"s","text":"  ","channel_id":"c"}"#);
        assert!(adapter.handle_inbound(&empty).await.unwrap().is_none());

        let missing = InboundRequest::new(r#"{"sender":"s"}"#);
        assert!(matches!(
            adapter.handle_inbound(&missing).await,
            Err(ChannelError::InvalidPayload(_))
        ));
    }

    #[test]
    fn signature_validation() {
        let body = br#"{"sender":"s","text":"t","channel_id":"c"}"#;
        let sig = sign_payload("topsecret", body).unwrap();
        assert!(sig.starts_with("sha256="));
        assert!(validate_signature(Some("topsecret"), body, &sig));
        assert!(validate_signature(Some("topsecret"), body, sig.trim_start_matches("sha256=")));
        assert!(!validate_signature(Some("other"), body, &sig));
        assert!(!validate_signature(Some("topsecret"), b"tampered", &sig));
        assert!(!validate_signature(Some("topsecret"), body, "sha256=not-hex"));
        assert!(validate_signature(None, body, "anything"));
    }

    #[test]
    fn verify_requires_header_when_secret_set() {
        let adapter = secured();
        let body = r#"{"sender":"s","text":"t","channel_id":"c"}"#;
        assert!(!adapter.verify_webhook(&InboundRequest::new(body)));

        let signed = InboundRequest::new(body)
            .with_header("X-Webhook-Signature", sign_payload("topsecret", body.as_bytes()).unwrap());
        assert!(adapter.verify_webhook(&signed));

        let open = WebhookAdapter::new(WebhookConfig::default());
        assert!(open.verify_webhook(&InboundRequest::new(body)));
    }

    #[tokio::test]
    async fn initialize_reads_settings() {
        let adapter = WebhookAdapter::new(WebhookConfig::default());
        let config: ChannelConfig = serde_json::from_value(serde_json::json!({
            "id": "cfg-hook",
            "agent_id": "a1",
            "channel_type": "webhook",
            "channel_id": "hooks",
            "settings": {"shared_secret": "s3", "callback_url": "https://cb.example.com"}
        }))
        .unwrap();
        adapter.initialize(&config).await.unwrap();
        let current = adapter.config();
        assert_eq!(current.shared_secret.as_deref(), Some("s3"));
        assert_eq!(current.callback_url.as_deref(), Some("https://cb.example.com"));
    }

    #[tokio::test]
    async fn send_without_callback_is_not_configured() {
        let adapter = WebhookAdapter::new(WebhookConfig::default());
        let err = adapter
            .send_message("crm-hooks", &ChannelMessage::new("a1", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::NotConfigured(_)));
    }
}
