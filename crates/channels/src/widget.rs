//! The embedded chat widget.
//!
//! Replies are queued in an in-process outbox keyed by visitor id and
//! collected by whoever serves the widget (the CLI chat loop drains it
//! directly). Whoever serves the widget must drain it: each visitor keeps at
//! most [`DEFAULT_VISITOR_BACKLOG`] undelivered replies, oldest dropped first.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use parley_core::channel::{ChannelAdapter, ChannelMessage, ChannelType, InboundMessage, InboundRequest};
use parley_core::error::ChannelError;
use serde::Deserialize;
use tracing::warn;

/// Undelivered replies kept per visitor.
pub const DEFAULT_VISITOR_BACKLOG: usize = 100;

#[derive(Debug, Deserialize)]
struct WidgetPayload {
    visitor_id: String,
    text: String,
    #[serde(default)]
    agent_id: Option<String>,
}

/// Widget channel adapter.
pub struct WidgetAdapter {
    outbox: Mutex<HashMap<String, Vec<ChannelMessage>>>,
    backlog: usize,
}

impl Default for WidgetAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetAdapter {
    pub fn new() -> Self {
        Self {
            outbox: Mutex::new(HashMap::new()),
            backlog: DEFAULT_VISITOR_BACKLOG,
        }
    }

    pub fn with_backlog(mut self, backlog: usize) -> Self {
        self.backlog = backlog.max(1);
        self
    }

    /// Take every queued message for a visitor, oldest first.
    pub fn drain(&self, visitor_id: &str) -> Vec<ChannelMessage> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(visitor_id)
            .unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

#[async_trait]
impl ChannelAdapter for WidgetAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Widget
    }

    async fn send_message(&self, target_id: &str, message: &ChannelMessage) -> Result<(), ChannelError> {
        let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = outbox.entry(target_id.to_string()).or_default();
        if queue.len() >= self.backlog {
            let dropped = queue.len() + 1 - self.backlog;
            queue.drain(..dropped);
            warn!(visitor = %target_id, dropped, "Widget outbox full, dropping oldest replies");
        }
        queue.push(message.clone());
        Ok(())
    }

    async fn handle_inbound(&self, request: &InboundRequest) -> Result<Option<InboundMessage>, ChannelError> {
        let payload: WidgetPayload = serde_json::from_str(&request.body)
            .map_err(|e| ChannelError::InvalidPayload(format!("widget: {e}")))?;
        let text = payload.text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let mut inbound = InboundMessage::new(ChannelType::Widget, &payload.visitor_id, &payload.visitor_id, text);
        inbound.reply_target = Some(payload.visitor_id);
        inbound.agent_id = payload.agent_id;
        Ok(Some(inbound))
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}
