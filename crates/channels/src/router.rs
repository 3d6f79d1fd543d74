//! Channel router — inbound events in, formatted replies out.
//!
//! Holds one adapter per channel type. Inbound messages are resolved to an
//! agent and session, answered through the runtime, and the reply is sent
//! back on the channel it came from.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use parley_agent::{AgentRuntime, TurnReply};
use parley_core::channel::{ChannelAdapter, ChannelConfig, ChannelMessage, ChannelType, InboundMessage, InboundRequest};
use parley_core::error::ChannelError;
use parley_core::event::{DomainEvent, EventBus, preview};
use parley_core::{AgentDirectory, ConversationId};
use tracing::{debug, info, warn};

use crate::format::format_for_channel;

/// What happened to an inbound message that was answered.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub agent_id: String,
    pub conversation_id: ConversationId,
    pub target: String,
    pub reply: TurnReply,
}

/// Routes messages between channel adapters and the agent runtime.
pub struct ChannelRouter {
    adapters: RwLock<HashMap<ChannelType, Arc<dyn ChannelAdapter>>>,
    directory: Arc<dyn AgentDirectory>,
    runtime: AgentRuntime,
    events: Arc<EventBus>,
}

impl ChannelRouter {
    pub fn new(directory: Arc<dyn AgentDirectory>, runtime: AgentRuntime) -> Self {
        let events = runtime.events().clone();
        Self {
            adapters: RwLock::new(HashMap::new()),
            directory,
            runtime,
            events,
        }
    }

    /// Register (or replace) the adapter for its channel type.
    pub fn register_adapter(&self, adapter: Arc<dyn ChannelAdapter>) {
        let channel_type = adapter.channel_type();
        info!(channel = %channel_type, "Registered channel adapter");
        self.adapters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_type, adapter);
    }

    pub fn adapter(&self, channel_type: &ChannelType) -> Option<Arc<dyn ChannelAdapter>> {
        self.adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel_type)
            .cloned()
    }

    /// Registered channel types, sorted.
    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut types: Vec<ChannelType> = self
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    fn require_adapter(&self, channel_type: &ChannelType) -> Result<Arc<dyn ChannelAdapter>, ChannelError> {
        self.adapter(channel_type)
            .ok_or_else(|| ChannelError::NotConfigured(format!("no adapter registered for '{channel_type}'")))
    }

    /// Hand every enabled stored channel configuration to its adapter.
    /// Returns how many were initialized.
    pub async fn initialize(&self) -> parley_core::Result<usize> {
        let mut initialized = 0;
        for agent in self.directory.list_agents().await? {
            for config in self.directory.channel_configs(&agent.id).await? {
                if !config.enabled {
                    continue;
                }
                let Some(adapter) = self.adapter(&config.channel_type) else {
                    warn!(config_id = %config.id, channel = %config.channel_type, "No adapter for channel configuration");
                    continue;
                };
                match adapter.initialize(&config).await {
                    Ok(()) => initialized += 1,
                    Err(e) => warn!(config_id = %config.id, error = %e, "Channel initialization failed"),
                }
            }
        }
        Ok(initialized)
    }

    /// Format and deliver a message. Adapter errors are logged and returned.
    pub async fn send_message(
        &self,
        channel_type: &ChannelType,
        target_id: &str,
        message: &ChannelMessage,
    ) -> Result<(), ChannelError> {
        let adapter = self.require_adapter(channel_type)?;

        let mut formatted = message.clone();
        formatted.text = format_for_channel(&message.text, channel_type);

        info!(
            channel = %channel_type,
            target = %target_id,
            len = formatted.text.len(),
            agent_id = %message.agent_id,
            "Sending message"
        );
        if let Err(e) = adapter.send_message(target_id, &formatted).await {
            warn!(channel = %channel_type, target = %target_id, error = %e, "Channel send failed");
            return Err(e);
        }

        self.events.publish(DomainEvent::ReplyDelivered {
            channel: channel_type.to_string(),
            target: target_id.to_string(),
            len: formatted.text.len(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Verify and parse a raw request. `Ok(None)` means nothing to answer.
    pub async fn handle_inbound(
        &self,
        channel_type: &ChannelType,
        request: &InboundRequest,
    ) -> Result<Option<InboundMessage>, ChannelError> {
        let adapter = self.require_adapter(channel_type)?;
        if !adapter.verify_webhook(request) {
            warn!(channel = %channel_type, "Rejected inbound request with bad signature");
            return Err(ChannelError::InvalidSignature(channel_type.to_string()));
        }
        adapter.handle_inbound(request).await
    }

    /// Answer an inbound message and deliver the reply.
    ///
    /// Returns `Ok(None)` when the message is dropped: no owning agent, or no
    /// reply target.
    pub async fn process_inbound(&self, inbound: InboundMessage) -> parley_core::Result<Option<Delivery>> {
        self.events.publish(DomainEvent::MessageReceived {
            channel: inbound.channel_type.to_string(),
            sender_id: inbound.sender_id.clone(),
            content_preview: preview(&inbound.text, 50),
            timestamp: Utc::now(),
        });

        let config = self
            .directory
            .find_channel_config(&inbound.channel_type, &inbound.channel_id)
            .await?;

        let Some(agent_id) = config
            .as_ref()
            .map(|c| c.agent_id.clone())
            .or_else(|| inbound.agent_id.clone())
        else {
            warn!(
                channel = %inbound.channel_type,
                channel_id = %inbound.channel_id,
                "Dropping inbound message: no agent owns this channel"
            );
            return Ok(None);
        };

        let Some(target) = reply_target(&inbound, config.as_ref()) else {
            warn!(
                channel = %inbound.channel_type,
                channel_id = %inbound.channel_id,
                agent_id = %agent_id,
                "Dropping inbound message: no reply target"
            );
            return Ok(None);
        };

        debug!(agent_id = %agent_id, channel = %inbound.channel_type, target = %target, "Routing inbound message");
        let reply = self
            .runtime
            .respond(
                &agent_id,
                Some(inbound.channel_type.clone()),
                Some(&inbound.channel_id),
                Some(&inbound.sender_id),
                &inbound.text,
            )
            .await?;

        let outbound = ChannelMessage::new(&agent_id, &reply.reply).in_conversation(reply.conversation_id.to_string());
        self.send_message(&inbound.channel_type, &target, &outbound).await?;

        Ok(Some(Delivery {
            agent_id,
            conversation_id: reply.conversation_id.clone(),
            target,
            reply,
        }))
    }

    /// Send `text` on every enabled channel configuration of an agent.
    /// Per-channel failures are logged; returns how many deliveries succeeded.
    pub async fn send_to_all(&self, agent_id: &str, text: &str) -> parley_core::Result<usize> {
        let configs = self.directory.channel_configs(agent_id).await?;
        let mut delivered = 0;
        for config in configs.iter().filter(|c| c.enabled) {
            let target = config.default_target.as_deref().unwrap_or(&config.channel_id);
            let message = ChannelMessage::new(agent_id, text);
            match self.send_message(&config.channel_type, target, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    agent_id = %agent_id,
                    config_id = %config.id,
                    channel = %config.channel_type,
                    error = %e,
                    "Broadcast leg failed"
                ),
            }
        }
        info!(agent_id = %agent_id, delivered, total = configs.len(), "Broadcast complete");
        Ok(delivered)
    }

    /// Shut every adapter down.
    pub async fn shutdown(&self) {
        let adapters: Vec<(ChannelType, Arc<dyn ChannelAdapter>)> = self
            .adapters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(t, a)| (t.clone(), a.clone()))
            .collect();
        for (channel_type, adapter) in adapters {
            if let Err(e) = adapter.shutdown().await {
                warn!(channel = %channel_type, error = %e, "Failed to shut down channel");
            }
        }
    }
}

/// Explicit reply target, then thread id, then the configured default.
pub fn reply_target(inbound: &InboundMessage, config: Option<&ChannelConfig>) -> Option<String> {
    inbound
        .reply_target
        .clone()
        .or_else(|| inbound.thread_id.clone())
        .or_else(|| config.and_then(|c| c.default_target.clone()))
}
