//! Session manager — maps a channel identity to its current conversation.
//!
//! A conversation stays current while messages keep arriving within the
//! activity window. After that, the next message starts a new one. Creation
//! is serialized per [`SessionKey`] so two first-contact messages racing on
//! the same channel identity end up in the same conversation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Duration;
use parley_config::SessionConfig;
use parley_core::event::{DomainEvent, EventBus};
use parley_core::{
    ChannelType, Clock, Conversation, ConversationId, ConversationStore, GenerateOptions, Message,
    Provider, ProviderExt, Role, SessionKey,
};
use tracing::{debug, info, warn};

const SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation below in 2-4 sentences. \
     Keep only durable facts: who the user is, what they asked for, decisions made and \
     open follow-ups. Do not add anything that was not said.";

/// Resolves, creates, and summarizes conversations.
pub struct SessionManager {
    store: Arc<dyn ConversationStore>,
    provider: Arc<dyn Provider>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    config: SessionConfig,
    summary_model: String,
    creation_locks: Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn Provider>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        summary_model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            events,
            config: SessionConfig::default(),
            summary_model: summary_model.into(),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    fn activity_window(&self) -> Duration {
        Duration::minutes(i64::from(self.config.activity_window_minutes))
    }

    fn creation_lock(&self, key: &SessionKey) -> Arc<tokio::sync::Mutex<()>> {
        self.creation_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    fn release_creation_lock(&self, key: &SessionKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.creation_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    /// The conversation a message on this channel identity belongs to.
    ///
    /// Order of preference: an active conversation, then a created but
    /// never-used one, then a brand-new one.
    pub async fn resolve_or_create(
        &self,
        agent_id: &str,
        channel_type: Option<ChannelType>,
        channel_id: Option<&str>,
        external_user_id: Option<&str>,
    ) -> parley_core::Result<Conversation> {
        let key = SessionKey::new(agent_id, channel_type, channel_id);

        let lock = self.creation_lock(&key);
        let resolved = {
            let _guard = lock.lock().await;
            self.resolve_locked(&key, external_user_id).await
        };
        self.release_creation_lock(&key, lock);
        resolved
    }

    async fn resolve_locked(
        &self,
        key: &SessionKey,
        external_user_id: Option<&str>,
    ) -> parley_core::Result<Conversation> {
        let now = self.clock.now();

        if let Some(active) = self.store.find_active(key, now - self.activity_window()).await? {
            debug!(session = %key, conversation_id = %active.id, "Continuing active conversation");
            return Ok(active);
        }

        if let Some(unused) = self.store.find_unused(key).await? {
            debug!(session = %key, conversation_id = %unused.id, "Reusing unused conversation");
            return Ok(unused);
        }

        let conversation = Conversation::new(key, external_user_id, now);
        self.store.create(&conversation).await?;
        info!(session = %key, conversation_id = %conversation.id, "Created conversation");
        self.events.publish(DomainEvent::SessionCreated {
            agent_id: conversation.agent_id.clone(),
            conversation_id: conversation.id.to_string(),
            channel: conversation.channel_label().to_string(),
            timestamp: now,
        });
        Ok(conversation)
    }

    /// Count one message against the conversation and mark it active now.
    pub async fn record_turn(&self, id: &ConversationId) -> parley_core::Result<u32> {
        Ok(self.store.record_turn(id, self.clock.now()).await?)
    }

    /// Whether the conversation is due for its one-time summary.
    pub async fn maybe_summarize(&self, id: &ConversationId) -> parley_core::Result<bool> {
        let conversation = self.store.get(id).await?.ok_or_else(|| parley_core::Error::NotFound {
            kind: "conversation",
            id: id.to_string(),
        })?;
        Ok(conversation.message_count > self.config.summary_threshold && conversation.summary.is_none())
    }

    /// Summarize recent messages and persist the summary.
    pub async fn summarize(&self, id: &ConversationId) -> parley_core::Result<String> {
        let recent = self.store.recent_messages(id, self.config.summary_window).await?;

        let transcript: Vec<String> = recent
            .iter()
            .rev()
            .filter(|m| m.role != Role::System && !m.content.trim().is_empty())
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect();
        if transcript.is_empty() {
            return Err(parley_core::Error::Internal(format!(
                "conversation {id} has nothing to summarize"
            )));
        }

        let messages = vec![
            Message::system(SUMMARY_INSTRUCTIONS),
            Message::user(transcript.join("\n")),
        ];
        let summary = self
            .provider
            .generate(messages, GenerateOptions::new(&self.summary_model).with_max_tokens(300))
            .await?;
        let summary = summary.trim().to_string();
        if summary.is_empty() {
            return Err(parley_core::Error::Internal("summarizer returned empty text".into()));
        }

        self.store.set_summary(id, &summary, self.clock.now()).await?;
        info!(conversation_id = %id, messages = transcript.len(), "Conversation summarized");
        self.events.publish(DomainEvent::SessionSummarized {
            conversation_id: id.to_string(),
            message_count: transcript.len() as u32,
            timestamp: self.clock.now(),
        });
        Ok(summary)
    }

    /// Summarize when due. Failures are logged and left for a later turn.
    pub async fn summarize_if_due(&self, id: &ConversationId) -> bool {
        match self.maybe_summarize(id).await {
            Ok(true) => match self.summarize(id).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(conversation_id = %id, error = %e, "Summarization failed, will retry later");
                    false
                }
            },
            Ok(false) => false,
            Err(e) => {
                warn!(conversation_id = %id, error = %e, "Summarization check failed");
                false
            }
        }
    }
}
