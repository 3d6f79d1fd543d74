//! The turn pipeline: context, tool loop, persistence, summarization.
//!
//! [`AgentRuntime::handle_turn`] is what every entry point calls: the
//! channel router for inbound messages, the CLI chat loop, and sub-agents.

use std::sync::Arc;

use chrono::Utc;
use parley_core::event::{DomainEvent, EventBus, preview};
use parley_core::{
    AgentProfile, ChannelType, Conversation, ConversationId, NewMessage, Role,
};
use tracing::{info, warn};

use crate::cache::AgentCache;
use crate::context::ContextAssembler;
use crate::loop_runner::{ProgressCallback, RunOptions, ToolLoopExecutor};
use crate::session::SessionManager;

/// Model settings used when an agent does not override them.
#[derive(Debug, Clone)]
pub struct ModelDefaults {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl ModelDefaults {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

/// One user message to answer.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub agent_id: String,
    pub conversation_id: ConversationId,
    pub message: String,
}

impl TurnRequest {
    pub fn new(agent_id: impl Into<String>, conversation_id: ConversationId, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            conversation_id,
            message: message.into(),
        }
    }
}

/// The answer to a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub conversation_id: ConversationId,
    pub reply: String,
    pub tools_used: Vec<String>,
}

/// Everything needed to answer a turn, shared behind `Arc`s.
#[derive(Clone)]
pub struct AgentRuntime {
    agents: Arc<AgentCache>,
    sessions: Arc<SessionManager>,
    context: Arc<ContextAssembler>,
    executor: ToolLoopExecutor,
    events: Arc<EventBus>,
    defaults: ModelDefaults,
}

impl AgentRuntime {
    pub fn new(
        agents: Arc<AgentCache>,
        sessions: Arc<SessionManager>,
        context: Arc<ContextAssembler>,
        executor: ToolLoopExecutor,
        events: Arc<EventBus>,
        defaults: ModelDefaults,
    ) -> Self {
        Self {
            agents,
            sessions,
            context,
            executor,
            events,
            defaults,
        }
    }

    /// The same runtime driving a different tool loop.
    pub fn with_executor(&self, executor: ToolLoopExecutor) -> Self {
        Self {
            executor,
            ..self.clone()
        }
    }

    pub fn agents(&self) -> &Arc<AgentCache> {
        &self.agents
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn executor(&self) -> &ToolLoopExecutor {
        &self.executor
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub async fn profile(&self, agent_id: &str) -> parley_core::Result<AgentProfile> {
        self.agents.get(agent_id).await?.ok_or_else(|| parley_core::Error::NotFound {
            kind: "agent",
            id: agent_id.to_string(),
        })
    }

    pub async fn resolve_or_create_session(
        &self,
        agent_id: &str,
        channel_type: Option<ChannelType>,
        channel_id: Option<&str>,
        external_user_id: Option<&str>,
    ) -> parley_core::Result<Conversation> {
        self.sessions
            .resolve_or_create(agent_id, channel_type, channel_id, external_user_id)
            .await
    }

    pub async fn record_turn(&self, conversation_id: &ConversationId) -> parley_core::Result<u32> {
        self.sessions.record_turn(conversation_id).await
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> parley_core::Result<TurnReply> {
        self.handle_turn_with_progress(request, None).await
    }

    /// Answer one message. The user message and final reply are persisted;
    /// intermediate tool traffic is not.
    pub async fn handle_turn_with_progress(
        &self,
        request: TurnRequest,
        progress: Option<&ProgressCallback>,
    ) -> parley_core::Result<TurnReply> {
        let TurnRequest {
            agent_id,
            conversation_id,
            message,
        } = request;
        let profile = self.profile(&agent_id).await?;

        let assembled = self.context.build(&agent_id, &conversation_id, &message).await?;

        let store = self.sessions.store();
        store
            .append_message(&conversation_id, NewMessage::new(Role::User, &message), self.sessions.now())
            .await?;
        self.sessions.record_turn(&conversation_id).await?;

        let options = RunOptions {
            model: profile.model.clone().unwrap_or_else(|| self.defaults.model.clone()),
            agent_id: agent_id.clone(),
            conversation_id: Some(conversation_id.to_string()),
            temperature: profile.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: self.defaults.max_tokens,
        };

        let outcome = match self
            .executor
            .run(assembled.into_messages(&message), &profile, &options, progress)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(agent_id = %agent_id, conversation_id = %conversation_id, error = %e, "Turn failed");
                self.events.publish(DomainEvent::ErrorOccurred {
                    context: format!("turn {agent_id}/{conversation_id}"),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e);
            }
        };

        store
            .append_message(
                &conversation_id,
                NewMessage::new(Role::Assistant, &outcome.reply)
                    .with_metadata("tools_used", serde_json::json!(outcome.tools_used)),
                self.sessions.now(),
            )
            .await?;
        self.sessions.record_turn(&conversation_id).await?;

        info!(
            agent_id = %agent_id,
            conversation_id = %conversation_id,
            tools_used = outcome.tools_used.len(),
            iterations = outcome.iterations,
            reply = %preview(&outcome.reply, 80),
            "Turn complete"
        );
        self.events.publish(DomainEvent::ResponseGenerated {
            agent_id: agent_id.clone(),
            conversation_id: conversation_id.to_string(),
            tools_used: outcome.tools_used.len(),
            timestamp: Utc::now(),
        });

        self.sessions.summarize_if_due(&conversation_id).await;

        Ok(TurnReply {
            conversation_id,
            reply: outcome.reply,
            tools_used: outcome.tools_used,
        })
    }

    /// Resolve the session for a channel identity and answer in it.
    pub async fn respond(
        &self,
        agent_id: &str,
        channel_type: Option<ChannelType>,
        channel_id: Option<&str>,
        external_user_id: Option<&str>,
        message: &str,
    ) -> parley_core::Result<TurnReply> {
        let conversation = self
            .resolve_or_create_session(agent_id, channel_type, channel_id, external_user_id)
            .await?;
        self.handle_turn(TurnRequest::new(agent_id, conversation.id, message)).await
    }
}
