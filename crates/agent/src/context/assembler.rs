//! Context assembly — the system prompt and history for one turn.
//!
//! The system prompt is built from ordered sections:
//!
//! 1. **Identity**: soul + context document (composed tier) or the static
//!    instructions
//! 2. **Tool policy**: only when tools are enabled
//! 3. **Previous conversations**: summaries of earlier sessions
//! 4. **Channel note**: only for sessions bound to an external channel
//! 5. **Relevant memory**: recalled facts above the similarity floor
//!
//! Recall and summaries are best-effort: a failing backend contributes
//! nothing instead of failing the turn.

use std::sync::Arc;

use parley_config::ContextConfig;
use parley_core::memory::filter_relevant;
use parley_core::{
    AgentProfile, Conversation, ConversationId, ConversationStore, MemoryBackend, MemorySnippet,
    Message, Role, SessionSummary,
};
use tracing::{debug, warn};

use crate::cache::AgentCache;

/// Marker appended to history messages clipped to the size cap.
pub const HISTORY_TRUNCATION_MARKER: &str = " [message truncated]";

const TOOL_POLICY: &str = "## Tool Use\n\
     You have tools available. For anything time-sensitive or account-specific \
     (prices, schedules, order status, current events) call a tool and answer \
     from its result rather than from memory. If a tool fails, say what you could \
     not check instead of guessing.";

/// The assembled prompt for one turn.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub system_prompt: String,
    /// Prior messages, oldest first. Does not include the new user message.
    pub history: Vec<Message>,
    /// Number of memory snippets that made it into the prompt.
    pub recalled: usize,
}

impl AssembledContext {
    /// The full message list sent to the model: system, history, user.
    pub fn into_messages(self, user_message: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(self.system_prompt));
        messages.extend(self.history);
        messages.push(Message::user(user_message));
        messages
    }
}

/// Builds per-turn context from the agent profile, stored history, prior
/// session summaries and long-term memory.
pub struct ContextAssembler {
    agents: Arc<AgentCache>,
    store: Arc<dyn ConversationStore>,
    memory: Option<Arc<dyn MemoryBackend>>,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(agents: Arc<AgentCache>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            agents,
            store,
            memory: None,
            config: ContextConfig::default(),
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryBackend>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Assemble the system prompt and history window for a turn.
    pub async fn build(
        &self,
        agent_id: &str,
        conversation_id: &ConversationId,
        user_message: &str,
    ) -> parley_core::Result<AssembledContext> {
        let profile = self.agents.get(agent_id).await?.ok_or_else(|| parley_core::Error::NotFound {
            kind: "agent",
            id: agent_id.to_string(),
        })?;
        let conversation = self
            .store
            .get(conversation_id)
            .await?
            .ok_or_else(|| parley_core::Error::NotFound {
                kind: "conversation",
                id: conversation_id.to_string(),
            })?;

        let summaries = if profile.features.session_summaries {
            self.prior_summaries(&profile, conversation_id).await
        } else {
            Vec::new()
        };
        let memories = if profile.features.memory {
            self.recall(&profile, user_message).await
        } else {
            Vec::new()
        };

        let system_prompt = compose_system_prompt(&profile, &conversation, &summaries, &memories);
        let history = self.history(&profile, conversation_id).await?;

        debug!(
            agent_id,
            conversation_id = %conversation_id,
            history = history.len(),
            summaries = summaries.len(),
            recalled = memories.len(),
            "Context assembled"
        );

        Ok(AssembledContext {
            system_prompt,
            history,
            recalled: memories.len(),
        })
    }

    async fn prior_summaries(&self, profile: &AgentProfile, current: &ConversationId) -> Vec<SessionSummary> {
        match self
            .store
            .recent_summaries(&profile.id, current, self.config.max_prior_summaries)
            .await
        {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!(agent_id = %profile.id, error = %e, "Loading prior summaries failed");
                Vec::new()
            }
        }
    }

    async fn recall(&self, profile: &AgentProfile, user_message: &str) -> Vec<MemorySnippet> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        match memory.search(&profile.id, user_message, self.config.recall_top_k).await {
            Ok(snippets) => filter_relevant(snippets, self.config.recall_min_similarity),
            Err(e) => {
                warn!(agent_id = %profile.id, backend = memory.name(), error = %e, "Memory recall failed");
                Vec::new()
            }
        }
    }

    /// Chronological history window, tool and system entries removed.
    async fn history(
        &self,
        profile: &AgentProfile,
        conversation_id: &ConversationId,
    ) -> parley_core::Result<Vec<Message>> {
        let limit = if profile.tools_enabled() {
            self.config.history_limit_with_tools
        } else {
            self.config.history_limit
        };

        let mut recent = self.store.recent_messages(conversation_id, limit).await?;
        recent.reverse();

        Ok(recent
            .into_iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| {
                let content = clip(&m.content, self.config.max_message_chars);
                match m.role {
                    Role::User => Message::user(content),
                    _ => Message::assistant(content),
                }
            })
            .collect())
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((cut, _)) => format!("{}{}", &text[..cut], HISTORY_TRUNCATION_MARKER),
    }
}

/// Compose the system prompt sections in their fixed order.
pub fn compose_system_prompt(
    profile: &AgentProfile,
    conversation: &Conversation,
    summaries: &[SessionSummary],
    memories: &[MemorySnippet],
) -> String {
    let mut sections = Vec::new();

    let identity = profile.base_identity();
    if identity.trim().is_empty() {
        sections.push(format!("You are {}, a helpful assistant.", profile.name));
    } else {
        sections.push(identity);
    }

    if profile.tools_enabled() {
        sections.push(TOOL_POLICY.to_string());
    }

    if !summaries.is_empty() {
        let mut block = String::from("## Previous Conversations");
        for s in summaries {
            let channel = s.channel_type.as_ref().map(|c| c.as_str()).unwrap_or("chat");
            block.push_str(&format!(
                "\n- [{} via {}] {}",
                s.updated_at.format("%Y-%m-%d"),
                channel,
                s.summary
            ));
        }
        sections.push(block);
    }

    if conversation.is_external_channel() {
        sections.push(format!(
            "You are replying in a {} conversation. Keep formatting simple and messages concise.",
            conversation.channel_label()
        ));
    }

    if !memories.is_empty() {
        let mut block = String::from("## Relevant Memory");
        for m in memories {
            block.push_str(&format!("\n- {}", m.text));
        }
        sections.push(block);
    }

    sections.join("\n\n")
}
