//! Sub-agent spawning.
//!
//! A spawned task runs the normal turn pipeline in a fresh conversation of
//! its own and is raced against a timeout. On timeout, or when the caller
//! stops waiting, the in-flight turn is cancelled and abandoned.

use std::time::Duration;

use async_trait::async_trait;
use parley_config::{SPAWN_TIMEOUT_CEILING_SECS, SpawnConfig};
use parley_core::ChannelType;
use parley_core::error::ToolError;
use parley_core::tool::ToolContext;
use parley_tools::SubAgentSpawner;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::runtime::{AgentRuntime, TurnRequest};

/// Channel label given to sub-agent conversations.
pub const SUBAGENT_CHANNEL: &str = "subagent";

/// Runs `agent_spawn` tasks on a runtime whose dispatcher has no spawn tool.
pub struct SpawnManager {
    runtime: AgentRuntime,
    config: SpawnConfig,
}

impl SpawnManager {
    pub fn new(runtime: AgentRuntime, config: SpawnConfig) -> Self {
        Self { runtime, config }
    }

    /// Requested timeout, or the default, never above the cap.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        let max = Duration::from_secs(self.config.max_timeout_secs.min(SPAWN_TIMEOUT_CEILING_SECS));
        requested
            .unwrap_or(Duration::from_secs(self.config.default_timeout_secs))
            .min(max)
    }
}

#[async_trait]
impl SubAgentSpawner for SpawnManager {
    async fn spawn(
        &self,
        ctx: &ToolContext,
        task: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ToolError> {
        let timeout = self.effective_timeout(timeout);
        let task_id = uuid::Uuid::new_v4().to_string();

        let session = self
            .runtime
            .resolve_or_create_session(
                &ctx.agent_id,
                Some(ChannelType::Other(SUBAGENT_CHANNEL.into())),
                Some(&task_id),
                None,
            )
            .await
            .map_err(|e| failed(format!("could not open sub-agent session: {e}")))?;

        info!(
            agent_id = %ctx.agent_id,
            task_id = %task_id,
            conversation_id = %session.id,
            timeout_secs = timeout.as_secs(),
            "Spawning sub-agent"
        );

        let token = CancellationToken::new();
        let cancelled = token.child_token();
        // Dropping this future cancels the sub-agent turn
        let _cancel_on_drop = token.clone().drop_guard();
        let runtime = self.runtime.clone();
        let request = TurnRequest::new(ctx.agent_id.clone(), session.id, task);
        let mut handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => None,
                reply = runtime.handle_turn(request) => Some(reply),
            }
        });

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(Some(Ok(reply))) => {
                    info!(task_id = %task_id, tools_used = reply.tools_used.len(), "Sub-agent finished");
                    Ok(reply.reply)
                }
                Ok(Some(Err(e))) => Err(failed(e.to_string())),
                Ok(None) => Err(failed("sub-agent was cancelled".into())),
                Err(e) => Err(failed(format!("sub-agent task aborted: {e}"))),
            },
            _ = tokio::time::sleep(timeout) => {
                token.cancel();
                warn!(task_id = %task_id, timeout_secs = timeout.as_secs(), "Sub-agent timed out");
                Err(ToolError::Timeout {
                    tool_name: "agent_spawn".into(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

fn failed(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "agent_spawn".into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_core::error::ProviderError;
    use parley_core::event::EventBus;
    use parley_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use parley_core::{AgentDirectory, AgentProfile, CapabilityRegistry, ConversationStore, ManualClock};
    use parley_store::InMemoryStore;
    use parley_tools::ToolDispatcher;

    use crate::cache::AgentCache;
    use crate::context::ContextAssembler;
    use crate::loop_runner::ToolLoopExecutor;
    use crate::runtime::ModelDefaults;
    use crate::session::SessionManager;
    use crate::test_helpers::{SequentialMockProvider, make_tool_call};

    struct StalledProvider;

    /// Answers after ten seconds, counting finished completions.
    #[derive(Default)]
    struct SlowProvider {
        completions: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.completions.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(ProviderResponse {
                message: parley_core::Message::assistant("late answer"),
                usage: None,
                model: request.model,
                stop_reason: None,
            })
        }
    }

    #[async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::ApiError {
                status_code: 504,
                message: "never".into(),
            })
        }
    }

    async fn manager(provider: Arc<dyn Provider>, config: SpawnConfig) -> (SpawnManager, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.upsert_agent(&AgentProfile::new("a1", "Helper")).await.unwrap();
        let clock = Arc::new(ManualClock::default());
        let events = Arc::new(EventBus::default());

        let agents = Arc::new(AgentCache::new(store.clone(), clock.clone(), 60));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            provider.clone(),
            clock,
            events.clone(),
            "mock-model",
        ));
        let context = Arc::new(ContextAssembler::new(agents.clone(), store.clone()));
        let executor = ToolLoopExecutor::new(
            provider,
            ToolDispatcher::new(Arc::new(CapabilityRegistry::new())),
            events.clone(),
        );
        let runtime = AgentRuntime::new(agents, sessions, context, executor, events, ModelDefaults::new("m"));
        (SpawnManager::new(runtime, config), store)
    }

    #[tokio::test]
    async fn effective_timeout_uses_config() {
        let (manager, _store) =
            manager(Arc::new(SequentialMockProvider::single_text("x")), SpawnConfig::default()).await;
        assert_eq!(manager.effective_timeout(None), Duration::from_secs(120));
        assert_eq!(manager.effective_timeout(Some(Duration::from_secs(900))), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn oversized_cap_is_clamped() {
        let config = SpawnConfig {
            default_timeout_secs: 120,
            max_timeout_secs: 86_400,
        };
        let (manager, _store) = manager(Arc::new(SequentialMockProvider::single_text("x")), config).await;
        assert_eq!(manager.effective_timeout(Some(Duration::from_secs(7200))), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn runs_task_in_fresh_session() {
        let (manager, store) =
            manager(Arc::new(SequentialMockProvider::single_text("Done: 42")), SpawnConfig::default()).await;
        let ctx = ToolContext::for_agent("a1");

        let reply = manager.spawn(&ctx, "compute the answer", None).await.unwrap();
        assert_eq!(reply, "Done: 42");

        let conversations = store.list_conversations("a1").await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].channel_label(), SUBAGENT_CHANNEL);
        assert_eq!(conversations[0].message_count, 2);
    }

    #[tokio::test]
    async fn sub_agent_cannot_spawn() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("agent_spawn", serde_json::json!({"task": "recurse"}))],
            "Handled it myself.",
        ));
        let (manager, _store) = manager(provider.clone(), SpawnConfig::default()).await;

        let reply = manager.spawn(&ToolContext::for_agent("a1"), "delegate", None).await.unwrap();
        assert_eq!(reply, "Handled it myself.");

        let second = &provider.requests()[1];
        let tool_message = second.messages.last().unwrap();
        assert!(tool_message.content.contains("not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_abandons_turn() {
        let config = SpawnConfig {
            default_timeout_secs: 5,
            max_timeout_secs: 10,
        };
        let (manager, _store) = manager(Arc::new(StalledProvider), config).await;

        let err = manager
            .spawn(&ToolContext::for_agent("a1"), "slow job", Some(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_secs: 10, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_spawn_cancels_turn() {
        let provider = Arc::new(SlowProvider::default());
        let (manager, store) = manager(provider.clone(), SpawnConfig::default()).await;
        let ctx = ToolContext::for_agent("a1");

        let abandoned = tokio::time::timeout(Duration::from_secs(1), manager.spawn(&ctx, "slow job", None)).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.completions.load(std::sync::atomic::Ordering::SeqCst), 0);

        // Only the task prompt was stored; no reply was written
        let conversations = store.list_conversations("a1").await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].message_count, 1);
    }

    #[tokio::test]
    async fn provider_failure_is_execution_failure() {
        let (manager, _store) = manager(Arc::new(SequentialMockProvider::failing()), SpawnConfig::default()).await;
        let err = manager.spawn(&ToolContext::for_agent("a1"), "x", None).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
