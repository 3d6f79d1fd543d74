//! The tool loop — generate, execute requested tools, feed results back.
//!
//! A turn runs in one of two modes:
//!
//! - **NoTools**: one plain generation, its text is the reply
//! - **Looping**: tool-augmented generations until the model answers with
//!   text, bounded by a hard iteration cap
//!
//! Tool failures never abort the loop. The model sees a failed result and
//! decides what to do next.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parley_core::event::{DomainEvent, EventBus};
use parley_core::{
    AgentProfile, GenerateOptions, GenerationKind, Message, Provider, ProviderExt, ToolContext,
    ToolResult,
};
use parley_tools::{ToolDispatcher, parse_call};
use tracing::{debug, info, warn};

/// Reply returned when the iteration cap is hit.
pub const ITERATION_CAP_REPLY: &str =
    "I could not complete this request within the allowed number of tool calls.";

/// Default cap on tool-augmented generations per turn.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Called with the tool name right before each dispatch.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// How a turn is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnMode {
    NoTools,
    Looping,
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model: String,
    pub agent_id: String,
    pub conversation_id: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl RunOptions {
    pub fn new(model: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            agent_id: agent_id.into(),
            conversation_id: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    fn generate_options(&self) -> GenerateOptions {
        let options = GenerateOptions::new(&self.model)
            .for_agent(&self.agent_id)
            .with_temperature(self.temperature);
        match self.max_tokens {
            Some(max) => options.with_max_tokens(max),
            None => options,
        }
    }
}

/// The result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub reply: String,
    /// Names of every dispatched tool call, in order
    pub tools_used: Vec<String>,
    /// Provider calls made
    pub iterations: u32,
}

/// Drives generation and tool execution for one turn.
#[derive(Clone)]
pub struct ToolLoopExecutor {
    provider: Arc<dyn Provider>,
    dispatcher: ToolDispatcher,
    events: Arc<EventBus>,
    max_iterations: u32,
}

impl ToolLoopExecutor {
    pub fn new(provider: Arc<dyn Provider>, dispatcher: ToolDispatcher, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            dispatcher,
            events,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// The same executor with a different dispatcher.
    pub fn with_dispatcher(&self, dispatcher: ToolDispatcher) -> Self {
        Self {
            dispatcher,
            ..self.clone()
        }
    }

    pub fn mode_for(profile: &AgentProfile) -> TurnMode {
        if profile.tools_enabled() {
            TurnMode::Looping
        } else {
            TurnMode::NoTools
        }
    }

    /// Run a turn over an already assembled message list.
    pub async fn run(
        &self,
        mut messages: Vec<Message>,
        profile: &AgentProfile,
        options: &RunOptions,
        progress: Option<&ProgressCallback>,
    ) -> parley_core::Result<LoopOutcome> {
        if Self::mode_for(profile) == TurnMode::NoTools {
            let reply = self
                .provider
                .generate(messages, options.generate_options())
                .await?;
            return Ok(LoopOutcome {
                reply,
                tools_used: Vec::new(),
                iterations: 1,
            });
        }

        let tools = self.dispatcher.descriptors_for(profile);
        let ctx = ToolContext {
            agent_id: options.agent_id.clone(),
            conversation_id: options.conversation_id.clone(),
        };
        let mut tools_used = Vec::new();

        for iteration in 1..=self.max_iterations {
            debug!(agent_id = %options.agent_id, iteration, tools = tools.len(), "Tool loop iteration");

            let generation = self
                .provider
                .generate_with_tools(messages.clone(), tools.clone(), options.generate_options())
                .await?;

            if generation.kind == GenerationKind::Text {
                return Ok(LoopOutcome {
                    reply: generation.text,
                    tools_used,
                    iterations: iteration,
                });
            }

            debug!(tool_count = generation.tool_calls.len(), "Executing tool calls");
            messages.push(Message::assistant_tool_calls(
                generation.text.clone(),
                generation.tool_calls.clone(),
            ));

            for raw in &generation.tool_calls {
                if let Some(callback) = progress {
                    callback(&raw.name);
                }
                tools_used.push(raw.name.clone());

                let started = Instant::now();
                let result = match parse_call(raw) {
                    Ok(call) => self.dispatcher.dispatch(profile, &call, &ctx).await,
                    Err(e) => {
                        ToolResult::failure(&raw.id, e).bounded(self.dispatcher.max_output_chars())
                    }
                };

                self.events.publish(DomainEvent::ToolExecuted {
                    agent_id: options.agent_id.clone(),
                    tool_name: raw.name.clone(),
                    success: result.success,
                    duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                });

                messages.push(Message::tool_result(&raw.id, result.output));
            }
        }

        warn!(
            agent_id = %options.agent_id,
            iterations = self.max_iterations,
            tools_used = tools_used.len(),
            "Tool loop hit the iteration cap"
        );
        info!(agent_id = %options.agent_id, "Returning iteration cap reply");
        Ok(LoopOutcome {
            reply: ITERATION_CAP_REPLY.to_string(),
            tools_used,
            iterations: self.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response,
    };
    use async_trait::async_trait;
    use parley_core::error::ToolError;
    use parley_core::{ActionSpec, AgentFeatures, CapabilityProvider, CapabilityRegistry, Role};
    use std::sync::Mutex;

    struct Quotes;

    #[async_trait]
    impl CapabilityProvider for Quotes {
        fn name(&self) -> &str {
            "quotes"
        }
        fn description(&self) -> &str {
            "Market quotes"
        }
        fn actions(&self) -> Vec<ActionSpec> {
            vec![ActionSpec::new("get_price", "Latest price")]
        }
        async fn execute(
            &self,
            _action: &str,
            params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<serde_json::Value, ToolError> {
            match params.get("symbol").and_then(|s| s.as_str()) {
                Some(symbol) => Ok(serde_json::json!({ "symbol": symbol, "price": 64000 })),
                None => Err(ToolError::InvalidArguments("Missing 'symbol'".into())),
            }
        }
    }

    fn executor(provider: Arc<SequentialMockProvider>) -> ToolLoopExecutor {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(Quotes));
        ToolLoopExecutor::new(
            provider,
            ToolDispatcher::new(Arc::new(registry)),
            Arc::new(EventBus::default()),
        )
    }

    fn tool_agent() -> AgentProfile {
        AgentProfile::new("a1", "Trader").with_capabilities(vec!["quotes".into()])
    }

    fn opts() -> RunOptions {
        RunOptions::new("mock-model", "a1")
    }

    fn start() -> Vec<Message> {
        vec![Message::system("You are helpful."), Message::user("BTC price?")]
    }

    #[tokio::test]
    async fn no_tools_is_a_single_plain_generation() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hi there"));
        let plain = AgentProfile::new("a1", "Helper").with_features(AgentFeatures::none());

        let outcome = executor(provider.clone()).run(start(), &plain, &opts(), None).await.unwrap();
        assert_eq!(outcome.reply, "Hi there");
        assert!(outcome.tools_used.is_empty());
        assert_eq!(provider.call_count(), 1);
        assert!(provider.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn tool_call_then_answer() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call(
                "quotes",
                serde_json::json!({"action": "get_price", "params": {"symbol": "BTC"}}),
            )],
            "BTC is at 64000.",
        ));

        let outcome = executor(provider.clone()).run(start(), &tool_agent(), &opts(), None).await.unwrap();
        assert_eq!(outcome.reply, "BTC is at 64000.");
        assert_eq!(outcome.tools_used, vec!["quotes"]);
        assert_eq!(provider.call_count(), 2);

        // Second request carries the assistant tool-call record and the result
        let second = &provider.requests()[1];
        let n = second.messages.len();
        assert_eq!(second.messages[n - 2].role, Role::Assistant);
        assert_eq!(second.messages[n - 2].tool_calls.len(), 1);
        assert_eq!(second.messages[n - 1].role, Role::Tool);
        assert_eq!(second.messages[n - 1].tool_call_id.as_deref(), Some("call_quotes"));
        assert!(second.messages[n - 1].content.contains("64000"));
        assert_eq!(second.tools[0].name, "quotes");
    }

    #[tokio::test]
    async fn iteration_cap_is_exact() {
        let looping = make_tool_call_response(
            vec![make_tool_call("quotes", serde_json::json!({"action": "get_price", "params": {"symbol": "ETH"}}))],
            "",
        );
        let provider = Arc::new(SequentialMockProvider::new(vec![looping]));

        let outcome = executor(provider.clone()).run(start(), &tool_agent(), &opts(), None).await.unwrap();
        assert_eq!(outcome.reply, ITERATION_CAP_REPLY);
        assert_eq!(provider.call_count(), 10);
        assert_eq!(outcome.tools_used.len(), 10);
    }

    #[tokio::test]
    async fn failures_are_fed_back_not_raised() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(
                vec![
                    make_tool_call("weather", serde_json::json!({"city": "Oslo"})),
                    make_tool_call("quotes", serde_json::json!({"action": "get_price"})),
                ],
                "",
            ),
            make_text_response("Sorry, I could not look that up."),
        ]));

        let outcome = executor(provider.clone()).run(start(), &tool_agent(), &opts(), None).await.unwrap();
        assert_eq!(outcome.tools_used, vec!["weather", "quotes"]);

        let second = &provider.requests()[1];
        let results: Vec<&str> = second
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(results[0], "Tool 'weather' not found");
        assert!(results[1].contains("symbol"));
    }

    #[tokio::test]
    async fn malformed_arguments_become_failed_results() {
        let mut bad = make_tool_call("quotes", serde_json::json!({}));
        bad.arguments = "{oops".into();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![bad], ""),
            make_text_response("done"),
        ]));

        let outcome = executor(provider.clone()).run(start(), &tool_agent(), &opts(), None).await.unwrap();
        assert_eq!(outcome.reply, "done");
        let tool_msg = provider.requests()[1].messages.last().cloned().unwrap();
        assert!(tool_msg.content.starts_with("Error:"));
    }

    #[tokio::test]
    async fn progress_callback_sees_each_tool() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_tool_call("quotes", serde_json::json!({"action": "get_price", "params": {"symbol": "A"}})),
                make_tool_call("memory_search", serde_json::json!({"query": "x"})),
            ],
            "ok",
        ));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |name: &str| sink.lock().unwrap().push(name.to_string()));

        executor(provider).run(start(), &tool_agent(), &opts(), Some(&callback)).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["quotes", "memory_search"]);
    }

    #[tokio::test]
    async fn provider_error_fails_the_turn() {
        let provider = Arc::new(SequentialMockProvider::failing());
        let err = executor(provider).run(start(), &tool_agent(), &opts(), None).await.unwrap_err();
        assert!(matches!(err, parley_core::Error::Provider(_)));
    }

    #[tokio::test]
    async fn tool_events_are_published() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("quotes", serde_json::json!({"action": "get_price", "params": {"symbol": "A"}}))],
            "ok",
        ));
        let exec = executor(provider);
        let mut rx = exec.events.subscribe();

        exec.run(start(), &tool_agent(), &opts(), None).await.unwrap();
        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "quotes");
                assert!(*success);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
