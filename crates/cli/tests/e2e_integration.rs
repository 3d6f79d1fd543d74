//! End-to-end tests for the Parley runtime.
//!
//! Each test wires the whole system through [`Bootstrap`] with an in-process
//! store and a scripted provider, then drives it the way the channels do.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use parley::{App, Bootstrap};
use parley_agent::{ITERATION_CAP_REPLY, TurnRequest};
use parley_config::AppConfig;
use parley_core::error::ProviderError;
use parley_core::message::{Message, MessageToolCall};
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use parley_core::{AgentFeatures, AgentProfile, ChannelType, InboundMessage, ManualClock, Role};

// ── Scripted provider ────────────────────────────────────────────────────

const SUMMARY_TEXT: &str = "The user planned a trip to Lisbon and asked about trams.";

/// Replays scripted turn responses in order, repeating the last one.
/// Summarization requests are answered separately and do not consume the
/// script.
struct ScriptedProvider {
    script: Mutex<VecDeque<ProviderResponse>>,
    last: Mutex<Option<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    summaries: Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            summaries: Mutex::new(0),
        }
    }

    fn text(response: &str) -> Self {
        Self::new(vec![text_response(response)])
    }

    fn turn_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn summary_calls(&self) -> usize {
        *self.summaries.lock().unwrap()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

fn is_summary_request(request: &ProviderRequest) -> bool {
    request
        .messages
        .first()
        .is_some_and(|m| m.role == Role::System && m.content.starts_with("Summarize the conversation"))
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if is_summary_request(&request) {
            *self.summaries.lock().unwrap() += 1;
            return Ok(text_response(SUMMARY_TEXT));
        }

        self.requests.lock().unwrap().push(request);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = Some(next);
        }
        last.clone().ok_or_else(|| ProviderError::ApiError {
            status_code: 500,
            message: "empty script".into(),
        })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
        stop_reason: Some("stop".into()),
    }
}

fn tool_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls("", calls),
        usage: usage(),
        model: "mock-model".into(),
        stop_reason: Some("tool_calls".into()),
    }
}

fn tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

fn base_config(agents: Vec<AgentProfile>) -> AppConfig {
    let mut config = AppConfig {
        database_url: Some("memory".into()),
        agents,
        ..AppConfig::default()
    };
    config.memory.backend = "in_memory".into();
    config
}

fn plain_agent() -> AgentProfile {
    AgentProfile::new("plain", "Plain").with_features(AgentFeatures::none())
}

fn tool_agent() -> AgentProfile {
    AgentProfile::new("ops", "Ops").with_features(AgentFeatures {
        cron: true,
        spawn: true,
        ..AgentFeatures::default()
    })
}

async fn boot(config: AppConfig, provider: Arc<ScriptedProvider>, clock: Arc<ManualClock>) -> App {
    Bootstrap::new(config)
        .with_provider(provider)
        .with_clock(clock)
        .build()
        .await
        .unwrap()
}

fn widget_message(agent_id: &str, visitor: &str, text: &str) -> InboundMessage {
    let mut inbound = InboundMessage::new(ChannelType::Widget, visitor, visitor, text);
    inbound.agent_id = Some(agent_id.into());
    inbound
}

// ── Turn pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn tools_disabled_single_provider_call() {
    let provider = Arc::new(ScriptedProvider::text("Hi! How can I help?"));
    let app = boot(base_config(vec![plain_agent()]), provider.clone(), Arc::new(ManualClock::default())).await;

    let reply = app.runtime.respond("plain", None, None, None, "hello").await.unwrap();

    assert_eq!(reply.reply, "Hi! How can I help?");
    assert!(reply.tools_used.is_empty());
    assert_eq!(provider.turn_calls(), 1);
    assert!(provider.request(0).tools.is_empty());
}

#[tokio::test]
async fn tool_call_then_text() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![tool_call(
            "call_1",
            "cron_create",
            serde_json::json!({"schedule": "0 9 * * 1", "prompt": "Post the weekly report"}),
        )]),
        text_response("Done. I'll post the report every Monday at 9."),
    ]));
    let app = boot(base_config(vec![tool_agent()]), provider.clone(), Arc::new(ManualClock::default())).await;

    let reply = app
        .runtime
        .respond("ops", None, None, None, "post the weekly report every monday")
        .await
        .unwrap();

    assert_eq!(reply.tools_used, vec!["cron_create"]);
    assert_eq!(provider.turn_calls(), 2);
    assert!(reply.reply.starts_with("Done."));

    let jobs = app.schedules.list("ops").await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].schedule, "0 9 * * 1");

    let second = provider.request(1);
    let tool_message = second.messages.last().unwrap();
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_message.content.contains("Scheduled job"));

    let request0 = provider.request(0);
    let offered: Vec<&str> = request0.tools.iter().map(|t| t.name.as_str()).collect();
    for name in ["memory_search", "cron_create", "agent_spawn"] {
        assert!(offered.contains(&name), "{name} missing from {offered:?}");
    }
    assert!(!offered.iter().any(|n| n.starts_with("fs_") || n.starts_with("browser_")));
}

#[tokio::test]
async fn iteration_cap_returns_fixed_reply() {
    let provider = Arc::new(ScriptedProvider::new(vec![tool_response(vec![tool_call(
        "call_loop",
        "cron_list",
        serde_json::json!({}),
    )])]));
    let mut config = base_config(vec![tool_agent()]);
    config.tool_loop.max_iterations = 3;
    let app = boot(config, provider.clone(), Arc::new(ManualClock::default())).await;

    let reply = app.runtime.respond("ops", None, None, None, "loop forever").await.unwrap();

    assert_eq!(reply.reply, ITERATION_CAP_REPLY);
    assert_eq!(provider.turn_calls(), 3);
    assert_eq!(reply.tools_used.len(), 3);
}

#[tokio::test]
async fn unknown_tool_fed_back_and_loop_continues() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![tool_call("call_w", "weather", serde_json::json!({"city": "Oslo"}))]),
        text_response("I can't check the weather, sorry."),
    ]));
    let app = boot(base_config(vec![tool_agent()]), provider.clone(), Arc::new(ManualClock::default())).await;

    let reply = app.runtime.respond("ops", None, None, None, "weather in Oslo?").await.unwrap();

    assert_eq!(reply.reply, "I can't check the weather, sorry.");
    let fed_back = provider.request(1);
    let tool_message = fed_back.messages.last().unwrap();
    assert!(tool_message.content.contains("Tool 'weather' not found"));
}

#[tokio::test]
async fn sub_agent_spawn_answers_inside_turn() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![tool_call(
            "call_spawn",
            "agent_spawn",
            serde_json::json!({"task": "List three tram lines in Lisbon"}),
        )]),
        text_response("Lines 12E, 15E and 28E."),
        text_response("Your sub-agent found: 12E, 15E and 28E."),
    ]));
    let app = boot(base_config(vec![tool_agent()]), provider.clone(), Arc::new(ManualClock::default())).await;

    let reply = app.runtime.respond("ops", None, None, None, "delegate the tram research").await.unwrap();

    assert_eq!(reply.reply, "Your sub-agent found: 12E, 15E and 28E.");
    assert_eq!(reply.tools_used, vec!["agent_spawn"]);
    assert_eq!(provider.turn_calls(), 3);

    // The sub-agent ran on a fresh conversation: only its task, no parent history
    let sub_request = provider.request(1);
    let sub_user: Vec<&str> = sub_request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(sub_user, vec!["List three tram lines in Lisbon"]);
    // and was not offered the spawn tool
    assert!(!sub_request.tools.iter().any(|t| t.name == "agent_spawn"));

    let parent = provider.request(2);
    assert_eq!(parent.messages.last().unwrap().content, "Lines 12E, 15E and 28E.");
}

// ── Sessions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_affinity_within_activity_window() {
    let provider = Arc::new(ScriptedProvider::text("ok"));
    let clock = Arc::new(ManualClock::default());
    let app = boot(base_config(vec![plain_agent()]), provider.clone(), clock.clone()).await;

    let first = app
        .runtime
        .respond("plain", Some(ChannelType::Slack), Some("C1"), Some("U1"), "one")
        .await
        .unwrap();
    clock.advance(chrono::Duration::minutes(29));
    let second = app
        .runtime
        .respond("plain", Some(ChannelType::Slack), Some("C1"), Some("U1"), "two")
        .await
        .unwrap();
    assert_eq!(first.conversation_id, second.conversation_id);

    let other_channel = app
        .runtime
        .respond("plain", Some(ChannelType::Slack), Some("C2"), Some("U1"), "elsewhere")
        .await
        .unwrap();
    assert_ne!(other_channel.conversation_id, first.conversation_id);

    clock.advance(chrono::Duration::minutes(31));
    let after_idle = app
        .runtime
        .respond("plain", Some(ChannelType::Slack), Some("C1"), Some("U1"), "back again")
        .await
        .unwrap();
    assert_ne!(after_idle.conversation_id, first.conversation_id);

    let conversation = app.conversations.get(&first.conversation_id).await.unwrap().unwrap();
    assert_eq!(conversation.message_count, 4);
}

#[tokio::test]
async fn concurrent_first_contact_shares_one_session() {
    let provider = Arc::new(ScriptedProvider::text("ok"));
    let app = boot(base_config(vec![plain_agent()]), provider, Arc::new(ManualClock::default())).await;

    let resolve = || {
        let runtime = app.runtime.clone();
        tokio::spawn(async move {
            runtime
                .resolve_or_create_session("plain", Some(ChannelType::Teams), Some("19:room"), None)
                .await
                .unwrap()
                .id
        })
    };
    let (a, b, c) = tokio::join!(resolve(), resolve(), resolve());
    let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert_eq!(app.conversations.list_conversations("plain").await.unwrap().len(), 1);
}

#[tokio::test]
async fn summary_written_once_and_recalled_in_next_session() {
    let provider = Arc::new(ScriptedProvider::text("Sure."));
    let clock = Arc::new(ManualClock::default());
    let mut config = base_config(vec![AgentProfile::new("guide", "Guide").with_features(AgentFeatures {
        tools: false,
        ..AgentFeatures::default()
    })]);
    config.session.summary_threshold = 3;
    let app = boot(config, provider.clone(), clock.clone()).await;

    let first = app.runtime.respond("guide", None, None, None, "I'm going to Lisbon").await.unwrap();
    assert_eq!(provider.summary_calls(), 0, "2 messages is under the threshold");

    app.runtime.respond("guide", None, None, None, "Which trams?").await.unwrap();
    assert_eq!(provider.summary_calls(), 1);
    let conversation = app.conversations.get(&first.conversation_id).await.unwrap().unwrap();
    assert_eq!(conversation.summary.as_deref(), Some(SUMMARY_TEXT));

    app.runtime.respond("guide", None, None, None, "Thanks").await.unwrap();
    assert_eq!(provider.summary_calls(), 1, "summary is written once");

    clock.advance(chrono::Duration::hours(2));
    let next = app.runtime.respond("guide", None, None, None, "Hello again").await.unwrap();
    assert_ne!(next.conversation_id, first.conversation_id);

    let system = &provider.request(provider.turn_calls() - 1).messages[0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("## Previous Conversations"));
    assert!(system.content.contains(SUMMARY_TEXT));
}

#[tokio::test]
async fn history_carries_into_the_next_turn() {
    let provider = Arc::new(ScriptedProvider::text("Noted."));
    let app = boot(base_config(vec![plain_agent()]), provider.clone(), Arc::new(ManualClock::default())).await;

    let first = app.runtime.respond("plain", None, None, None, "My name is Ada").await.unwrap();
    app.runtime
        .handle_turn(TurnRequest::new("plain", first.conversation_id.clone(), "What's my name?"))
        .await
        .unwrap();

    let contents: Vec<String> = provider.request(1).messages.iter().map(|m| m.content.clone()).collect();
    assert_eq!(&contents[1..], &["My name is Ada", "Noted.", "What's my name?"]);
}

// ── Channel router ───────────────────────────────────────────────────────

#[tokio::test]
async fn reply_target_precedence_through_router() {
    let provider = Arc::new(ScriptedProvider::text("**Hello** there"));
    let app = boot(base_config(vec![plain_agent()]), provider, Arc::new(ManualClock::default())).await;

    let mut threaded = widget_message("plain", "visitor-1", "hi");
    threaded.thread_id = Some("thread-7".into());
    let delivery = app.router.process_inbound(threaded).await.unwrap().unwrap();
    assert_eq!(delivery.target, "thread-7");
    let delivered = app.widget.drain("thread-7");
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].text, "Hello there");

    let mut explicit = widget_message("plain", "visitor-1", "again");
    explicit.thread_id = Some("thread-7".into());
    explicit.reply_target = Some("inbox-3".into());
    let delivery = app.router.process_inbound(explicit).await.unwrap().unwrap();
    assert_eq!(delivery.target, "inbox-3");
    assert_eq!(app.widget.drain("inbox-3").len(), 1);
    assert!(app.widget.drain("thread-7").is_empty());
}

#[tokio::test]
async fn configured_channel_uses_default_target_and_broadcasts() {
    let provider = Arc::new(ScriptedProvider::text("Welcome!"));
    let mut config = base_config(vec![plain_agent()]);
    config.channels = vec![
        serde_json::from_value(serde_json::json!({
            "id": "site-widget",
            "agent_id": "plain",
            "channel_type": "widget",
            "channel_id": "site",
            "default_target": "lobby"
        }))
        .unwrap(),
    ];
    let app = boot(config, provider.clone(), Arc::new(ManualClock::default())).await;

    let inbound = InboundMessage::new(ChannelType::Widget, "site", "visitor-9", "hello");
    let delivery = app.router.process_inbound(inbound).await.unwrap().unwrap();
    assert_eq!(delivery.agent_id, "plain");
    assert_eq!(delivery.target, "lobby");
    assert_eq!(app.widget.drain("lobby")[0].text, "Welcome!");

    let delivered = app.router.send_to_all("plain", "We close early today").await.unwrap();
    assert_eq!(delivered, 1);
    assert_eq!(app.widget.drain("lobby")[0].text, "We close early today");
    assert_eq!(provider.turn_calls(), 1);
}

#[tokio::test]
async fn unowned_channel_is_dropped() {
    let provider = Arc::new(ScriptedProvider::text("never sent"));
    let app = boot(base_config(vec![plain_agent()]), provider.clone(), Arc::new(ManualClock::default())).await;

    let inbound = InboundMessage::new(ChannelType::Widget, "nowhere", "visitor", "hi");
    assert!(app.router.process_inbound(inbound).await.unwrap().is_none());
    assert_eq!(provider.turn_calls(), 0);
}
