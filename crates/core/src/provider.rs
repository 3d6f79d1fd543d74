//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back. The runtime only ever talks to providers through the two
//! operations of [`ProviderExt`]: plain `generate` and tool-augmented
//! `generate_with_tools`.
//!
//! Implementations: OpenAI-compatible endpoints, scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use crate::tool::ToolDescriptor;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o-mini", "anthropic/claude-sonnet-4")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// The agent on whose behalf the call is made (for attribution)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Vendor stop/finish reason, when reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Per-call options shared by `generate` and `generate_with_tools`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub model: String,
    pub agent_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

impl GenerateOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            agent_id: None,
            max_tokens: None,
            temperature: default_temperature(),
        }
    }

    pub fn for_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn into_request(self, messages: Vec<Message>, tools: Vec<ToolDescriptor>) -> ProviderRequest {
        ProviderRequest {
            model: self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            agent_id: self.agent_id,
        }
    }
}

/// What a tool-augmented generation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Text,
    ToolUse,
}

/// The vendor-neutral result of `generate_with_tools`.
#[derive(Debug, Clone)]
pub struct Generation {
    pub kind: GenerationKind,
    pub text: String,
    pub tool_calls: Vec<MessageToolCall>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
    pub model: String,
}

impl From<ProviderResponse> for Generation {
    fn from(response: ProviderResponse) -> Self {
        let kind = if response.message.tool_calls.is_empty() {
            GenerationKind::Text
        } else {
            GenerationKind::ToolUse
        };
        Self {
            kind,
            text: response.message.content,
            tool_calls: response.message.tool_calls,
            stop_reason: response.stop_reason,
            usage: response.usage,
            model: response.model,
        }
    }
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The runtime calls it without
/// knowing which vendor is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

/// The two generation operations the runtime consumes.
#[async_trait]
pub trait ProviderExt {
    /// Text-only generation.
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> std::result::Result<String, ProviderError>;

    /// Generation with a tool set; the result is either text or tool calls.
    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDescriptor>,
        options: GenerateOptions,
    ) -> std::result::Result<Generation, ProviderError>;
}

#[async_trait]
impl<P: Provider + ?Sized> ProviderExt for P {
    async fn generate(
        &self,
        messages: Vec<Message>,
        options: GenerateOptions,
    ) -> std::result::Result<String, ProviderError> {
        let response = self.complete(options.into_request(messages, Vec::new())).await?;
        Ok(response.message.content)
    }

    async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDescriptor>,
        options: GenerateOptions,
    ) -> std::result::Result<Generation, ProviderError> {
        let response = self.complete(options.into_request(messages, tools)).await?;
        Ok(Generation::from(response))
    }
}
