//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley conversational
//! agent runtime. This crate has **no framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod capability;
pub mod channel;
pub mod clock;
pub mod conversation;
pub mod error;
pub mod event;
pub mod memory;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentFeatures, AgentProfile, MemoryTier};
pub use capability::{ActionSpec, CapabilityOutcome, CapabilityProvider, CapabilityRegistry};
pub use channel::{
    ChannelAdapter, ChannelConfig, ChannelMessage, ChannelType, InboundMessage, InboundRequest,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{
    Conversation, ConversationId, NewMessage, SessionKey, SessionSummary, StoredMessage,
};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use memory::{MemoryBackend, MemorySnippet};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{
    GenerateOptions, Generation, GenerationKind, Provider, ProviderExt, ProviderRequest,
    ProviderResponse, Usage,
};
pub use store::{AgentDirectory, ConversationStore};
pub use tool::{ToolCall, ToolContext, ToolDescriptor, ToolGroup, ToolResult};
