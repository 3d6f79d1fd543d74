//! Persistence for Parley: conversations, messages, agent profiles and
//! channel configurations.
//!
//! Both backends implement `parley_core::ConversationStore` and
//! `parley_core::AgentDirectory`.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
