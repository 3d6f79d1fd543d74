//! The turn pipeline behind every Parley agent.
//!
//! Each inbound message goes through the same steps:
//!
//! 1. **Resolve** the conversation for the channel identity ([`SessionManager`])
//! 2. **Assemble** the system prompt and history window ([`ContextAssembler`])
//! 3. **Loop** provider calls and tool dispatch until a text reply ([`ToolLoopExecutor`])
//! 4. **Persist** the reply and summarize the conversation when it is due
//!
//! [`AgentRuntime`] ties the steps together; [`SpawnManager`] runs the same
//! pipeline for `agent_spawn` sub-agents.

pub mod cache;
pub mod context;
pub mod loop_runner;
pub mod runtime;
pub mod session;
pub mod spawn;

#[cfg(test)]
mod test_helpers;

pub use cache::AgentCache;
pub use context::{AssembledContext, ContextAssembler, HISTORY_TRUNCATION_MARKER, compose_system_prompt};
pub use loop_runner::{
    DEFAULT_MAX_ITERATIONS, ITERATION_CAP_REPLY, LoopOutcome, ProgressCallback, RunOptions,
    ToolLoopExecutor, TurnMode,
};
pub use runtime::{AgentRuntime, ModelDefaults, TurnReply, TurnRequest};
pub use session::SessionManager;
pub use spawn::{SUBAGENT_CHANNEL, SpawnManager};
