//! Per-turn context: system prompt composition and the history window.

pub mod assembler;

pub use assembler::{AssembledContext, ContextAssembler, HISTORY_TRUNCATION_MARKER, compose_system_prompt};
