//! Parley: the binary's wiring, shared with the integration tests.

pub mod bootstrap;

pub use bootstrap::{App, Bootstrap};
