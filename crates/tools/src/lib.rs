//! Tool routing and built-in tool groups for Parley.
//!
//! The model sees two kinds of tools:
//! - one tool per external capability provider, carrying `action` + `params`
//! - built-in groups (memory, cron, agent spawn, browser, filesystem),
//!   each switched on per agent
//!
//! [`ToolDispatcher`] builds the per-agent catalog and executes calls.

pub mod browser;
pub mod cron;
pub mod dispatcher;
pub mod fs;
pub mod memory;
pub mod route;
pub mod spawn;

pub use browser::BrowserTools;
pub use cron::{CronTools, InMemoryScheduleBook, ScheduleBook, ScheduledJob};
pub use dispatcher::{ToolDispatcher, parse_call};
pub use fs::FilesystemTools;
pub use memory::MemoryTools;
pub use route::ToolRoute;
pub use spawn::{SpawnTool, SubAgentSpawner};
