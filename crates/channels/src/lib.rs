//! Messaging channels for Parley.
//!
//! The [`ChannelRouter`] sits between platform adapters and the agent
//! runtime. Adapters only translate wire formats:
//! - **Slack**: Events API in, `chat.postMessage` out, `v0` signatures
//! - **Teams**: Bot Framework activities, replies to the service URL
//! - **Webhook**: generic JSON in, callback URL out, `sha256=` signatures
//! - **Widget**: in-process outbox for the embedded chat widget

use std::time::Duration;

use tracing::warn;

pub mod format;
pub mod router;
pub mod slack;
pub mod teams;
pub mod webhook;
pub mod widget;

pub use format::format_for_channel;
pub use router::{ChannelRouter, Delivery, reply_target};
pub use slack::SlackAdapter;
pub use teams::TeamsAdapter;
pub use webhook::{WebhookAdapter, WebhookConfig};
pub use widget::WidgetAdapter;

pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}
