//! Per-channel markup.
//!
//! Agents answer in Markdown. Slack wants its own mrkdwn dialect, Teams
//! renders Markdown as-is, and everything else gets plain text.

use std::sync::LazyLock;

use parley_core::ChannelType;
use regex_lite::Regex;

static HEADING: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}[ \t]+(.+?)[ \t]*#*$").ok());
static BOLD: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").ok());
static STRIKE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").ok());
static LINK: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\[([^\]\n]+)\]\(([^)\s]+)\)").ok());

/// Render agent output for a channel. Pure; the same input always gives the
/// same output.
pub fn format_for_channel(text: &str, channel_type: &ChannelType) -> String {
    match channel_type {
        ChannelType::Slack => to_slack_mrkdwn(text),
        ChannelType::Teams => text.to_string(),
        ChannelType::Webhook | ChannelType::Widget | ChannelType::Other(_) => to_plain(text),
    }
}

/// Markdown to Slack mrkdwn.
pub fn to_slack_mrkdwn(text: &str) -> String {
    let out = replace(&HEADING, text, "**$1**");
    let out = replace(&LINK, &out, "<$2|$1>");
    let out = replace(&BOLD, &out, "*$1*");
    replace(&STRIKE, &out, "~$1~")
}

/// Markdown to plain text. Links keep their URL in parentheses.
pub fn to_plain(text: &str) -> String {
    let out = replace(&HEADING, text, "$1");
    let out = replace(&LINK, &out, "$1 ($2)");
    let out = replace(&BOLD, &out, "$1");
    replace(&STRIKE, &out, "$1")
}

fn replace(re: &LazyLock<Option<Regex>>, text: &str, replacement: &str) -> String {
    match re.as_ref() {
        Some(re) => re.replace_all(text, replacement).into_owned(),
        None => text.to_string(),
    }
}
