//! Browser tool — fetch a web page and hand its readable text to the model.

use std::time::Duration;

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{ToolContext, ToolDescriptor, ToolGroup, required_str};
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// `browser_fetch`.
pub struct BrowserTools {
    client: reqwest::Client,
}

impl BrowserTools {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build browser HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<String, ToolError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "browser_fetch".into(),
            reason,
        };

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: "browser_fetch".into(),
                    timeout_secs: DEFAULT_TIMEOUT_SECS,
                }
            } else {
                failed(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("reading body: {e}")))?;

        debug!(url, status = status.as_u16(), bytes = body.len(), "browser_fetch");

        if !status.is_success() {
            return Err(failed(format!("HTTP {status}")));
        }

        Ok(if is_html { html_to_text(&body) } else { body })
    }
}

impl Default for BrowserTools {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolGroup for BrowserTools {
    fn group(&self) -> &str {
        "browser"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            "browser_fetch",
            "Fetch a web page and return its readable text.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string", "description": "http(s) URL to fetch" }
                },
                "required": ["url"]
            }),
        )]
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        match tool_name {
            "browser_fetch" => self.fetch(required_str(&arguments, "url")?).await,
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

/// Reduce an HTML document to its visible text.
///
/// Drops tags and the contents of `<script>`/`<style>`, decodes the common
/// entities and collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    let mut text = String::with_capacity(html.len() / 2);
    let lower = html.to_ascii_lowercase();
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];
        if rest.starts_with('<') {
            let skip_until = if lower[i..].starts_with("<script") {
                Some("</script>")
            } else if lower[i..].starts_with("<style") {
                Some("</style>")
            } else {
                None
            };

            if let Some(closing) = skip_until {
                i = match lower[i..].find(closing) {
                    Some(pos) => i + pos + closing.len(),
                    None => html.len(),
                };
            } else {
                i = match rest.find('>') {
                    Some(pos) => i + pos + 1,
                    None => html.len(),
                };
            }
            // Tags separate words
            text.push(' ');
            continue;
        }

        let next = rest.find('<').unwrap_or(rest.len());
        text.push_str(&rest[..next]);
        i += next;
    }

    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_scripts_and_styles() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script>alert("hi")</script></head>
            <body><h1>Title</h1><p>Hello&nbsp;<b>world</b> &amp; friends</p></body></html>"#;
        assert_eq!(html_to_text(html), "Title Hello world & friends");
    }

    #[test]
    fn unterminated_markup_does_not_panic() {
        assert_eq!(html_to_text("text <script>never closed"), "text");
        assert_eq!(html_to_text("a <b"), "a");
    }

    #[test]
    fn multibyte_text_survives() {
        assert_eq!(html_to_text("<p>café</p><p>naïve</p>"), "café naïve");
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let tools = BrowserTools::new();
        let err = tools
            .execute(
                "browser_fetch",
                serde_json::json!({"url": "file:///etc/passwd"}),
                &ToolContext::for_agent("a1"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
