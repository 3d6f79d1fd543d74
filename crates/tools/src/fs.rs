//! Filesystem tools — read, write and list files in the agent's workspace.
//!
//! Each agent gets its own directory `<root>/<agent_id>`. Paths are relative
//! to it; absolute paths and `..` components are rejected before touching
//! the disk.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use parley_core::error::ToolError;
use parley_core::tool::{ToolContext, ToolDescriptor, ToolGroup, required_str};
use tracing::debug;

/// `fs_read`, `fs_write` and `fs_list`.
pub struct FilesystemTools {
    root: PathBuf,
}

impl FilesystemTools {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a user-supplied relative path inside the agent's directory.
    fn resolve(&self, tool_name: &str, agent_id: &str, path: &str) -> Result<PathBuf, ToolError> {
        let denied = |reason: String| ToolError::PermissionDenied {
            tool_name: tool_name.to_string(),
            reason,
        };

        let agent_dir = Path::new(agent_id);
        let mut components = agent_dir.components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(denied(format!("Invalid agent id '{agent_id}'")));
        }

        let requested = Path::new(path.trim());
        if requested.is_absolute() {
            return Err(denied(format!("Absolute paths are not allowed: '{path}'")));
        }
        if !is_plain_relative(requested) {
            return Err(denied(format!("Path traversal detected in '{path}'")));
        }

        Ok(self.root.join(agent_dir).join(requested))
    }

    async fn read(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let path = self.resolve("fs_read", &ctx.agent_id, required_str(arguments, "path")?)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "fs_read".into(),
                reason: format!("{}: {e}", display_relative(&path, &self.root)),
            })
    }

    async fn write(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let raw = required_str(arguments, "path")?;
        let content = required_str(arguments, "content")?;
        let path = self.resolve("fs_write", &ctx.agent_id, raw)?;
        if raw.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'path' must name a file".into()));
        }

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "fs_write".into(),
            reason,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("creating directories: {e}")))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| failed(format!("writing {raw}: {e}")))?;

        debug!(agent_id = %ctx.agent_id, path = raw, bytes = content.len(), "fs_write");
        Ok(format!("Wrote {} bytes to {raw}", content.len()))
    }

    async fn list(&self, arguments: &serde_json::Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let raw = arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let dir = self.resolve("fs_list", &ctx.agent_id, raw)?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // A fresh agent has no directory yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && raw.trim().is_empty() => {
                return Ok("(empty)".into());
            }
            Err(e) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "fs_list".into(),
                    reason: format!("{}: {e}", display_relative(&dir, &self.root)),
                });
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            Ok("(empty)".into())
        } else {
            Ok(names.join("\n"))
        }
    }
}

/// Only `Normal` and `.` components.
fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[async_trait]
impl ToolGroup for FilesystemTools {
    fn group(&self) -> &str {
        "filesystem"
    }

    fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new(
                "fs_read",
                "Read a text file from your workspace.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to your workspace" }
                    },
                    "required": ["path"]
                }),
            ),
            ToolDescriptor::new(
                "fs_write",
                "Write a text file in your workspace, creating directories as needed.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to your workspace" },
                        "content": { "type": "string", "description": "File contents" }
                    },
                    "required": ["path", "content"]
                }),
            ),
            ToolDescriptor::new(
                "fs_list",
                "List the entries of a directory in your workspace.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Directory (defaults to the workspace root)" }
                    }
                }),
            ),
        ]
    }

    async fn execute(
        &self,
        tool_name: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        match tool_name {
            "fs_read" => self.read(&arguments, ctx).await,
            "fs_write" => self.write(&arguments, ctx).await,
            "fs_list" => self.list(&arguments, ctx).await,
            other => Err(ToolError::NotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FilesystemTools) {
        let dir = TempDir::new().unwrap();
        let tools = FilesystemTools::new(dir.path());
        (dir, tools)
    }

    #[tokio::test]
    async fn write_read_list() {
        let (dir, tools) = setup();
        let ctx = ToolContext::for_agent("a1");

        let out = tools
            .execute("fs_write", serde_json::json!({"path": "notes/todo.txt", "content": "ship it"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out, "Wrote 7 bytes to notes/todo.txt");
        assert!(dir.path().join("a1/notes/todo.txt").exists());

        let read = tools
            .execute("fs_read", serde_json::json!({"path": "notes/todo.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(read, "ship it");

        let listed = tools.execute("fs_list", serde_json::json!({}), &ctx).await.unwrap();
        assert_eq!(listed, "notes/");
        let nested = tools
            .execute("fs_list", serde_json::json!({"path": "notes"}), &ctx)
            .await
            .unwrap();
        assert_eq!(nested, "todo.txt");
    }

    #[tokio::test]
    async fn agents_are_isolated() {
        let (_dir, tools) = setup();
        tools
            .execute(
                "fs_write",
                serde_json::json!({"path": "secret.txt", "content": "a1 only"}),
                &ToolContext::for_agent("a1"),
            )
            .await
            .unwrap();

        let other = ToolContext::for_agent("a2");
        assert!(tools
            .execute("fs_read", serde_json::json!({"path": "secret.txt"}), &other)
            .await
            .is_err());
        assert_eq!(
            tools.execute("fs_list", serde_json::json!({}), &other).await.unwrap(),
            "(empty)"
        );
    }

    #[tokio::test]
    async fn traversal_and_absolute_paths_rejected() {
        let (_dir, tools) = setup();
        let ctx = ToolContext::for_agent("a1");

        for path in ["../a2/secret.txt", "notes/../../etc", "/etc/passwd", ".."] {
            let err = tools
                .execute("fs_read", serde_json::json!({"path": path}), &ctx)
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::PermissionDenied { .. }), "{path}");
        }
    }

    #[tokio::test]
    async fn hostile_agent_id_rejected() {
        let (_dir, tools) = setup();
        let err = tools
            .execute(
                "fs_list",
                serde_json::json!({}),
                &ToolContext::for_agent("../other"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
