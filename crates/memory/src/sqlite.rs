//! SQLite backend with FTS5 full-text search.
//!
//! Uses a single SQLite database file with two tables:
//! - `memories` — the raw entries, scoped by agent
//! - `memories_fts` — FTS5 virtual table used to find candidate entries
//!
//! Candidates are re-scored with [`term_overlap`] so similarities land in
//! `[0, 1]` like every other backend.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use parley_core::error::MemoryError;
use parley_core::memory::{MemoryBackend, MemorySnippet};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{term_overlap, terms};

/// Candidates fetched per requested result before re-scoring.
const OVERFETCH: usize = 4;

/// A production SQLite memory backend with FTS5 full-text search.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Create a new SQLite backend from a URL or path.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to `:memory:` is a separate database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let backend = Self::from_pool(pool).await?;
        info!("SQLite memory backend initialized at {path}");
        Ok(backend)
    }

    /// Create from an existing pool (shared with the conversation store).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Run schema migrations — creates tables, FTS5 virtual table, and triggers.
    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements: [(&str, &str); 5] = [
            (
                "memories table",
                r#"
                CREATE TABLE IF NOT EXISTS memories (
                    iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                    id          TEXT UNIQUE NOT NULL,
                    agent_id    TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    source_key  TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
                    content,
                    content='memories',
                    content_rowid='iid',
                    tokenize='unicode61'
                )
                "#,
            ),
            (
                "insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
                    INSERT INTO memories_fts(rowid, content) VALUES (new.iid, new.content);
                END
                "#,
            ),
            (
                "delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
                    INSERT INTO memories_fts(memories_fts, rowid, content)
                    VALUES ('delete', old.iid, old.content);
                END
                "#,
            ),
            (
                "agent index",
                "CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite memory migrations complete");
        Ok(())
    }

    /// Build a safe FTS5 query from user text: each term quoted, prefix
    /// matched, joined with OR so partial matches surface as candidates.
    fn sanitize_fts_query(text: &str) -> String {
        terms(text)
            .into_iter()
            .map(|t| format!("\"{t}\"*"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }
}

#[async_trait]
impl MemoryBackend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn search(&self, agent_id: &str, query: &str, top_k: usize) -> Result<Vec<MemorySnippet>, MemoryError> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT m.content, m.source_key
            FROM memories_fts f
            JOIN memories m ON m.iid = f.rowid
            WHERE memories_fts MATCH ?1 AND m.agent_id = ?2
            ORDER BY bm25(memories_fts)
            LIMIT ?3
            "#,
        )
        .bind(&fts_query)
        .bind(agent_id)
        .bind((top_k * OVERFETCH) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("FTS5 search: {e}")))?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let content: String = row
                .try_get("content")
                .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
            let source_key: String = row
                .try_get("source_key")
                .map_err(|e| MemoryError::QueryFailed(format!("source_key column: {e}")))?;
            let similarity = term_overlap(query, &content);
            if similarity > 0.0 {
                results.push(MemorySnippet::new(content, similarity, source_key));
            }
        }

        // Stable: bm25 order breaks ties
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);
        Ok(results)
    }

    async fn store(&self, agent_id: &str, text: &str, source_key: &str) -> Result<String, MemoryError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO memories (id, agent_id, content, source_key, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(agent_id)
        .bind(text)
        .bind(source_key)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;

        debug!(agent_id, id = %id, "Stored memory");
        Ok(id)
    }

    async fn count(&self, agent_id: &str) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM memories WHERE agent_id = ?1")
            .bind(agent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}
