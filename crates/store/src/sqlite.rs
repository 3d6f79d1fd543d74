//! SQLite store.
//!
//! Tables:
//! - `conversations` — one row per session, channel keys nullable
//! - `messages` — append-only, `seq` is the AUTOINCREMENT rowid
//! - `agents`, `channel_configs` — JSON documents with indexed lookup columns
//!
//! Timestamps are stored as Unix milliseconds so range comparisons stay
//! numeric.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::error::StoreError;
use parley_core::{
    AgentDirectory, AgentProfile, ChannelConfig, ChannelType, Conversation, ConversationId,
    ConversationStore, NewMessage, Role, SessionKey, SessionSummary, StoredMessage,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// A SQLite-backed conversation store and agent directory.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn db_err(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Database(format!("{context}: {e}"))
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

impl SqliteStore {
    /// Open (or create) a database and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to `:memory:` is a separate database
        let max_connections = if url.contains(":memory:") { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_err("open"))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Wrap an existing pool and run migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// The underlying pool, for backends sharing the same database file.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 7] = [
            (
                "conversations table",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id               TEXT PRIMARY KEY,
                    agent_id         TEXT NOT NULL,
                    external_user_id TEXT,
                    channel_type     TEXT,
                    channel_id       TEXT,
                    message_count    INTEGER NOT NULL DEFAULT 0,
                    last_message_at  INTEGER,
                    summary          TEXT,
                    created_at       INTEGER NOT NULL,
                    updated_at       INTEGER NOT NULL
                )
                "#,
            ),
            (
                "conversation key index",
                "CREATE INDEX IF NOT EXISTS idx_conversations_key ON conversations(agent_id, channel_type, channel_id, last_message_at)",
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                    conversation_id TEXT NOT NULL REFERENCES conversations(id),
                    role            TEXT NOT NULL,
                    content         TEXT NOT NULL,
                    metadata        TEXT NOT NULL DEFAULT '{}',
                    created_at      INTEGER NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq DESC)",
            ),
            (
                "agents table",
                r#"
                CREATE TABLE IF NOT EXISTS agents (
                    id      TEXT PRIMARY KEY,
                    profile TEXT NOT NULL
                )
                "#,
            ),
            (
                "channel_configs table",
                r#"
                CREATE TABLE IF NOT EXISTS channel_configs (
                    id           TEXT PRIMARY KEY,
                    agent_id     TEXT NOT NULL,
                    channel_type TEXT NOT NULL,
                    channel_id   TEXT NOT NULL,
                    enabled      INTEGER NOT NULL,
                    config       TEXT NOT NULL
                )
                "#,
            ),
            (
                "channel lookup index",
                "CREATE INDEX IF NOT EXISTS idx_channel_configs_lookup ON channel_configs(channel_type, channel_id)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite store migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, StoreError> {
        let get_err = |col: &str, e: sqlx::Error| StoreError::Corrupt(format!("{col} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| get_err("id", e))?;
        let channel_type: Option<String> =
            row.try_get("channel_type").map_err(|e| get_err("channel_type", e))?;
        let message_count: i64 =
            row.try_get("message_count").map_err(|e| get_err("message_count", e))?;
        let last_message_at: Option<i64> =
            row.try_get("last_message_at").map_err(|e| get_err("last_message_at", e))?;
        let created_at: i64 = row.try_get("created_at").map_err(|e| get_err("created_at", e))?;
        let updated_at: i64 = row.try_get("updated_at").map_err(|e| get_err("updated_at", e))?;

        Ok(Conversation {
            id: ConversationId(id),
            agent_id: row.try_get("agent_id").map_err(|e| get_err("agent_id", e))?,
            external_user_id: row
                .try_get("external_user_id")
                .map_err(|e| get_err("external_user_id", e))?,
            channel_type: channel_type.map(ChannelType::from),
            channel_id: row.try_get("channel_id").map_err(|e| get_err("channel_id", e))?,
            message_count: u32::try_from(message_count)
                .map_err(|_| StoreError::Corrupt(format!("message_count {message_count}")))?,
            last_message_at: last_message_at.map(from_millis).transpose()?,
            summary: row.try_get("summary").map_err(|e| get_err("summary", e))?,
            created_at: from_millis(created_at)?,
            updated_at: from_millis(updated_at)?,
        })
    }

    fn row_to_message(row: &SqliteRow) -> Result<StoredMessage, StoreError> {
        let get_err = |col: &str, e: sqlx::Error| StoreError::Corrupt(format!("{col} column: {e}"));

        let role: String = row.try_get("role").map_err(|e| get_err("role", e))?;
        let metadata: String = row.try_get("metadata").map_err(|e| get_err("metadata", e))?;
        let created_at: i64 = row.try_get("created_at").map_err(|e| get_err("created_at", e))?;

        Ok(StoredMessage {
            seq: row.try_get("seq").map_err(|e| get_err("seq", e))?,
            conversation_id: ConversationId(
                row.try_get("conversation_id")
                    .map_err(|e| get_err("conversation_id", e))?,
            ),
            role: Role::parse(&role)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown role '{role}'")))?,
            content: row.try_get("content").map_err(|e| get_err("content", e))?,
            metadata: serde_json::from_str(&metadata)
                .map_err(|e| StoreError::Corrupt(format!("metadata json: {e}")))?,
            created_at: from_millis(created_at)?,
        })
    }

    fn decode_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, col: &str) -> Result<T, StoreError> {
        let raw: String = row
            .try_get(col)
            .map_err(|e| StoreError::Corrupt(format!("{col} column: {e}")))?;
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(format!("{col} json: {e}")))
    }
}

fn channel_key(key: &SessionKey) -> Option<&str> {
    key.channel_type.as_ref().map(|c| c.as_str())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn find_active(
        &self,
        key: &SessionKey,
        since: DateTime<Utc>,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE agent_id = ?1 AND channel_type IS ?2 AND channel_id IS ?3
              AND last_message_at >= ?4
            ORDER BY last_message_at DESC
            LIMIT 1
            "#,
        )
        .bind(&key.agent_id)
        .bind(channel_key(key))
        .bind(key.channel_id.as_deref())
        .bind(to_millis(since))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find_active"))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn find_unused(&self, key: &SessionKey) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE agent_id = ?1 AND channel_type IS ?2 AND channel_id IS ?3
              AND last_message_at IS NULL
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(&key.agent_id)
        .bind(channel_key(key))
        .bind(key.channel_id.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find_unused"))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn create(&self, conversation: &Conversation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations
                (id, agent_id, external_user_id, channel_type, channel_id,
                 message_count, last_message_at, summary, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(conversation.id.as_str())
        .bind(&conversation.agent_id)
        .bind(conversation.external_user_id.as_deref())
        .bind(conversation.channel_type.as_ref().map(|c| c.as_str()))
        .bind(conversation.channel_id.as_deref())
        .bind(i64::from(conversation.message_count))
        .bind(conversation.last_message_at.map(to_millis))
        .bind(conversation.summary.as_deref())
        .bind(to_millis(conversation.created_at))
        .bind(to_millis(conversation.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err("create conversation"))?;

        Ok(())
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("get conversation"))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn record_turn(&self, id: &ConversationId, now: DateTime<Utc>) -> Result<u32, StoreError> {
        // Single statement: concurrent turns cannot lose increments
        let row = sqlx::query(
            r#"
            UPDATE conversations
            SET message_count = message_count + 1, last_message_at = ?2, updated_at = ?2
            WHERE id = ?1
            RETURNING message_count
            "#,
        )
        .bind(id.as_str())
        .bind(to_millis(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("record_turn"))?
        .ok_or_else(|| StoreError::NotFound(format!("conversation {id}")))?;

        let count: i64 = row
            .try_get("message_count")
            .map_err(|e| StoreError::Corrupt(format!("message_count column: {e}")))?;
        u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("message_count {count}")))
    }

    async fn set_summary(
        &self,
        id: &ConversationId,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET summary = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(summary)
            .bind(to_millis(now))
            .execute(&self.pool)
            .await
            .map_err(db_err("set_summary"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }
        Ok(())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        message: NewMessage,
        now: DateTime<Utc>,
    ) -> Result<StoredMessage, StoreError> {
        let metadata = serde_json::Value::Object(message.metadata.clone()).to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&metadata)
        .bind(to_millis(now))
        .execute(&self.pool)
        .await
        .map_err(db_err("append_message"))?;

        Ok(StoredMessage {
            seq: result.last_insert_rowid(),
            conversation_id: id.clone(),
            role: message.role,
            content: message.content,
            metadata: message.metadata,
            created_at: now,
        })
    }

    async fn recent_messages(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )
        .bind(id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("recent_messages"))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn recent_summaries(
        &self,
        agent_id: &str,
        exclude: &ConversationId,
        limit: usize,
    ) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE agent_id = ?1 AND id != ?2 AND summary IS NOT NULL
            ORDER BY updated_at DESC
            LIMIT ?3
            "#,
        )
        .bind(agent_id)
        .bind(exclude.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("recent_summaries"))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let conversation = Self::row_to_conversation(row)?;
            if let Some(summary) = conversation.summary {
                summaries.push(SessionSummary {
                    conversation_id: conversation.id,
                    channel_type: conversation.channel_type,
                    summary,
                    updated_at: conversation.updated_at,
                });
            }
        }
        Ok(summaries)
    }

    async fn list_conversations(&self, agent_id: &str) -> Result<Vec<Conversation>, StoreError> {
        let rows = sqlx::query("SELECT * FROM conversations WHERE agent_id = ?1 ORDER BY created_at DESC")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list_conversations"))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }
}

#[async_trait]
impl AgentDirectory for SqliteStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<AgentProfile>, StoreError> {
        let row = sqlx::query("SELECT profile FROM agents WHERE id = ?1")
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("get_agent"))?;

        row.as_ref().map(|r| Self::decode_json(r, "profile")).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<AgentProfile>, StoreError> {
        let rows = sqlx::query("SELECT profile FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("list_agents"))?;

        rows.iter().map(|r| Self::decode_json(r, "profile")).collect()
    }

    async fn upsert_agent(&self, agent: &AgentProfile) -> Result<(), StoreError> {
        let profile = serde_json::to_string(agent)
            .map_err(|e| StoreError::Database(format!("agent serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, profile) VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET profile = excluded.profile
            "#,
        )
        .bind(&agent.id)
        .bind(&profile)
        .execute(&self.pool)
        .await
        .map_err(db_err("upsert_agent"))?;

        Ok(())
    }

    async fn channel_configs(&self, agent_id: &str) -> Result<Vec<ChannelConfig>, StoreError> {
        let rows = sqlx::query("SELECT config FROM channel_configs WHERE agent_id = ?1 ORDER BY id")
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("channel_configs"))?;

        rows.iter().map(|r| Self::decode_json(r, "config")).collect()
    }

    async fn find_channel_config(
        &self,
        channel_type: &ChannelType,
        channel_id: &str,
    ) -> Result<Option<ChannelConfig>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT config FROM channel_configs
            WHERE channel_type = ?1 AND channel_id = ?2 AND enabled = 1
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(channel_type.as_str())
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("find_channel_config"))?;

        row.as_ref().map(|r| Self::decode_json(r, "config")).transpose()
    }

    async fn upsert_channel_config(&self, config: &ChannelConfig) -> Result<(), StoreError> {
        let json = serde_json::to_string(config)
            .map_err(|e| StoreError::Database(format!("channel config serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO channel_configs (id, agent_id, channel_type, channel_id, enabled, config)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                agent_id = excluded.agent_id,
                channel_type = excluded.channel_type,
                channel_id = excluded.channel_id,
                enabled = excluded.enabled,
                config = excluded.config
            "#,
        )
        .bind(&config.id)
        .bind(&config.agent_id)
        .bind(config.channel_type.as_str())
        .bind(&config.channel_id)
        .bind(config.enabled)
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(db_err("upsert_channel_config"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn slack_key() -> SessionKey {
        SessionKey::new("a1", Some(ChannelType::Slack), Some("C1"))
    }

    #[tokio::test]
    async fn conversation_roundtrip_with_null_keys() {
        let store = test_store().await;
        let now = Utc::now();
        let key = SessionKey::new("a1", None, None);
        let conv = Conversation::new(&key, Some("user-7"), now);
        store.create(&conv).await.unwrap();

        let fetched = store.get(&conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.key(), key);
        assert_eq!(fetched.external_user_id.as_deref(), Some("user-7"));
        assert_eq!(fetched.message_count, 0);

        // NULL keys match NULL keys only
        assert!(store.find_unused(&key).await.unwrap().is_some());
        assert!(store.find_unused(&slack_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_turn_moves_session_to_active() {
        let store = test_store().await;
        let now = Utc::now();
        let conv = Conversation::new(&slack_key(), None, now);
        store.create(&conv).await.unwrap();

        assert_eq!(store.record_turn(&conv.id, now).await.unwrap(), 1);
        assert_eq!(store.record_turn(&conv.id, now).await.unwrap(), 2);

        let since = now - Duration::minutes(30);
        let active = store.find_active(&slack_key(), since).await.unwrap().unwrap();
        assert_eq!(active.id, conv.id);
        assert_eq!(active.message_count, 2);
        assert!(store.find_unused(&slack_key()).await.unwrap().is_none());

        let later = now + Duration::minutes(31);
        assert!(
            store
                .find_active(&slack_key(), later - Duration::minutes(30))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let store = test_store().await;
        let now = Utc::now();
        let conv = Conversation::new(&slack_key(), None, now);
        store.create(&conv).await.unwrap();

        // Identical timestamps: only seq can order them
        for text in ["A", "B", "C"] {
            store
                .append_message(&conv.id, NewMessage::new(Role::User, text), now)
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&conv.id, 10).await.unwrap();
        let texts: Vec<&str> = recent.iter().rev().map(|m| m.content.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn message_metadata_persists() {
        let store = test_store().await;
        let conv = Conversation::new(&slack_key(), None, Utc::now());
        store.create(&conv).await.unwrap();
        store
            .append_message(
                &conv.id,
                NewMessage::new(Role::Assistant, "done")
                    .with_metadata("tools_used", serde_json::json!(["memory_search"])),
                Utc::now(),
            )
            .await
            .unwrap();

        let messages = store.recent_messages(&conv.id, 1).await.unwrap();
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].metadata["tools_used"][0], "memory_search");
    }

    #[tokio::test]
    async fn corrupt_metadata_is_reported() {
        let store = test_store().await;
        let conv = Conversation::new(&slack_key(), None, Utc::now());
        store.create(&conv).await.unwrap();
        store
            .append_message(&conv.id, NewMessage::new(Role::User, "hi"), Utc::now())
            .await
            .unwrap();
        sqlx::query("UPDATE messages SET metadata = 'not json' WHERE conversation_id = ?1")
            .bind(&conv.id.0)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.recent_messages(&conv.id, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(ref m) if m.contains("metadata")));
    }

    #[tokio::test]
    async fn summaries_exclude_current_and_unsummarized() {
        let store = test_store().await;
        let now = Utc::now();
        let current = Conversation::new(&slack_key(), None, now);
        let old = Conversation::new(&SessionKey::new("a1", None, None), None, now);
        let bare = Conversation::new(&SessionKey::new("a1", Some(ChannelType::Teams), Some("T")), None, now);
        for c in [&current, &old, &bare] {
            store.create(c).await.unwrap();
        }
        store.set_summary(&current.id, "now", now).await.unwrap();
        store.set_summary(&old.id, "before", now).await.unwrap();

        let summaries = store.recent_summaries("a1", &current.id, 3).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].summary, "before");
        assert!(summaries[0].channel_type.is_none());
    }

    #[tokio::test]
    async fn agents_and_channels() {
        let store = test_store().await;
        let agent = AgentProfile::new("a1", "Support").with_instructions("Be kind.");
        store.upsert_agent(&agent).await.unwrap();
        assert_eq!(store.get_agent("a1").await.unwrap().unwrap().instructions, "Be kind.");
        assert!(store.get_agent("a2").await.unwrap().is_none());

        let config = ChannelConfig {
            id: "cfg-1".into(),
            agent_id: "a1".into(),
            channel_type: ChannelType::Webhook,
            channel_id: "orders".into(),
            default_target: Some("https://example.com/cb".into()),
            enabled: true,
            settings: Default::default(),
        };
        store.upsert_channel_config(&config).await.unwrap();
        let found = store
            .find_channel_config(&ChannelType::Webhook, "orders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.default_target.as_deref(), Some("https://example.com/cb"));
        assert_eq!(store.channel_configs("a1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_turn_unknown_conversation() {
        let store = test_store().await;
        let err = store.record_turn(&ConversationId::from("missing"), Utc::now()).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }
}
