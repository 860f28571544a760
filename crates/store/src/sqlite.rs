//! SQLite chat store.
//!
//! A single database file with one `messages` table, WAL journaling, and
//! an index on (identity, chat_id) for history loads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

use midwire_core::error::StoreError;
use midwire_core::message::{Message, Role};
use midwire_core::store::ChatStore;

/// A production SQLite chat store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and tables are created automatically.
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database exists per connection; it needs a pool
        // of one to behave like a single database.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite chat store initialized at {path}");
        Ok(store)
    }

    /// Run schema migrations.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                identity    TEXT NOT NULL,
                chat_id     TEXT NOT NULL,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages (identity, chat_id, iid)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chat index: {e}")))?;

        Ok(())
    }

    fn role_to_str(role: &Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    fn role_from_str(s: &str) -> Role {
        match s {
            "assistant" => Role::Assistant,
            "system" => Role::System,
            "tool" => Role::Tool,
            _ => Role::User,
        }
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(
        &self,
        identity: &str,
        chat_id: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        let attachments = serde_json::to_string(&message.attachments)
            .map_err(|e| StoreError::Storage(format!("attachments encode: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, identity, chat_id, role, content, attachments, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(identity)
        .bind(chat_id)
        .bind(Self::role_to_str(&message.role))
        .bind(&message.content)
        .bind(attachments)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("insert: {e}")))?;

        Ok(())
    }

    async fn history(
        &self,
        identity: &str,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        // Newest `limit` rows, returned oldest-first.
        let rows = sqlx::query(
            r#"
            SELECT id, role, content, attachments, created_at FROM (
                SELECT iid, id, role, content, attachments, created_at
                FROM messages
                WHERE identity = ? AND chat_id = ?
                ORDER BY iid DESC
                LIMIT ?
            ) ORDER BY iid ASC
            "#,
        )
        .bind(identity)
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("history: {e}")))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.get("role");
            let created_at: String = row.get("created_at");
            let attachments: String = row.get("attachments");

            let msg = Message {
                id: row.get("id"),
                role: Self::role_from_str(&role),
                content: row.get("content"),
                tool_calls: Vec::new(),
                tool_call_id: None,
                attachments: serde_json::from_str(&attachments).unwrap_or_default(),
                timestamp: DateTime::parse_from_rfc3339(&created_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            };
            messages.push(msg);
        }

        Ok(messages)
    }

    async fn delete_chat(&self, identity: &str, chat_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM messages WHERE identity = ? AND chat_id = ?")
            .bind(identity)
            .bind(chat_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("delete: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(true)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
