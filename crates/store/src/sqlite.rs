//! SQLite conversation store.
//!
//! Two tables:
//! - `conversations`: one row per chat, scoped by owner
//! - `messages`: ordered by an autoincrement `seq`, parts stored as JSON
//!
//! Multi-row writes run in a transaction so a message never lands without its
//! conversation's `updated_at` moving with it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use repolens_core::error::StoreError;
use repolens_core::message::{
    Conversation, ConversationId, ConversationSummary, Message, Part, Role,
};
use repolens_core::store::ConversationStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A SQLite-backed conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// Pass `":memory:"` for an ephemeral database; it is pinned to a single
    /// connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path == ":memory:";
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{path}"))
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            })
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            // The database vanishes with its last connection.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL,
                title       TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT UNIQUE NOT NULL,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role             TEXT NOT NULL,
                parts            TEXT NOT NULL,
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_time(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let parts_json: String = row
            .try_get("parts")
            .map_err(|e| StoreError::QueryFailed(format!("parts column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let role = Role::parse(&role)
            .ok_or_else(|| StoreError::Corrupt(format!("message {id} has role '{role}'")))?;
        let parts: Vec<Part> = serde_json::from_str(&parts_json)
            .map_err(|e| StoreError::Corrupt(format!("message {id} parts: {e}")))?;

        Ok(Message {
            id,
            role,
            parts,
            created_at: Self::parse_time(&created_at),
        })
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationSummary, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let title: Option<String> = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        Ok(ConversationSummary {
            id: ConversationId(id),
            title,
            created_at: Self::parse_time(&created_at),
            updated_at: Self::parse_time(&updated_at),
        })
    }

    fn encode_parts(parts: &[Part]) -> Result<String, StoreError> {
        serde_json::to_string(parts).map_err(|e| StoreError::Storage(format!("encode parts: {e}")))
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_conversation(
        &self,
        owner_id: &str,
        first_message: Message,
    ) -> Result<Conversation, StoreError> {
        let mut conversation = Conversation::new(owner_id);
        let now = conversation.created_at.to_rfc3339();
        let parts = Self::encode_parts(&first_message.parts)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        sqlx::query(
            "INSERT INTO conversations (id, owner_id, title, created_at, updated_at) VALUES (?, ?, NULL, ?, ?)",
        )
        .bind(conversation.id.as_str())
        .bind(owner_id)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert conversation: {e}")))?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, parts, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&first_message.id)
        .bind(conversation.id.as_str())
        .bind(first_message.role.as_str())
        .bind(&parts)
        .bind(first_message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert message: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;

        conversation.push(first_message);
        debug!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        id: &ConversationId,
        owner_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, created_at, updated_at FROM conversations WHERE id = ? AND owner_id = ?",
        )
        .bind(id.as_str())
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("find conversation: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let summary = Self::row_to_summary(&row)?;

        let rows = sqlx::query(
            "SELECT id, role, parts, created_at FROM messages WHERE conversation_id = ? ORDER BY seq ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("load messages: {e}")))?;

        let messages = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Conversation {
            id: summary.id,
            owner_id: owner_id.to_string(),
            title: summary.title,
            messages,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
        }))
    }

    async fn list_conversations(&self, owner_id: &str) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE owner_id = ? ORDER BY updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list conversations: {e}")))?;

        rows.iter().map(Self::row_to_summary).collect()
    }

    async fn insert_message(
        &self,
        conversation_id: &ConversationId,
        message: &Message,
    ) -> Result<(), StoreError> {
        let parts = Self::encode_parts(&message.parts)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("touch conversation: {e}")))?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("conversation {conversation_id}")));
        }

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, parts, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(conversation_id.as_str())
        .bind(message.role.as_str())
        .bind(&parts)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("insert message: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(())
    }

    async fn update_message_parts(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
        parts: &[Part],
    ) -> Result<(), StoreError> {
        let parts = Self::encode_parts(parts)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let updated = sqlx::query("UPDATE messages SET parts = ? WHERE id = ? AND conversation_id = ?")
            .bind(&parts)
            .bind(message_id)
            .bind(conversation_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("update message: {e}")))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("message {message_id}")));
        }

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id.as_str())
            .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("touch conversation: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(())
    }

    async fn update_conversation_title(
        &self,
        conversation_id: &ConversationId,
        title: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE conversations SET title = ? WHERE id = ? AND title IS NULL")
            .bind(title)
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("update title: {e}")))?;
        Ok(result.rows_affected() == 1)
    }
}
