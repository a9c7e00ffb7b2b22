//! PostgreSQL persistence backend.
//!
//! Tables:
//! - `chat_messages` - append-only message history
//! - `online_users` - one row per online identity, refreshed on activity

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::backend::{ChatMessage, MessageKind, OnlineRecord, PersistenceBackend, PersistenceError};

type MessageRow = (Uuid, String, String, String, DateTime<Utc>);

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id UUID PRIMARY KEY,
        sender_id TEXT NOT NULL,
        content TEXT NOT NULL,
        message_type TEXT NOT NULL DEFAULT 'text',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_messages_created_at ON chat_messages (created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS online_users (
        identity_id TEXT PRIMARY KEY,
        connection_id UUID NOT NULL,
        display_name TEXT NOT NULL,
        last_seen TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Chat schema ready");
        Ok(())
    }
}

fn into_message((id, sender_id, content, kind, created_at): MessageRow) -> Result<ChatMessage, PersistenceError> {
    Ok(ChatMessage {
        id,
        sender_id,
        content,
        kind: kind.parse()?,
        created_at,
    })
}

#[async_trait]
impl PersistenceBackend for PostgresBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn append_message(
        &self,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, PersistenceError> {
        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (id, sender_id, content, message_type, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING id, sender_id, content, message_type, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sender_id)
        .bind(content)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        into_message(row)
    }

    async fn query_messages(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, PersistenceError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, sender_id, content, message_type, created_at
            FROM chat_messages
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_message).collect()
    }

    async fn upsert_online(
        &self,
        identity_id: &str,
        connection_id: Uuid,
        display_name: &str,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO online_users (identity_id, connection_id, display_name, last_seen)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (identity_id) DO UPDATE
            SET connection_id = EXCLUDED.connection_id,
                display_name = EXCLUDED.display_name,
                last_seen = NOW()
            "#,
        )
        .bind(identity_id)
        .bind(connection_id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_online(&self, identity_id: &str) -> Result<(), PersistenceError> {
        sqlx::query("DELETE FROM online_users WHERE identity_id = $1")
            .bind(identity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_online(&self) -> Result<Vec<OnlineRecord>, PersistenceError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT identity_id, display_name FROM online_users")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(identity_id, display_name)| OnlineRecord {
                identity_id,
                display_name,
            })
            .collect())
    }

    async fn sweep_stale(&self, timeout_minutes: u64) -> Result<u64, PersistenceError> {
        let result = sqlx::query(
            "DELETE FROM online_users WHERE last_seen < NOW() - make_interval(mins => $1)",
        )
        .bind(timeout_minutes as i32)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
