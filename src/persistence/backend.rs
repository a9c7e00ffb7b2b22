//! Backend trait for chat persistence.
//!
//! The chat core treats storage as an external collaborator: it appends and
//! pages messages, and mirrors presence into a best-effort online registry.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Stored data could not be decoded
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Backend is temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            other => Err(PersistenceError::InvalidData(format!(
                "unknown message type: {}",
                other
            ))),
        }
    }
}

/// A persisted chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Assigned by the backend; defines message order
    pub created_at: DateTime<Utc>,
}

/// A row of the online-user registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineRecord {
    pub identity_id: String,
    pub display_name: String,
}

/// Storage collaborator for chat messages and the online registry.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// connection task and the sweep task.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Backend type identifier
    fn backend_type(&self) -> &'static str;

    /// Append a message; the backend assigns its id and creation time.
    async fn append_message(
        &self,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, PersistenceError>;

    /// Fetch a page of messages, most recent first.
    async fn query_messages(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, PersistenceError>;

    /// Insert or refresh an identity's registry row (refreshes last-seen).
    async fn upsert_online(
        &self,
        identity_id: &str,
        connection_id: Uuid,
        display_name: &str,
    ) -> Result<(), PersistenceError>;

    async fn remove_online(&self, identity_id: &str) -> Result<(), PersistenceError>;

    async fn list_online(&self) -> Result<Vec<OnlineRecord>, PersistenceError>;

    /// Delete registry rows not refreshed within `timeout_minutes`.
    ///
    /// Returns the number of rows removed.
    async fn sweep_stale(&self, timeout_minutes: u64) -> Result<u64, PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_wire_shape() {
        let message = ChatMessage {
            id: Uuid::nil(),
            sender_id: "u1".to_string(),
            content: "hello".to_string(),
            kind: MessageKind::Text,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["type"], "text");
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_message_kind_parsing() {
        assert_eq!("text".parse::<MessageKind>().unwrap(), MessageKind::Text);
        assert!("image".parse::<MessageKind>().is_err());
    }
}
