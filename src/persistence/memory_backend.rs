//! In-memory persistence backend.
//!
//! Messages live in an append-only vector and the online registry in a
//! `DashMap`. Everything is lost on service restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::backend::{ChatMessage, MessageKind, OnlineRecord, PersistenceBackend, PersistenceError};

struct OnlineRow {
    connection_id: Uuid,
    display_name: String,
    last_seen: DateTime<Utc>,
}

pub struct MemoryBackend {
    /// Messages in creation order
    messages: RwLock<Vec<ChatMessage>>,
    /// identity_id -> registry row
    online: DashMap<String, OnlineRow>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
            online: DashMap::new(),
        }
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Connection id recorded for an identity's registry row
    pub fn online_connection(&self, identity_id: &str) -> Option<Uuid> {
        self.online.get(identity_id).map(|row| row.connection_id)
    }

    #[cfg(test)]
    fn backdate_online(&self, identity_id: &str, age: Duration) {
        if let Some(mut row) = self.online.get_mut(identity_id) {
            row.last_seen = Utc::now() - age;
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceBackend for MemoryBackend {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn append_message(
        &self,
        sender_id: &str,
        content: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, PersistenceError> {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind,
            created_at: Utc::now(),
        };

        self.messages.write().await.push(message.clone());

        tracing::trace!(message_id = %message.id, sender_id = %sender_id, "Message appended");

        Ok(message)
    }

    async fn query_messages(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatMessage>, PersistenceError> {
        let messages = self.messages.read().await;

        Ok(messages
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn upsert_online(
        &self,
        identity_id: &str,
        connection_id: Uuid,
        display_name: &str,
    ) -> Result<(), PersistenceError> {
        self.online.insert(
            identity_id.to_string(),
            OnlineRow {
                connection_id,
                display_name: display_name.to_string(),
                last_seen: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove_online(&self, identity_id: &str) -> Result<(), PersistenceError> {
        self.online.remove(identity_id);
        Ok(())
    }

    async fn list_online(&self) -> Result<Vec<OnlineRecord>, PersistenceError> {
        Ok(self
            .online
            .iter()
            .map(|entry| OnlineRecord {
                identity_id: entry.key().clone(),
                display_name: entry.value().display_name.clone(),
            })
            .collect())
    }

    async fn sweep_stale(&self, timeout_minutes: u64) -> Result<u64, PersistenceError> {
        let cutoff = Utc::now() - Duration::minutes(timeout_minutes as i64);
        let before = self.online.len();
        self.online.retain(|_, row| row.last_seen >= cutoff);
        Ok(before.saturating_sub(self.online.len()) as u64)
    }
}
