use std::sync::Arc;

use crate::config::ChatConfig;
use crate::metrics::MessageMetrics;
use crate::persistence::{ChatMessage, MessageKind, PersistenceBackend};
use crate::room::{BroadcastRoom, ConnectionHandle, DeliveryResult};
use crate::websocket::ServerMessage;

use super::{ChatError, PageRequest};

/// One page of history as sent to the requester
#[derive(Debug, Clone)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
    pub request: PageRequest,
}

pub struct MessagingEngine {
    backend: Arc<dyn PersistenceBackend>,
    room: Arc<BroadcastRoom>,
    config: ChatConfig,
}

impl MessagingEngine {
    pub fn new(
        backend: Arc<dyn PersistenceBackend>,
        room: Arc<BroadcastRoom>,
        config: ChatConfig,
    ) -> Self {
        Self {
            backend,
            room,
            config,
        }
    }

    /// Trim and check message content. Length is counted in characters.
    pub fn validate<'a>(&self, content: &'a str) -> Result<&'a str, ChatError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyContent);
        }

        let length = trimmed.chars().count();
        if length > self.config.max_content_length {
            return Err(ChatError::ContentTooLong {
                max: self.config.max_content_length,
                actual: length,
            });
        }

        Ok(trimmed)
    }

    /// Validate, persist, then broadcast to the whole room including the sender.
    ///
    /// Nothing is broadcast unless the backend accepted the message.
    #[tracing::instrument(
        name = "chat.send_message",
        skip(self, handle, content),
        fields(connection_id = %handle.id, identity_id = %handle.identity_id())
    )]
    pub async fn send_message(
        &self,
        handle: &ConnectionHandle,
        content: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = self.validate(content).inspect_err(|e| {
            MessageMetrics::record_rejected(e.code());
        })?;

        let message = self
            .backend
            .append_message(handle.identity_id(), content, MessageKind::Text)
            .await
            .map_err(|e| {
                MessageMetrics::record_rejected("PERSIST_FAILED");
                tracing::error!(error = %e, "Failed to persist chat message");
                ChatError::PersistFailed(e)
            })?;

        MessageMetrics::record_persisted();

        let delivery = self
            .room
            .broadcast(
                &ServerMessage::NewMessage {
                    message: message.clone(),
                },
                None,
            )
            .await;

        tracing::debug!(
            message_id = %message.id,
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Chat message broadcast"
        );

        Ok(message)
    }

    /// Load a page of history, newest first, and reply to the requester only.
    ///
    /// One extra row is fetched so `has_more` is exact at page boundaries.
    #[tracing::instrument(
        name = "chat.get_messages",
        skip(self, handle),
        fields(connection_id = %handle.id)
    )]
    pub async fn get_messages(
        &self,
        handle: &ConnectionHandle,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<MessagePage, ChatError> {
        let request = PageRequest::clamp(limit, offset, &self.config);

        let mut messages = self
            .backend
            .query_messages(request.limit + 1, request.offset)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to query chat history");
                ChatError::QueryFailed(e)
            })?;

        let has_more = messages.len() > request.limit as usize;
        messages.truncate(request.limit as usize);

        let _ = handle
            .send(ServerMessage::Messages {
                messages: messages.clone(),
                has_more,
            })
            .await;

        Ok(MessagePage {
            messages,
            has_more,
            request,
        })
    }

    /// Relay a typing signal to everyone but the sender
    pub async fn typing(&self, handle: &ConnectionHandle) -> DeliveryResult {
        let message = ServerMessage::UserTyping {
            identity_id: handle.identity.id.clone(),
            display_name: handle.identity.display_name.clone(),
        };
        self.room.broadcast(&message, Some(handle.id)).await
    }

    pub async fn stop_typing(&self, handle: &ConnectionHandle) -> DeliveryResult {
        let message = ServerMessage::UserStoppedTyping {
            identity_id: handle.identity.id.clone(),
        };
        self.room.broadcast(&message, Some(handle.id)).await
    }
}
