//! Connection handle and related types

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::auth::Identity;
use crate::websocket::{OutboundMessage, ServerMessage};

/// Handle for a single authenticated WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    /// Resolved at handshake; never changes afterwards
    pub identity: Identity,
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
    closed: AtomicBool,
    eviction: Notify,
}

impl ConnectionHandle {
    pub fn new(identity: Identity, sender: mpsc::Sender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            sender,
            connected_at: Utc::now(),
            closed: AtomicBool::new(false),
            eviction: Notify::new(),
        }
    }

    pub fn identity_id(&self) -> &str {
        &self.identity.id
    }

    /// Send a ServerMessage (will be serialized when sent to WebSocket).
    ///
    /// Sending to a closed connection is a no-op.
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        self.send_preserialized(OutboundMessage::Raw(message)).await
    }

    /// Send a pre-serialized message (for efficient multi-send scenarios)
    pub async fn send_preserialized(
        &self,
        message: OutboundMessage,
    ) -> Result<(), mpsc::error::SendError<OutboundMessage>> {
        if self.is_closed() {
            return Ok(());
        }
        self.sender.send(message).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the connection closed.
    ///
    /// Returns `true` only for the first caller, so cleanup runs once.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Ask the connection's tasks to terminate (forced eviction)
    pub fn evict(&self) {
        self.eviction.notify_one();
    }

    /// Resolves once `evict` has been called
    pub async fn evicted(&self) {
        self.eviction.notified().await;
    }
}
