use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};

use crate::auth::Identity;
use crate::config::ChatConfig;
use crate::messaging::{ChatError, MessagingEngine};
use crate::metrics::PresenceMetrics;
use crate::persistence::PersistenceBackend;
use crate::presence::{JoinOutcome, LeaveOutcome, PresenceEntry, PresenceRegistry};
use crate::room::{BroadcastRoom, ConnectionHandle, DeliveryResult};
use crate::websocket::{ClientMessage, OutboundMessage, ServerMessage};

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub online_identities: usize,
}

/// Result of one stale-presence sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub evicted_identities: usize,
    pub closed_connections: usize,
    /// Rows removed by the backend; `None` when the backend sweep failed
    pub backend_removed: Option<u64>,
}

pub struct ChatHub {
    room: Arc<BroadcastRoom>,
    presence: Arc<PresenceRegistry>,
    messaging: MessagingEngine,
    /// Held while a presence transition is applied and announced, so
    /// announcements reach the room in transition order
    presence_gate: Mutex<()>,
}

impl ChatHub {
    pub fn new(backend: Arc<dyn PersistenceBackend>, chat: ChatConfig, send_timeout: Duration) -> Self {
        let room = Arc::new(BroadcastRoom::new(send_timeout));
        let presence = Arc::new(PresenceRegistry::new(backend.clone()));
        let messaging = MessagingEngine::new(backend, room.clone(), chat);

        Self {
            room,
            presence,
            messaging,
            presence_gate: Mutex::new(()),
        }
    }

    pub fn room(&self) -> &Arc<BroadcastRoom> {
        &self.room
    }

    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Register an authenticated connection.
    ///
    /// The new connection always receives the online snapshot; the room
    /// hears `userConnected` only when this is the identity's first connection.
    #[tracing::instrument(
        name = "chat.connect",
        skip(self, identity, sender),
        fields(identity_id = %identity.id)
    )]
    pub async fn connect(
        &self,
        identity: Identity,
        sender: mpsc::Sender<OutboundMessage>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(identity, sender));

        let outcome = {
            let _gate = self.presence_gate.lock().await;
            self.room.join(handle.clone());
            let outcome = self.presence.join(&handle.identity, handle.id);

            let snapshot = ServerMessage::OnlineUsers {
                users: self.presence.snapshot(),
            };
            self.room.send_to(handle.id, snapshot).await;

            if outcome == JoinOutcome::CameOnline {
                self.room
                    .broadcast(
                        &ServerMessage::UserConnected {
                            identity_id: handle.identity.id.clone(),
                            display_name: handle.identity.display_name.clone(),
                            connected_at: handle.connected_at,
                        },
                        None,
                    )
                    .await;
            }
            outcome
        };

        self.presence.mirror(handle.identity_id()).await;

        tracing::info!(
            connection_id = %handle.id,
            outcome = ?outcome,
            "Connection joined chat"
        );

        handle
    }

    /// Tear down a connection. Runs at most once per connection; a
    /// connection already evicted by the sweep is left alone.
    #[tracing::instrument(
        name = "chat.disconnect",
        skip(self, handle),
        fields(connection_id = %handle.id, identity_id = %handle.identity_id())
    )]
    pub async fn disconnect(&self, handle: &ConnectionHandle) {
        if !handle.mark_closed() {
            return;
        }

        let outcome = {
            let _gate = self.presence_gate.lock().await;
            self.room.leave(handle.id);
            let outcome = self.presence.leave(handle.identity_id(), handle.id);
            if let LeaveOutcome::WentOffline(entry) = &outcome {
                self.announce_offline(entry).await;
            }
            outcome
        };

        match outcome {
            LeaveOutcome::NotPresent => return,
            LeaveOutcome::StillOnline { connections } => {
                tracing::debug!(remaining = connections, "Identity still online");
            }
            LeaveOutcome::WentOffline(_) => {}
        }

        self.presence.mirror(handle.identity_id()).await;
    }

    /// Record inbound activity for the connection's identity
    pub fn touch(&self, handle: &ConnectionHandle) {
        self.presence.touch(handle.identity_id());
    }

    /// Handle one inbound event. Errors, including panics in the handler,
    /// are reported to the originating connection only.
    #[tracing::instrument(
        name = "chat.event",
        skip(self, handle, event),
        fields(connection_id = %handle.id, event = event.kind())
    )]
    pub async fn handle_event(&self, handle: &ConnectionHandle, event: ClientMessage) {
        self.touch(handle);

        let result = match AssertUnwindSafe(self.dispatch(handle, event))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(panic = %detail, "Event handler panicked");
                Err(ChatError::Internal(detail))
            }
        };

        if let Err(e) = result {
            tracing::debug!(code = e.code(), error = %e, "Event rejected");
            let _ = handle
                .send(ServerMessage::error(e.code(), e.client_message()))
                .await;
        }
    }

    async fn dispatch(&self, handle: &ConnectionHandle, event: ClientMessage) -> Result<(), ChatError> {
        match event {
            ClientMessage::SendMessage { content } => {
                self.messaging.send_message(handle, &content).await?;
            }
            ClientMessage::GetMessages { limit, offset } => {
                self.messaging.get_messages(handle, limit, offset).await?;
            }
            ClientMessage::Typing => {
                self.messaging.typing(handle).await;
            }
            ClientMessage::StopTyping => {
                self.messaging.stop_typing(handle).await;
            }
            ClientMessage::Ping => {
                let _ = handle.send(ServerMessage::Pong).await;
            }
        }
        Ok(())
    }

    /// Evict identities idle for longer than `timeout`, close their
    /// connections, then let the backend drop its own stale rows.
    pub async fn sweep(&self, timeout: Duration) -> SweepReport {
        let gate = self.presence_gate.lock().await;
        let removed = self.presence.sweep(timeout);
        let mut report = SweepReport {
            evicted_identities: removed.len(),
            ..Default::default()
        };

        for entry in &removed {
            for connection_id in &entry.connections {
                if let Some(handle) = self.room.leave(*connection_id) {
                    handle.mark_closed();
                    handle.evict();
                    report.closed_connections += 1;
                }
            }
            self.announce_offline(entry).await;
        }
        drop(gate);

        for entry in &removed {
            self.presence.mirror(&entry.identity_id).await;
        }

        match self.presence.sync_backend(timeout).await {
            Ok(count) => report.backend_removed = Some(count),
            Err(e) => {
                PresenceMetrics::record_backend_error("sweep_stale");
                tracing::warn!(error = %e, "Backend stale sweep failed");
            }
        }

        if report.evicted_identities > 0 || report.backend_removed.unwrap_or(0) > 0 {
            tracing::info!(
                evicted = report.evicted_identities,
                closed = report.closed_connections,
                backend_removed = ?report.backend_removed,
                "Stale presence sweep completed"
            );
        }

        report
    }

    /// Transport-level ping to every live connection
    pub async fn heartbeat(&self) -> DeliveryResult {
        self.room.ping_all().await
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.room.len(),
            online_identities: self.presence.len(),
        }
    }

    async fn announce_offline(&self, entry: &PresenceEntry) {
        self.room
            .broadcast(
                &ServerMessage::UserDisconnected {
                    identity_id: entry.identity_id.clone(),
                    display_name: entry.display_name.clone(),
                    disconnected_at: Utc::now(),
                },
                None,
            )
            .await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
