use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::timeout;
use uuid::Uuid;

use crate::metrics::DeliveryMetrics;
use crate::websocket::{OutboundMessage, ServerMessage};

use super::ConnectionHandle;

/// Outcome of a fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    /// Connections whose buffer accepted the frame
    pub delivered: usize,
    /// Connections that were closed or did not accept the frame in time
    pub failed: usize,
}

/// The single shared room; members are exactly the live connections.
pub struct BroadcastRoom {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    send_timeout: Duration,
}

impl BroadcastRoom {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            connections: DashMap::new(),
            send_timeout,
        }
    }

    /// Add a live connection to the room
    pub fn join(&self, handle: Arc<ConnectionHandle>) {
        tracing::debug!(connection_id = %handle.id, identity_id = %handle.identity_id(), "Joined room");
        self.connections.insert(handle.id, handle);
    }

    /// Remove a connection; returns its handle if it was a member
    pub fn leave(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        let removed = self.connections.remove(&connection_id).map(|(_, h)| h);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Left room");
        }
        removed
    }

    pub fn contains(&self, connection_id: Uuid) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    pub fn members(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Deliver to every live member except `exclude`.
    ///
    /// The frame is serialized once. Sends run concurrently and each is bounded
    /// by the send timeout; the call returns after every member was attempted, so
    /// two broadcasts issued in sequence reach each member in that order.
    #[tracing::instrument(
        name = "room.broadcast",
        skip(self, message),
        fields(event = message.kind(), exclude = ?exclude)
    )]
    pub async fn broadcast(&self, message: &ServerMessage, exclude: Option<Uuid>) -> DeliveryResult {
        let targets: Vec<_> = self
            .connections
            .iter()
            .filter(|entry| Some(*entry.key()) != exclude)
            .map(|entry| entry.value().clone())
            .collect();

        if targets.is_empty() {
            return DeliveryResult::default();
        }

        let outbound = match OutboundMessage::preserialize(message) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize broadcast");
                return DeliveryResult {
                    delivered: 0,
                    failed: targets.len(),
                };
            }
        };

        let result = self.deliver(&targets, outbound).await;

        tracing::debug!(delivered = result.delivered, failed = result.failed, "Broadcast completed");

        result
    }

    /// Unicast to one member; returns whether the frame was accepted
    pub async fn send_to(&self, connection_id: Uuid, message: ServerMessage) -> bool {
        let Some(handle) = self.get(connection_id) else {
            tracing::debug!(connection_id = %connection_id, "Unicast target is not in the room");
            return false;
        };

        self.deliver(&[handle], OutboundMessage::Raw(message))
            .await
            .delivered
            == 1
    }

    /// Send a transport ping to every member
    pub async fn ping_all(&self) -> DeliveryResult {
        let targets = self.members();
        self.deliver(&targets, OutboundMessage::Ping).await
    }

    async fn deliver(&self, targets: &[Arc<ConnectionHandle>], outbound: OutboundMessage) -> DeliveryResult {
        let sends = targets.iter().map(|handle| {
            let outbound = outbound.clone();
            async move {
                if handle.is_closed() {
                    return false;
                }
                match timeout(self.send_timeout, handle.send_preserialized(outbound)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(_)) => {
                        tracing::debug!(connection_id = %handle.id, "Connection closed during send");
                        false
                    }
                    Err(_) => {
                        tracing::debug!(
                            connection_id = %handle.id,
                            timeout_ms = self.send_timeout.as_millis() as u64,
                            "Send timed out, frame dropped"
                        );
                        false
                    }
                }
            }
        });

        let outcomes = join_all(sends).await;
        let delivered = outcomes.iter().filter(|ok| **ok).count();
        let failed = outcomes.len() - delivered;

        DeliveryMetrics::record(delivered as u64, failed as u64);

        DeliveryResult { delivered, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use tokio::sync::mpsc;

    fn member(
        room: &BroadcastRoom,
        id: &str,
        buffer: usize,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = Arc::new(ConnectionHandle::new(Identity::new(id, id, "admin"), tx));
        room.join(handle.clone());
        (handle, rx)
    }

    fn room() -> BroadcastRoom {
        BroadcastRoom::new(Duration::from_millis(50))
    }

    fn decode(msg: OutboundMessage) -> ServerMessage {
        let text = msg.to_json().expect("data frame").expect("valid json");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let room = room();
        let (a, mut rx_a) = member(&room, "a", 8);
        let (_b, mut rx_b) = member(&room, "b", 8);

        let result = room.broadcast(&ServerMessage::Pong, Some(a.id)).await;

        assert_eq!(result, DeliveryResult { delivered: 1, failed: 0 });
        assert_eq!(decode(rx_b.try_recv().unwrap()), ServerMessage::Pong);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order_per_member() {
        let room = room();
        let (_a, mut rx_a) = member(&room, "a", 8);
        let (_b, mut rx_b) = member(&room, "b", 8);

        let first = ServerMessage::error("FIRST", "1");
        let second = ServerMessage::error("SECOND", "2");
        room.broadcast(&first, None).await;
        room.broadcast(&second, None).await;

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(decode(rx.try_recv().unwrap()), first);
            assert_eq!(decode(rx.try_recv().unwrap()), second);
        }
    }

    #[tokio::test]
    async fn test_slow_member_does_not_block_others() {
        let room = room();
        let (_slow, _rx_slow) = member(&room, "slow", 1);
        let (_fast, mut rx_fast) = member(&room, "fast", 8);

        room.broadcast(&ServerMessage::Pong, None).await;
        let result = room.broadcast(&ServerMessage::Pong, None).await;

        assert_eq!(result, DeliveryResult { delivered: 1, failed: 1 });
        assert!(rx_fast.try_recv().is_ok());
        assert!(rx_fast.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_departed_member_gets_nothing() {
        let room = room();
        let (a, mut rx_a) = member(&room, "a", 8);
        room.leave(a.id);

        assert!(!room.contains(a.id));
        assert_eq!(room.broadcast(&ServerMessage::Pong, None).await, DeliveryResult::default());
        assert!(!room.send_to(a.id, ServerMessage::Pong).await);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unicasts() {
        let room = room();
        let (a, mut rx_a) = member(&room, "a", 8);
        let (_b, mut rx_b) = member(&room, "b", 8);

        assert!(room.send_to(a.id, ServerMessage::Pong).await);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }
}
