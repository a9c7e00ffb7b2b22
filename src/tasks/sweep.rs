use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::chat::ChatHub;
use crate::config::{PresenceConfig, WebSocketConfig};

/// Background task that pings every connection and evicts stale presence.
///
/// Runs for the process lifetime; stops on the shutdown broadcast.
pub struct PresenceSweepTask {
    presence: PresenceConfig,
    websocket: WebSocketConfig,
    hub: Arc<ChatHub>,
    shutdown: broadcast::Receiver<()>,
}

impl PresenceSweepTask {
    pub fn new(
        presence: PresenceConfig,
        websocket: WebSocketConfig,
        hub: Arc<ChatHub>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            presence,
            websocket,
            hub,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.websocket.heartbeat_interval.max(1));
        let sweep_interval = Duration::from_secs(self.presence.sweep_interval_seconds.max(1));
        let stale_timeout = Duration::from_secs(self.presence.stale_timeout_seconds);

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut sweep_timer = tokio::time::interval(sweep_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        sweep_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = heartbeat_interval.as_secs(),
            sweep_interval_secs = sweep_interval.as_secs(),
            stale_timeout_secs = stale_timeout.as_secs(),
            "Presence sweep task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Presence sweep task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats(heartbeat_interval).await;
                }
                _ = sweep_timer.tick() => {
                    self.hub.sweep(stale_timeout).await;
                }
            }
        }

        tracing::info!("Presence sweep task stopped");
    }

    async fn send_heartbeats(&self, interval: Duration) {
        if self.hub.room().is_empty() {
            return;
        }

        let start = Instant::now();
        let result = self.hub.heartbeat().await;
        let elapsed = start.elapsed();

        tracing::debug!(
            sent = result.delivered,
            failed = result.failed,
            elapsed_ms = elapsed.as_millis() as u64,
            "Heartbeat round completed"
        );

        if elapsed > interval / 2 {
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                heartbeat_interval_ms = interval.as_millis() as u64,
                connections = result.delivered + result.failed,
                "Heartbeat round took more than 50% of interval"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::config::ChatConfig;
    use crate::persistence::MemoryBackend;
    use crate::websocket::OutboundMessage;
    use tokio::sync::mpsc;

    fn hub() -> Arc<ChatHub> {
        Arc::new(ChatHub::new(
            Arc::new(MemoryBackend::new()),
            ChatConfig::default(),
            Duration::from_millis(100),
        ))
    }

    #[tokio::test]
    async fn test_sweep_task_shutdown() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = PresenceSweepTask::new(
            PresenceConfig::default(),
            WebSocketConfig::default(),
            hub(),
            shutdown_rx,
        );

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_pings_connections() {
        let websocket = WebSocketConfig {
            heartbeat_interval: 1,
            ..Default::default()
        };
        let hub = hub();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(16);
        let _handle = hub.connect(Identity::new("u1", "Alice", "admin"), tx).await;

        let task = PresenceSweepTask::new(PresenceConfig::default(), websocket, hub, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let ping = tokio::time::timeout(Duration::from_secs(3), async {
            while let Some(msg) = rx.recv().await {
                if matches!(msg, OutboundMessage::Ping) {
                    return true;
                }
            }
            false
        })
        .await
        .expect("Should receive a ping");
        assert!(ping);

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_periodic_sweep_evicts_idle_identity() {
        let presence = PresenceConfig {
            sweep_interval_seconds: 1,
            stale_timeout_seconds: 0,
        };
        let hub = hub();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, _rx) = mpsc::channel::<OutboundMessage>(16);
        let handle = hub.connect(Identity::new("u1", "Alice", "admin"), tx).await;

        let task = PresenceSweepTask::new(presence, WebSocketConfig::default(), hub.clone(), shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::timeout(Duration::from_secs(3), handle.evicted())
            .await
            .expect("idle connection should be evicted");
        assert!(!hub.presence().is_online("u1"));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }
}
