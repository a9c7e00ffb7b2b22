use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::Identity;
use crate::metrics::PresenceMetrics;
use crate::persistence::{OnlineRecord, PersistenceBackend, PersistenceError};

use super::types::{JoinOutcome, LeaveOutcome, PresenceEntry};

/// Passes `mirror` makes before giving up on a row that keeps flipping
const MAX_MIRROR_PASSES: usize = 3;

/// In-memory view of who is online, mirrored to the persistence backend.
///
/// `join`, `leave` and `sweep` are synchronous: each change to an identity's
/// connection set happens under that identity's map entry lock, in one
/// step, and the returned outcome is final. Backend rows are brought in
/// line afterwards with `mirror`, which never decides presence itself.
pub struct PresenceRegistry {
    /// identity_id -> PresenceEntry
    entries: DashMap<String, PresenceEntry>,
    backend: Arc<dyn PersistenceBackend>,
}

impl PresenceRegistry {
    pub fn new(backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            entries: DashMap::new(),
            backend,
        }
    }

    /// Add a connection for an identity. Adding the same id twice is a no-op.
    pub fn join(&self, identity: &Identity, connection_id: Uuid) -> JoinOutcome {
        let outcome = match self.entries.entry(identity.id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.connections.insert(connection_id);
                entry.last_seen = Utc::now();
                JoinOutcome::AlreadyOnline {
                    connections: entry.connections.len(),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PresenceEntry::new(
                    identity.id.clone(),
                    identity.display_name.clone(),
                    connection_id,
                ));
                JoinOutcome::CameOnline
            }
        };

        if outcome == JoinOutcome::CameOnline {
            PresenceMetrics::record_online();
            tracing::info!(identity_id = %identity.id, "Identity came online");
        }

        outcome
    }

    /// Remove a connection. Removing an unknown id is a no-op.
    pub fn leave(&self, identity_id: &str, connection_id: Uuid) -> LeaveOutcome {
        let outcome = match self.entries.entry(identity_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get_mut().connections.remove(&connection_id) {
                    LeaveOutcome::NotPresent
                } else if occupied.get().connections.is_empty() {
                    LeaveOutcome::WentOffline(occupied.remove())
                } else {
                    LeaveOutcome::StillOnline {
                        connections: occupied.get().connections.len(),
                    }
                }
            }
            Entry::Vacant(_) => LeaveOutcome::NotPresent,
        };

        if let LeaveOutcome::WentOffline(_) = outcome {
            PresenceMetrics::record_offline();
            tracing::info!(identity_id = %identity_id, "Identity went offline");
        }

        outcome
    }

    /// Refresh an identity's last-seen time
    pub fn touch(&self, identity_id: &str) {
        if let Some(mut entry) = self.entries.get_mut(identity_id) {
            entry.last_seen = Utc::now();
        }
    }

    /// Evict entries whose last activity is older than `timeout`.
    ///
    /// Returns the removed entries; their connections are still registered
    /// elsewhere and must be closed by the caller.
    pub fn sweep(&self, timeout: Duration) -> Vec<PresenceEntry> {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::days(36500));
        let cutoff = Utc::now() - timeout;

        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().last_seen < cutoff)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for identity_id in stale {
            // Re-checked under the entry lock: activity since the scan wins
            if let Some((_, entry)) = self
                .entries
                .remove_if(&identity_id, |_, entry| entry.last_seen < cutoff)
            {
                PresenceMetrics::record_offline();
                tracing::info!(
                    identity_id = %entry.identity_id,
                    last_seen = %entry.last_seen,
                    connections = entry.connections.len(),
                    "Evicting stale presence entry"
                );
                removed.push(entry);
            }
        }

        if !removed.is_empty() {
            PresenceMetrics::record_evictions(removed.len() as u64);
        }

        removed
    }

    /// Bring the identity's backend row in line with the in-memory entry.
    ///
    /// The entry is read again after every write; if a join or leave landed
    /// while the write was in flight, the row is written again.
    #[tracing::instrument(name = "presence.mirror", skip(self))]
    pub async fn mirror(&self, identity_id: &str) {
        let mut expected = self.current_row(identity_id);

        for _ in 0..MAX_MIRROR_PASSES {
            let result = match &expected {
                Some((connection_id, display_name)) => self
                    .backend
                    .upsert_online(identity_id, *connection_id, display_name)
                    .await
                    .map_err(|e| ("upsert_online", e)),
                None => self
                    .backend
                    .remove_online(identity_id)
                    .await
                    .map_err(|e| ("remove_online", e)),
            };

            if let Err((operation, e)) = result {
                PresenceMetrics::record_backend_error(operation);
                tracing::warn!(identity_id = %identity_id, error = %e, "Failed to mirror presence");
                return;
            }

            let current = self.current_row(identity_id);
            if current.is_some() == expected.is_some() {
                return;
            }
            expected = current;
        }

        tracing::warn!(identity_id = %identity_id, "Presence kept changing while mirroring");
    }

    /// Refresh backend rows for every online identity, then let the backend
    /// drop rows older than `timeout`. Returns the backend's removed count.
    ///
    /// Individual refresh failures are logged and skipped.
    pub async fn sync_backend(&self, timeout: Duration) -> Result<u64, PersistenceError> {
        let live: Vec<(String, Uuid, String)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let e = entry.value();
                e.connections
                    .iter()
                    .next()
                    .map(|conn| (e.identity_id.clone(), *conn, e.display_name.clone()))
            })
            .collect();

        for (identity_id, connection_id, display_name) in live {
            if let Err(e) = self
                .backend
                .upsert_online(&identity_id, connection_id, &display_name)
                .await
            {
                PresenceMetrics::record_backend_error("refresh_online");
                tracing::warn!(identity_id = %identity_id, error = %e, "Failed to refresh online row");
            }
        }

        let minutes = timeout.as_secs().div_ceil(60).max(1);
        self.backend.sweep_stale(minutes).await
    }

    /// Current online set, unordered
    pub fn snapshot(&self) -> Vec<OnlineRecord> {
        self.entries.iter().map(|entry| entry.value().record()).collect()
    }

    pub fn is_online(&self, identity_id: &str) -> bool {
        self.entries.contains_key(identity_id)
    }

    pub fn connection_count(&self, identity_id: &str) -> usize {
        self.entries
            .get(identity_id)
            .map(|entry| entry.connections.len())
            .unwrap_or(0)
    }

    pub fn last_seen(&self, identity_id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(identity_id).map(|entry| entry.last_seen)
    }

    /// Number of online identities
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn current_row(&self, identity_id: &str) -> Option<(Uuid, String)> {
        self.entries.get(identity_id).and_then(|entry| {
            entry
                .connections
                .iter()
                .next()
                .map(|conn| (*conn, entry.display_name.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{ChatMessage, MemoryBackend, MessageKind};
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn registry() -> (PresenceRegistry, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (PresenceRegistry::new(backend.clone()), backend)
    }

    fn alice() -> Identity {
        Identity::new("alice", "Alice", "admin")
    }

    #[tokio::test]
    async fn test_first_join_transitions_online() {
        let (registry, backend) = registry();
        let conn = Uuid::new_v4();

        assert_eq!(registry.join(&alice(), conn), JoinOutcome::CameOnline);
        assert!(registry.is_online("alice"));

        registry.mirror("alice").await;
        assert_eq!(backend.online_connection("alice"), Some(conn));
    }

    #[test]
    fn test_join_is_idempotent() {
        let (registry, _) = registry();
        let conn = Uuid::new_v4();

        registry.join(&alice(), conn);
        assert_eq!(
            registry.join(&alice(), conn),
            JoinOutcome::AlreadyOnline { connections: 1 }
        );
        assert_eq!(registry.connection_count("alice"), 1);
    }

    #[tokio::test]
    async fn test_reference_counted_leave() {
        let (registry, backend) = registry();
        let (c1, c2) = (Uuid::new_v4(), Uuid::new_v4());

        registry.join(&alice(), c1);
        assert_eq!(
            registry.join(&alice(), c2),
            JoinOutcome::AlreadyOnline { connections: 2 }
        );
        registry.mirror("alice").await;

        assert_eq!(
            registry.leave("alice", c1),
            LeaveOutcome::StillOnline { connections: 1 }
        );
        registry.mirror("alice").await;
        assert!(registry.is_online("alice"));
        assert_eq!(backend.list_online().await.unwrap().len(), 1);

        assert!(matches!(registry.leave("alice", c2), LeaveOutcome::WentOffline(_)));
        registry.mirror("alice").await;
        assert!(!registry.is_online("alice"));
        assert!(backend.list_online().await.unwrap().is_empty());
    }

    #[test]
    fn test_leave_is_idempotent() {
        let (registry, _) = registry();
        let conn = Uuid::new_v4();

        registry.join(&alice(), conn);
        assert!(matches!(registry.leave("alice", conn), LeaveOutcome::WentOffline(_)));
        assert_eq!(registry.leave("alice", conn), LeaveOutcome::NotPresent);
        assert_eq!(registry.leave("nobody", conn), LeaveOutcome::NotPresent);
    }

    #[test]
    fn test_leave_with_unknown_connection_keeps_entry() {
        let (registry, _) = registry();
        registry.join(&alice(), Uuid::new_v4());

        assert_eq!(registry.leave("alice", Uuid::new_v4()), LeaveOutcome::NotPresent);
        assert!(registry.is_online("alice"));
    }

    #[test]
    fn test_online_iff_live_connections() {
        let (registry, _) = registry();
        let conns: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        // Interleaved joins and leaves; online must track the live count
        let mut live = 0usize;
        for (i, conn) in conns.iter().enumerate() {
            registry.join(&alice(), *conn);
            live += 1;
            if i % 2 == 1 {
                registry.leave("alice", conns[i - 1]);
                live -= 1;
            }
            assert_eq!(registry.connection_count("alice"), live);
            assert_eq!(registry.is_online("alice"), live > 0);
        }
        for conn in &conns {
            registry.leave("alice", *conn);
        }
        assert!(!registry.is_online("alice"));
    }

    #[tokio::test]
    async fn test_sweep_only_removes_stale_entries() {
        let (registry, _) = registry();
        registry.join(&alice(), Uuid::new_v4());
        tokio::time::sleep(Duration::from_millis(300)).await;
        registry.join(&Identity::new("bob", "Bob", "admin"), Uuid::new_v4());

        let removed = registry.sweep(Duration::from_millis(200));

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].identity_id, "alice");
        assert!(!registry.is_online("alice"));
        assert!(registry.is_online("bob"));
    }

    #[tokio::test]
    async fn test_touch_keeps_entry_fresh() {
        let (registry, _) = registry();
        registry.join(&alice(), Uuid::new_v4());
        tokio::time::sleep(Duration::from_millis(300)).await;
        registry.touch("alice");

        assert!(registry.sweep(Duration::from_millis(200)).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_with_no_entries() {
        let (registry, _) = registry();
        assert!(registry.sweep(Duration::from_secs(900)).is_empty());
        assert_eq!(registry.sync_backend(Duration::from_secs(900)).await.unwrap(), 0);
    }

    #[test]
    fn test_snapshot_lists_identities_once() {
        let (registry, _) = registry();
        registry.join(&alice(), Uuid::new_v4());
        registry.join(&alice(), Uuid::new_v4());
        registry.join(&Identity::new("bob", "Bob", "admin"), Uuid::new_v4());

        let mut snapshot = registry.snapshot();
        snapshot.sort_by(|a, b| a.identity_id.cmp(&b.identity_id));
        assert_eq!(
            snapshot,
            vec![
                OnlineRecord {
                    identity_id: "alice".into(),
                    display_name: "Alice".into()
                },
                OnlineRecord {
                    identity_id: "bob".into(),
                    display_name: "Bob".into()
                },
            ]
        );
    }

    /// Backend whose `remove_online` parks until released
    struct GatedBackend {
        inner: MemoryBackend,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PersistenceBackend for GatedBackend {
        fn backend_type(&self) -> &'static str {
            "gated"
        }

        async fn append_message(
            &self,
            sender_id: &str,
            content: &str,
            kind: MessageKind,
        ) -> Result<ChatMessage, PersistenceError> {
            self.inner.append_message(sender_id, content, kind).await
        }

        async fn query_messages(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, PersistenceError> {
            self.inner.query_messages(limit, offset).await
        }

        async fn upsert_online(
            &self,
            identity_id: &str,
            connection_id: Uuid,
            display_name: &str,
        ) -> Result<(), PersistenceError> {
            self.inner.upsert_online(identity_id, connection_id, display_name).await
        }

        async fn remove_online(&self, identity_id: &str) -> Result<(), PersistenceError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.remove_online(identity_id).await
        }

        async fn list_online(&self) -> Result<Vec<OnlineRecord>, PersistenceError> {
            self.inner.list_online().await
        }

        async fn sweep_stale(&self, timeout_minutes: u64) -> Result<u64, PersistenceError> {
            self.inner.sweep_stale(timeout_minutes).await
        }
    }

    #[tokio::test]
    async fn test_mirror_rewrites_row_when_rejoined_mid_write() {
        let backend = Arc::new(GatedBackend {
            inner: MemoryBackend::new(),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let registry = Arc::new(PresenceRegistry::new(backend.clone()));
        let first = Uuid::new_v4();
        registry.join(&alice(), first);
        registry.mirror("alice").await;

        registry.leave("alice", first);
        let pending = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.mirror("alice").await })
        };

        // Rejoin while the delete is parked in the backend
        backend.entered.notified().await;
        let second = Uuid::new_v4();
        registry.join(&alice(), second);
        backend.release.notify_one();
        pending.await.unwrap();

        assert_eq!(backend.inner.online_connection("alice"), Some(second));
    }
}
