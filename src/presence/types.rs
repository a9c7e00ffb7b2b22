use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::persistence::OnlineRecord;

/// Presence state for one online identity. Never exists with zero connections.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    pub identity_id: String,
    pub display_name: String,
    pub connections: HashSet<Uuid>,
    pub last_seen: DateTime<Utc>,
}

impl PresenceEntry {
    pub(super) fn new(identity_id: String, display_name: String, connection_id: Uuid) -> Self {
        Self {
            identity_id,
            display_name,
            connections: HashSet::from([connection_id]),
            last_seen: Utc::now(),
        }
    }

    pub fn record(&self) -> OnlineRecord {
        OnlineRecord {
            identity_id: self.identity_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// OFFLINE -> ONLINE
    CameOnline,
    /// Another connection for an identity that was already online
    AlreadyOnline { connections: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// ONLINE -> OFFLINE; carries the removed entry
    WentOffline(PresenceEntry),
    StillOnline { connections: usize },
    /// Unknown identity or connection id (already left or swept)
    NotPresent,
}

impl PartialEq for PresenceEntry {
    fn eq(&self, other: &Self) -> bool {
        self.identity_id == other.identity_id && self.connections == other.connections
    }
}

impl Eq for PresenceEntry {}
