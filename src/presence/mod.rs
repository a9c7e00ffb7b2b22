//! Presence tracking for connected identities.
//!
//! Presence is reference counted over live connection ids: an identity is
//! ONLINE while it holds at least one connection and goes OFFLINE only when
//! the last one leaves or the entry is swept as stale.

mod registry;
mod types;

pub use registry::PresenceRegistry;
pub use types::{JoinOutcome, LeaveOutcome, PresenceEntry};
