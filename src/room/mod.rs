//! The broadcast room: the single shared scope every live connection belongs to.
//!
//! Membership is the set of registered connection handles; there is no
//! separate membership list to keep in sync.

mod handle;
mod broadcast;

pub use handle::ConnectionHandle;
pub use broadcast::{BroadcastRoom, DeliveryResult};
