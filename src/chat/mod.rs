//! The chat hub: one shared room, presence, and the messaging engine wired
//! together behind the operations a connection task needs.

mod hub;

pub use hub::{ChatHub, HubStats, SweepReport};
