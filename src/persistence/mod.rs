//! Persistence backends for chat history and the online-user registry.
//!
//! - `memory`: in-process storage, lost on restart (default, used by tests)
//! - `postgres`: durable storage through `sqlx`

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;

pub use backend::{ChatMessage, MessageKind, OnlineRecord, PersistenceBackend, PersistenceError};
pub use factory::create_persistence_backend;
pub use memory_backend::MemoryBackend;
pub use postgres_backend::PostgresBackend;
