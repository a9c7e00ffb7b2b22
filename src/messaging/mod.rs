//! Chat messaging: validation, persistence, fan-out, history and typing relay.

mod engine;
mod error;
mod pagination;

pub use engine::{MessagePage, MessagingEngine};
pub use error::ChatError;
pub use pagination::PageRequest;
