use thiserror::Error;

use crate::persistence::PersistenceError;

/// Errors reported back to the originating connection only.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message content cannot be empty")]
    EmptyContent,

    #[error("Message content exceeds {max} characters ({actual})")]
    ContentTooLong { max: usize, actual: usize },

    #[error("Failed to persist message: {0}")]
    PersistFailed(#[source] PersistenceError),

    #[error("Failed to load messages: {0}")]
    QueryFailed(#[source] PersistenceError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            Self::PersistFailed(_) => "PERSIST_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show the client; backend and internal detail stays in the logs
    pub fn client_message(&self) -> String {
        match self {
            Self::EmptyContent | Self::ContentTooLong { .. } => self.to_string(),
            Self::PersistFailed(_) => "Failed to send message".to_string(),
            Self::QueryFailed(_) => "Failed to load messages".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detail_is_not_leaked() {
        let err = ChatError::PersistFailed(PersistenceError::Unavailable(
            "connection refused to 10.0.0.5".into(),
        ));
        assert_eq!(err.code(), "PERSIST_FAILED");
        assert!(!err.client_message().contains("10.0.0.5"));
        assert!(err.to_string().contains("10.0.0.5"));
    }

    #[test]
    fn test_validation_message_is_descriptive() {
        let err = ChatError::ContentTooLong {
            max: 1000,
            actual: 1001,
        };
        assert_eq!(err.code(), "CONTENT_TOO_LONG");
        assert!(err.client_message().contains("1000"));
    }
}
