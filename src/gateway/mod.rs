//! Connection gateway: the authentication handshake in front of the room.
//!
//! A connection attempt is accepted or rejected here, before the WebSocket
//! upgrade, so a rejected attempt never touches presence or room state.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::{Identity, IdentityResolver, ResolveError};
use crate::metrics::HandshakeMetrics;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Missing authentication token")]
    MissingCredential,

    #[error("Invalid or expired token")]
    InvalidCredential(String),

    #[error("Role '{role}' is not allowed to join the chat")]
    Unauthorized { role: String },

    #[error("Identity resolver unavailable")]
    ResolverUnavailable(String),
}

impl HandshakeError {
    fn outcome(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential(_) => "invalid_credential",
            Self::Unauthorized { .. } => "unauthorized",
            Self::ResolverUnavailable(_) => "resolver_unavailable",
        }
    }
}

pub struct ConnectionGateway {
    resolver: Arc<dyn IdentityResolver>,
    allowed_role: String,
}

impl ConnectionGateway {
    pub fn new(resolver: Arc<dyn IdentityResolver>, allowed_role: impl Into<String>) -> Self {
        Self {
            resolver,
            allowed_role: allowed_role.into(),
        }
    }

    pub fn allowed_role(&self) -> &str {
        &self.allowed_role
    }

    /// Resolve a credential and check it against the chat access policy.
    #[tracing::instrument(name = "gateway.authenticate", skip_all)]
    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Identity, HandshakeError> {
        let result = self.check(credential).await;

        match &result {
            Ok(identity) => {
                HandshakeMetrics::record("accepted");
                tracing::debug!(identity_id = %identity.id, "Handshake accepted");
            }
            Err(e) => {
                HandshakeMetrics::record(e.outcome());
                tracing::warn!(reason = e.outcome(), error = %e, "Handshake rejected");
            }
        }

        result
    }

    async fn check(&self, credential: Option<&str>) -> Result<Identity, HandshakeError> {
        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(HandshakeError::MissingCredential)?;

        let identity = self
            .resolver
            .resolve(credential)
            .await
            .map_err(|e| match e {
                ResolveError::Invalid(msg) => HandshakeError::InvalidCredential(msg),
                ResolveError::Unavailable(msg) => HandshakeError::ResolverUnavailable(msg),
            })?;

        if identity.role != self.allowed_role {
            return Err(HandshakeError::Unauthorized {
                role: identity.role,
            });
        }

        Ok(identity)
    }
}
