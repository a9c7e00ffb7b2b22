use async_trait::async_trait;
use thiserror::Error;

use crate::config::JwtConfig;

use super::{Identity, JwtValidator};

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The credential is malformed, expired, or signed with the wrong key
    #[error("Invalid credential: {0}")]
    Invalid(String),

    /// The resolver could not be reached or failed internally
    #[error("Identity resolver unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a bearer credential to an identity.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Identity, ResolveError>;
}

/// Resolver backed by locally verified JWTs.
pub struct JwtIdentityResolver {
    validator: JwtValidator,
}

impl JwtIdentityResolver {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            validator: JwtValidator::new(config),
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<Identity, ResolveError> {
        let claims = self.validator.validate(credential)?;
        Ok(Identity::from(&claims))
    }
}
