mod claims;
mod identity;
mod jwt;
mod resolver;

pub use claims::Claims;
pub use identity::Identity;
pub use jwt::JwtValidator;
pub use resolver::{IdentityResolver, JwtIdentityResolver, ResolveError};
