use serde::{Deserialize, Serialize};

use super::Claims;

/// Authenticated principal behind one or more connections.
///
/// Resolved once during the handshake and attached read-only to the
/// connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: String,
    pub role: String,
}

impl Identity {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role: role.into(),
        }
    }
}

impl From<&Claims> for Identity {
    fn from(claims: &Claims) -> Self {
        Self::new(claims.user_id(), claims.display_name(), claims.role())
    }
}
