use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (identity ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Display name shown to other room members
    #[serde(default)]
    pub name: Option<String>,
    /// Role used for the chat access check
    #[serde(default)]
    pub role: Option<String>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    pub fn user_id(&self) -> &str {
        &self.sub
    }

    /// Display name, falling back to the subject when the token carries none
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.sub)
    }

    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(name: Option<&str>, role: Option<&str>) -> Claims {
        Claims {
            sub: "user-1".to_string(),
            exp: chrono::Utc::now().timestamp() + 60,
            iat: chrono::Utc::now().timestamp(),
            name: name.map(str::to_string),
            role: role.map(str::to_string),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_display_name_falls_back_to_subject() {
        assert_eq!(claims(Some("Alice"), None).display_name(), "Alice");
        assert_eq!(claims(None, None).display_name(), "user-1");
    }

    #[test]
    fn test_role_defaults_to_empty() {
        assert_eq!(claims(None, Some("admin")).role(), "admin");
        assert_eq!(claims(None, None).role(), "");
    }
}
