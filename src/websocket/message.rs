use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::{ChatMessage, OnlineRecord};

/// Events sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    SendMessage {
        content: String,
    },
    /// Signed so that negative values can be clamped instead of rejected
    GetMessages {
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: Option<i64>,
    },
    Typing,
    StopTyping,
    Ping,
}

impl ClientMessage {
    /// Event name used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "sendMessage",
            Self::GetMessages { .. } => "getMessages",
            Self::Typing => "typing",
            Self::StopTyping => "stopTyping",
            Self::Ping => "ping",
        }
    }
}

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    OnlineUsers {
        users: Vec<OnlineRecord>,
    },
    #[serde(rename_all = "camelCase")]
    UserConnected {
        identity_id: String,
        display_name: String,
        connected_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserDisconnected {
        identity_id: String,
        display_name: String,
        disconnected_at: DateTime<Utc>,
    },
    NewMessage {
        message: ChatMessage,
    },
    #[serde(rename_all = "camelCase")]
    Messages {
        messages: Vec<ChatMessage>,
        has_more: bool,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping {
        identity_id: String,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserStoppedTyping {
        identity_id: String,
    },
    Pong,
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Event name, matching the serialized `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OnlineUsers { .. } => "onlineUsers",
            Self::UserConnected { .. } => "userConnected",
            Self::UserDisconnected { .. } => "userDisconnected",
            Self::NewMessage { .. } => "newMessage",
            Self::Messages { .. } => "messages",
            Self::UserTyping { .. } => "userTyping",
            Self::UserStoppedTyping { .. } => "userStoppedTyping",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }
}

/// What a connection's send task writes to the socket
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Serialized by the send task
    Raw(ServerMessage),
    /// Serialized once and shared by every recipient of a broadcast
    Preserialized(Arc<str>),
    /// Transport-level ping; live clients answer with a pong frame
    Ping,
}

impl OutboundMessage {
    pub fn preserialize(message: &ServerMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::Preserialized(Arc::from(serde_json::to_string(message)?)))
    }

    /// JSON text for data frames; `None` for control frames
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            Self::Raw(message) => Some(serde_json::to_string(message)),
            Self::Preserialized(text) => Some(Ok(text.to_string())),
            Self::Ping => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_events() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "sendMessage", "content": "hi"})).unwrap();
        assert!(matches!(msg, ClientMessage::SendMessage { ref content } if content == "hi"));

        let msg: ClientMessage = serde_json::from_value(json!({"type": "getMessages"})).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GetMessages {
                limit: None,
                offset: None
            }
        ));

        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "getMessages", "limit": 500, "offset": -3}))
                .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::GetMessages {
                limit: Some(500),
                offset: Some(-3)
            }
        ));

        let msg: ClientMessage = serde_json::from_value(json!({"type": "stopTyping"})).unwrap();
        assert_eq!(msg.kind(), "stopTyping");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "subscribe"})).is_err());
    }

    #[test]
    fn test_server_event_wire_names() {
        let msg = ServerMessage::UserTyping {
            identity_id: "u1".into(),
            display_name: "Alice".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "userTyping", "identityId": "u1", "displayName": "Alice"}));

        let json = serde_json::to_value(ServerMessage::Messages {
            messages: vec![],
            has_more: false,
        })
        .unwrap();
        assert_eq!(json, json!({"type": "messages", "messages": [], "hasMore": false}));
    }

    #[test]
    fn test_preserialized_matches_raw() {
        let msg = ServerMessage::error("EMPTY_CONTENT", "Message content cannot be empty");
        let raw = OutboundMessage::Raw(msg.clone()).to_json().unwrap().unwrap();
        let pre = OutboundMessage::preserialize(&msg)
            .unwrap()
            .to_json()
            .unwrap()
            .unwrap();
        assert_eq!(raw, pre);
        assert!(OutboundMessage::Ping.to_json().is_none());
    }
}
