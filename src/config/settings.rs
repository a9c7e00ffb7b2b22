use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub otel: OtelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Messaging rules and the access policy for the chat room
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// The single role allowed to join the room
    #[serde(default = "default_allowed_role")]
    pub allowed_role: String,
    /// Maximum message length in characters, measured after trimming
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// How often the stale-presence sweep runs, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Entries with no activity for longer than this are evicted, in seconds
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Interval in seconds between transport pings to every connection
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Upper bound on a single outbound send before it is dropped
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Per-connection outbound buffer
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// "memory" or "postgres"
    #[serde(default = "default_persistence_backend")]
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_allowed_role() -> String {
    "admin".to_string()
}

fn default_max_content_length() -> usize {
    1000
}

fn default_page_size() -> u32 {
    50
}

fn default_max_page_size() -> u32 {
    100
}

fn default_sweep_interval() -> u64 {
    300 // 5 minutes
}

fn default_stale_timeout() -> u64 {
    900 // 15 minutes
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_channel_buffer() -> usize {
    64
}

fn default_persistence_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-chat-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("chat.allowed_role", "admin")?
            .set_default("presence.sweep_interval_seconds", 300)?
            .set_default("presence.stale_timeout_seconds", 900)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("persistence.backend", "memory")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER_PORT, JWT_SECRET, CHAT_ALLOWED_ROLE, DATABASE_URL, ...
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.websocket.validate()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            allowed_role: default_allowed_role(),
            max_content_length: default_max_content_length(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_interval(),
            stale_timeout_seconds: default_stale_timeout(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            send_timeout_ms: default_send_timeout_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl WebSocketConfig {
    /// Reject values the connection tasks cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_buffer == 0 {
            return Err(ConfigError::Message(
                "websocket.channel_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: default_persistence_backend(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);
    }

    #[test]
    fn test_presence_defaults_match_sweep_cadence() {
        let presence = PresenceConfig::default();
        assert_eq!(presence.sweep_interval_seconds, 5 * 60);
        assert_eq!(presence.stale_timeout_seconds, 15 * 60);
    }

    #[test]
    fn test_chat_defaults() {
        let chat = ChatConfig::default();
        assert_eq!(chat.allowed_role, "admin");
        assert_eq!(chat.max_content_length, 1000);
        assert_eq!(chat.default_page_size, 50);
        assert_eq!(chat.max_page_size, 100);
    }

    #[test]
    fn test_zero_channel_buffer_is_rejected() {
        assert!(WebSocketConfig::default().validate().is_ok());

        let websocket = WebSocketConfig {
            channel_buffer: 0,
            ..Default::default()
        };
        let err = websocket.validate().unwrap_err();
        assert!(err.to_string().contains("channel_buffer"));
    }
}
