mod settings;

pub use settings::{
    ChatConfig, DatabaseConfig, JwtConfig, OtelConfig, PersistenceConfig, PresenceConfig,
    ServerConfig, Settings, WebSocketConfig,
};
