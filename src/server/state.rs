use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::{IdentityResolver, JwtIdentityResolver};
use crate::chat::ChatHub;
use crate::config::Settings;
use crate::gateway::ConnectionGateway;
use crate::persistence::{create_persistence_backend, PersistenceBackend};
use crate::postgres::PostgresPool;

/// Shared application state. Every component is created once here.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub gateway: Arc<ConnectionGateway>,
    pub hub: Arc<ChatHub>,
    pub backend: Arc<dyn PersistenceBackend>,
    pub postgres_pool: Option<Arc<PostgresPool>>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, postgres_pool: Option<Arc<PostgresPool>>) -> Self {
        let resolver: Arc<dyn IdentityResolver> = Arc::new(JwtIdentityResolver::new(&settings.jwt));
        let backend = create_persistence_backend(&settings.persistence, postgres_pool.clone());

        let mut state = Self::with_components(settings, resolver, backend);
        state.postgres_pool = postgres_pool;
        state
    }

    /// Build state around explicit collaborators
    pub fn with_components(
        settings: Settings,
        resolver: Arc<dyn IdentityResolver>,
        backend: Arc<dyn PersistenceBackend>,
    ) -> Self {
        let gateway = Arc::new(ConnectionGateway::new(
            resolver,
            settings.chat.allowed_role.clone(),
        ));
        let hub = Arc::new(ChatHub::new(
            backend.clone(),
            settings.chat.clone(),
            Duration::from_millis(settings.websocket.send_timeout_ms),
        ));

        Self {
            settings: Arc::new(settings),
            gateway,
            hub,
            backend,
            postgres_pool: None,
            start_time: Instant::now(),
        }
    }
}
