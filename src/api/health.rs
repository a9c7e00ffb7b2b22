//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub persistence: PersistenceHealthResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresHealthResponse>,
    pub connections: usize,
    pub online_identities: usize,
}

#[derive(Debug, Serialize)]
pub struct PersistenceHealthResponse {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct PostgresHealthResponse {
    pub connected: bool,
    pub pool_size: u32,
    pub idle_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: usize,
    pub online_identities: usize,
    pub online: Vec<OnlineIdentityStats>,
}

#[derive(Debug, Serialize)]
pub struct OnlineIdentityStats {
    pub identity_id: String,
    pub display_name: String,
    pub connections: usize,
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let hub_stats = state.hub.stats();

    let postgres = match state.postgres_pool {
        Some(ref pool) => {
            let inner = pool.pool();
            Some(PostgresHealthResponse {
                connected: pool.health_check().await,
                pool_size: inner.size(),
                idle_connections: inner.num_idle() as u32,
            })
        }
        None => None,
    };

    let healthy = postgres.as_ref().map(|pg| pg.connected).unwrap_or(true);

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        persistence: PersistenceHealthResponse {
            backend: state.backend.backend_type().to_string(),
        },
        postgres,
        connections: hub_stats.connections,
        online_identities: hub_stats.online_identities,
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let hub_stats = state.hub.stats();
    let presence = state.hub.presence();

    let online = presence
        .snapshot()
        .into_iter()
        .map(|record| OnlineIdentityStats {
            connections: presence.connection_count(&record.identity_id),
            last_seen: presence.last_seen(&record.identity_id),
            identity_id: record.identity_id,
            display_name: record.display_name,
        })
        .collect();

    Json(StatsResponse {
        connections: hub_stats.connections,
        online_identities: hub_stats.online_identities,
        online,
    })
}
