//! HTTP surface tests against the assembled router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use ara_chat_service::auth::{Identity, JwtIdentityResolver};
use ara_chat_service::config::{JwtConfig, Settings};
use ara_chat_service::persistence::MemoryBackend;
use ara_chat_service::server::{create_app, AppState};

fn state() -> AppState {
    let settings = Settings {
        server: Default::default(),
        jwt: JwtConfig {
            secret: "http-test-secret".to_string(),
            issuer: None,
            audience: None,
        },
        chat: Default::default(),
        presence: Default::default(),
        websocket: Default::default(),
        persistence: Default::default(),
        database: None,
        otel: Default::default(),
    };
    let resolver = Arc::new(JwtIdentityResolver::new(&settings.jwt));
    AppState::with_components(settings, resolver, Arc::new(MemoryBackend::new()))
}

async fn get(state: AppState, uri: &str) -> (StatusCode, String) {
    let response = create_app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_reports_backend_and_counts() {
    let state = state();
    let (tx, _rx) = mpsc::channel(8);
    state
        .hub
        .connect(Identity::new("alice", "Alice", "admin"), tx)
        .await;

    let (status, body) = get(state, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["persistence"]["backend"], "memory");
    assert_eq!(json["connections"], 1);
    assert_eq!(json["online_identities"], 1);
    assert!(json.get("postgres").is_none());
}

#[tokio::test]
async fn test_stats_lists_online_identities() {
    let state = state();
    let (tx1, _rx1) = mpsc::channel(8);
    let (tx2, _rx2) = mpsc::channel(8);
    state.hub.connect(Identity::new("alice", "Alice", "admin"), tx1).await;
    state.hub.connect(Identity::new("alice", "Alice", "admin"), tx2).await;

    let (status, body) = get(state, "/stats").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["connections"], 2);
    assert_eq!(json["online_identities"], 1);
    assert_eq!(json["online"][0]["identity_id"], "alice");
    assert_eq!(json["online"][0]["connections"], 2);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_gauges() {
    let (status, body) = get(state(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("ara_chat_connections_total"));
    assert!(body.contains("ara_chat_online_identities"));
}

#[tokio::test]
async fn test_ws_route_requires_upgrade() {
    let (status, _) = get(state(), "/ws?token=anything").await;
    assert!(status.is_client_error());
}
