use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

/// Path clients upgrade on to join the chat room
pub const CHAT_WS_PATH: &str = "/ws";

/// Build the router: the chat upgrade endpoint plus health, stats and metrics.
pub fn create_app(state: AppState) -> Router {
    // Browser clients connect from other origins; the handshake token is the gate
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(chat_routes())
        // Operational endpoints
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn chat_routes() -> Router<AppState> {
    // Authenticated before the upgrade; rejected requests never reach the room
    Router::new().route(CHAT_WS_PATH, get(ws_handler))
}
