use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::auth::Identity;
use crate::error::AppError;
use crate::metrics::WsMessageMetrics;
use crate::room::ConnectionHandle;
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage, ServerMessage};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// The handshake is completed before upgrading; a rejected attempt gets a
/// plain HTTP error and never reaches the room.
#[tracing::instrument(
    name = "ws.upgrade",
    skip(ws, state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let token = extract_token(&query, &headers);

    let identity = match state.gateway.authenticate(token.as_deref()).await {
        Ok(identity) => identity,
        Err(e) => return AppError::from(e).into_response(),
    };

    tracing::info!(identity_id = %identity.id, "WebSocket upgrade accepted");

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Token from the `token` query parameter, else from `Authorization: Bearer`
fn extract_token(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    if let Some(ref token) = query.token {
        return Some(token.clone());
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state, identity),
    fields(identity_id = %identity.id, otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let connection_start = Instant::now();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.settings.websocket.channel_buffer);
    let handle = state.hub.connect(identity, tx).await;
    let connection_id = handle.id;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg.to_json() {
                Some(Ok(text)) => Message::Text(text.into()),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
                None => Message::Ping(Bytes::new()),
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Inbound events are processed one at a time, in arrival order
    let recv_state = state.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &recv_state, &recv_handle).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
        }
        _ = handle.evicted() => {
            tracing::info!(connection_id = %connection_id, "Connection evicted as stale");
        }
    }

    send_task.abort();
    recv_task.abort();

    state.hub.disconnect(&handle).await;

    let duration = connection_start.elapsed().as_secs_f64();
    WsMessageMetrics::connection_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Returns false if the connection should be closed
async fn process_message(msg: Message, state: &AppState, handle: &ConnectionHandle) -> bool {
    state.hub.touch(handle);

    match msg {
        Message::Text(text) => {
            let event: ClientMessage = match serde_json::from_str(&text) {
                Ok(event) => event,
                Err(e) => {
                    WsMessageMetrics::record("invalid");
                    tracing::warn!(connection_id = %handle.id, error = %e, "Failed to parse client message");
                    let _ = handle
                        .send(ServerMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                    return true;
                }
            };

            WsMessageMetrics::record(event.kind());
            state.hub.handle_event(handle, event).await;
            true
        }
        Message::Binary(_) => {
            WsMessageMetrics::record("binary");
            let _ = handle
                .send(ServerMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        // axum answers pings itself; both directions count as activity
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}
