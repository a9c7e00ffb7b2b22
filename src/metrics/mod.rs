//! Prometheus metrics for the chat service.
//!
//! - Connection metrics (live connections, online identities, connection lifetime)
//! - Handshake outcomes
//! - Message metrics (persisted, rejected by reason)
//! - Fan-out delivery metrics
//! - Presence transitions and sweep evictions

mod helpers;

pub use helpers::{
    encode_metrics, DeliveryMetrics, HandshakeMetrics, MessageMetrics, PresenceMetrics,
    WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ara_chat";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of live WebSocket connections in the room
    pub static ref CONNECTIONS_TOTAL: IntGauge = register_int_gauge!(
        format!("{}_connections_total", METRIC_PREFIX),
        "Number of live WebSocket connections in the room"
    ).unwrap();

    /// Number of identities currently online
    pub static ref ONLINE_IDENTITIES: IntGauge = register_int_gauge!(
        format!("{}_online_identities", METRIC_PREFIX),
        "Number of identities with at least one live connection"
    ).unwrap();

    /// Connection lifetime in seconds
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection lifetime in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Handshake attempts by outcome
    pub static ref HANDSHAKES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_handshakes_total", METRIC_PREFIX),
        "Connection handshakes by outcome",
        &["outcome"]
    ).unwrap();

    /// Inbound WebSocket events by type
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Inbound WebSocket events by type",
        &["type"]
    ).unwrap();

    // ============================================================================
    // Message Metrics
    // ============================================================================

    /// Chat messages persisted and broadcast
    pub static ref MESSAGES_PERSISTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_persisted_total", METRIC_PREFIX),
        "Chat messages persisted and broadcast"
    ).unwrap();

    /// Chat messages rejected, by error code
    pub static ref MESSAGES_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_messages_rejected_total", METRIC_PREFIX),
        "Chat messages rejected by error code",
        &["code"]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Outbound frames delivered to connection buffers
    pub static ref DELIVERIES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Outbound frames handed to connection buffers"
    ).unwrap();

    /// Outbound frames dropped (closed or timed-out connection)
    pub static ref DELIVERIES_DROPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_deliveries_dropped_total", METRIC_PREFIX),
        "Outbound frames dropped because the connection was closed or slow"
    ).unwrap();

    // ============================================================================
    // Presence Metrics
    // ============================================================================

    /// Presence transitions by direction
    pub static ref PRESENCE_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_presence_transitions_total", METRIC_PREFIX),
        "Presence transitions by direction",
        &["transition"]
    ).unwrap();

    /// Presence entries evicted by the stale sweep
    pub static ref SWEEP_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sweep_evictions_total", METRIC_PREFIX),
        "Presence entries evicted by the stale sweep"
    ).unwrap();

    /// Persistence backend errors during presence mirroring or sweeping
    pub static ref BACKEND_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_backend_errors_total", METRIC_PREFIX),
        "Persistence backend errors by operation",
        &["operation"]
    ).unwrap();
}
