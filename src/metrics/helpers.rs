//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    BACKEND_ERRORS_TOTAL, DELIVERIES_DROPPED_TOTAL, DELIVERIES_TOTAL, HANDSHAKES_TOTAL,
    MESSAGES_PERSISTED_TOTAL, MESSAGES_REJECTED_TOTAL, PRESENCE_TRANSITIONS_TOTAL,
    SWEEP_EVICTIONS_TOTAL, WS_CONNECTION_DURATION, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct HandshakeMetrics;

impl HandshakeMetrics {
    pub fn record(outcome: &str) {
        HANDSHAKES_TOTAL.with_label_values(&[outcome]).inc();
    }
}

/// Helper struct for recording inbound WebSocket event metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record(event_type: &str) {
        WS_MESSAGES_RECEIVED.with_label_values(&[event_type]).inc();
    }

    pub fn connection_closed(duration_secs: f64) {
        WS_CONNECTION_DURATION.observe(duration_secs);
    }
}

pub struct MessageMetrics;

impl MessageMetrics {
    pub fn record_persisted() {
        MESSAGES_PERSISTED_TOTAL.inc();
    }

    pub fn record_rejected(code: &str) {
        MESSAGES_REJECTED_TOTAL.with_label_values(&[code]).inc();
    }
}

pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record(delivered: u64, dropped: u64) {
        DELIVERIES_TOTAL.inc_by(delivered);
        DELIVERIES_DROPPED_TOTAL.inc_by(dropped);
    }
}

pub struct PresenceMetrics;

impl PresenceMetrics {
    pub fn record_online() {
        PRESENCE_TRANSITIONS_TOTAL.with_label_values(&["online"]).inc();
    }

    pub fn record_offline() {
        PRESENCE_TRANSITIONS_TOTAL.with_label_values(&["offline"]).inc();
    }

    pub fn record_evictions(count: u64) {
        SWEEP_EVICTIONS_TOTAL.inc_by(count);
    }

    pub fn record_backend_error(operation: &str) {
        BACKEND_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }
}
