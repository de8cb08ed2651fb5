//! Prometheus Metrics Module
//!
//! Application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Active WebSocket connection gauge per channel
//! - Messages persisted counter
//! - Fan-out events published/delivered/dropped counters

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Active WebSocket connections gauge, by channel
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "ws_connections_active",
            "Number of active WebSocket connections",
        )
        .namespace("im_gateway"),
        &["channel"],
    )
    .expect("Failed to create WS_CONNECTIONS_ACTIVE metric")
});

/// Total messages persisted by this process
pub static MESSAGES_PERSISTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "messages_persisted_total",
            "Total number of messages persisted",
        )
        .namespace("im_gateway"),
    )
    .expect("Failed to create MESSAGES_PERSISTED_TOTAL metric")
});

/// Fan-out events published to the shared topic, by event name
pub static FANOUT_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fanout_published_total",
            "Fan-out events published to the shared topic",
        )
        .namespace("im_gateway"),
        &["event"],
    )
    .expect("Failed to create FANOUT_PUBLISHED_TOTAL metric")
});

/// Fan-out delivery outcomes on this process, by event name and outcome
pub static FANOUT_DELIVERY_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fanout_delivery_total",
            "Local fan-out delivery outcomes",
        )
        .namespace("im_gateway"),
        &["event", "outcome"], // "delivered", "offline", "ignored"
    )
    .expect("Failed to create FANOUT_DELIVERY_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .expect("Failed to register WS_CONNECTIONS_ACTIVE");
    registry
        .register(Box::new(MESSAGES_PERSISTED_TOTAL.clone()))
        .expect("Failed to register MESSAGES_PERSISTED_TOTAL");
    registry
        .register(Box::new(FANOUT_PUBLISHED_TOTAL.clone()))
        .expect("Failed to register FANOUT_PUBLISHED_TOTAL");
    registry
        .register(Box::new(FANOUT_DELIVERY_TOTAL.clone()))
        .expect("Failed to register FANOUT_DELIVERY_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Metrics should be valid UTF-8")
}

/// Helper to track connection registration
pub fn connection_opened(channel: &str) {
    WS_CONNECTIONS_ACTIVE.with_label_values(&[channel]).inc();
}

/// Helper to track connection teardown
pub fn connection_closed(channel: &str) {
    WS_CONNECTIONS_ACTIVE.with_label_values(&[channel]).dec();
}

/// Helper to count a persisted message
pub fn record_message_persisted() {
    MESSAGES_PERSISTED_TOTAL.inc();
}

/// Helper to count a published fan-out event
pub fn record_fanout_published(event: &str) {
    FANOUT_PUBLISHED_TOTAL.with_label_values(&[event]).inc();
}

/// Helper to count a local delivery outcome
pub fn record_fanout_delivery(event: &str, outcome: &str) {
    FANOUT_DELIVERY_TOTAL
        .with_label_values(&[event, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Force lazy initialization
        let _ = &*REGISTRY;
        let _ = &*WS_CONNECTIONS_ACTIVE;
        let _ = &*MESSAGES_PERSISTED_TOTAL;
        let _ = &*FANOUT_PUBLISHED_TOTAL;
        let _ = &*FANOUT_DELIVERY_TOTAL;
    }

    #[test]
    fn test_gather_metrics() {
        record_fanout_published("im_message");
        let metrics = gather_metrics();
        assert!(metrics.contains("fanout_published_total"));
    }
}
