//! Prometheus metrics for the readiness aggregator.
//!
//! No exporter is started here; the host process scrapes the default
//! registry.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, which should crash at startup
//! rather than fail silently. These panics only occur during static
//! initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, Counter,
    CounterVec, Gauge, GaugeVec,
};
use pulse_core::{Block, MarketDataStatus, ReasonCode};

/// Total events ingested, by topic.
pub static EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pulse_events_total",
        "Total bus events ingested",
        &["topic"]
    )
    .unwrap()
});

/// Total evaluation ticks.
pub static TICKS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!("pulse_ticks_total", "Total evaluation ticks").unwrap()
});

/// Overall readiness confidence (0-1).
pub static OVERALL_CONFIDENCE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pulse_overall_confidence",
        "Overall readiness confidence (0-1)"
    )
    .unwrap()
});

/// Per-block readiness confidence (0-1).
pub static BLOCK_CONFIDENCE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_block_confidence",
        "Per-block readiness confidence (0-1)",
        &["block"]
    )
    .unwrap()
});

/// Degraded flag (1 = degraded).
pub static DEGRADED: Lazy<Gauge> =
    Lazy::new(|| register_gauge!("pulse_degraded", "Degraded flag (1=degraded)").unwrap());

/// Active degradation reasons (1 = active).
pub static REASON_ACTIVE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "pulse_reason_active",
        "Degradation reason currently effective (1=active)",
        &["reason"]
    )
    .unwrap()
});

/// WebSocket-level connection state (1 = healthy).
pub static WS_HEALTHY: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "pulse_ws_healthy",
        "WebSocket-level connection state (1=healthy)"
    )
    .unwrap()
});

/// Count one ingested event.
pub fn record_event(topic: &str) {
    EVENTS_TOTAL.with_label_values(&[topic]).inc();
}

/// Export the outcome of one evaluation tick.
pub fn record_status(status: &MarketDataStatus) {
    TICKS_TOTAL.inc();
    OVERALL_CONFIDENCE.set(status.overall_confidence);
    for block in Block::ALL {
        BLOCK_CONFIDENCE
            .with_label_values(&[block.as_str()])
            .set(status.block_confidence.get(block));
    }
    DEGRADED.set(if status.degraded { 1.0 } else { 0.0 });
    for reason in ReasonCode::CANONICAL {
        let active = status.degraded_reasons.contains(&reason);
        REASON_ACTIVE
            .with_label_values(&[reason.as_str()])
            .set(if active { 1.0 } else { 0.0 });
    }
}

/// Export the WebSocket-level connection state.
pub fn record_connection(healthy: bool) {
    WS_HEALTHY.set(if healthy { 1.0 } else { 0.0 });
}
