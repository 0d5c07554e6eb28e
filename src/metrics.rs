//! Prometheus metrics collection for parleyd.
//!
//! Metrics live in a process-wide registry and are exposed on an HTTP
//! endpoint (see [`crate::http`]). Every helper is a no-op until [`init`] has
//! run, so library users and tests that never call it pay nothing.
//!
//! - `parley_events_total{event}` - Persona event steps executed
//! - `parley_event_duration_seconds{event}` - Event step latency
//! - `parley_event_failures_total{event,error}` - Failed event steps
//! - `parley_chat_flushes_total{result}` - Transcript flush outcomes
//! - `parley_active_chats` - Open chat sessions across all personas
//! - `parley_personas_loaded` - Personas in the registry cache

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Event steps processed by event name.
pub static EVENT_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Event steps that returned an error or panicked.
pub static EVENT_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Transcript flushes by outcome.
pub static CHAT_FLUSHES: OnceLock<IntCounterVec> = OnceLock::new();

/// Stanzas leaving the core, by destination.
pub static PACKETS_ROUTED: OnceLock<IntCounterVec> = OnceLock::new();

/// Notifications a listener refused.
pub static NOTIFICATIONS_DROPPED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Personas resident in the registry.
pub static PERSONAS_LOADED: OnceLock<IntGauge> = OnceLock::new();

/// Open chat sessions.
pub static ACTIVE_CHATS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

/// Event step latency by event name.
pub static EVENT_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(EVENT_COUNTER, IntCounterVec::new(Opts::new("parley_events_total", "Persona event steps processed"), &["event"]));
    register!(EVENT_FAILURES, IntCounterVec::new(Opts::new("parley_event_failures_total", "Persona event steps that failed"), &["event", "error"]));
    register!(CHAT_FLUSHES, IntCounterVec::new(Opts::new("parley_chat_flushes_total", "Chat transcript flushes by outcome"), &["result"]));
    register!(PACKETS_ROUTED, IntCounterVec::new(Opts::new("parley_packets_routed_total", "Stanzas leaving the routing core"), &["kind"]));
    register!(NOTIFICATIONS_DROPPED, IntCounter::new("parley_notifications_dropped_total", "Notifications refused by a listener"));
    register!(PERSONAS_LOADED, IntGauge::new("parley_personas_loaded", "Personas in the registry cache"));
    register!(ACTIVE_CHATS, IntGauge::new("parley_active_chats", "Open chat sessions"));
    register!(EVENT_LATENCY, HistogramVec::new(
        HistogramOpts::new("parley_event_duration_seconds", "Persona event step latency")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["event"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record an event step with latency.
#[inline]
pub fn record_event(event: &str, duration_secs: f64) {
    if let Some(c) = EVENT_COUNTER.get() {
        c.with_label_values(&[event]).inc();
    }
    if let Some(h) = EVENT_LATENCY.get() {
        h.with_label_values(&[event]).observe(duration_secs);
    }
}

/// Record a failed event step.
#[inline]
pub fn record_event_failure(event: &str, error: &str) {
    if let Some(c) = EVENT_FAILURES.get() {
        c.with_label_values(&[event, error]).inc();
    }
}

/// Record a flush outcome (`written`, `skipped`, `failed`).
#[inline]
pub fn record_chat_flush(result: &str) {
    if let Some(c) = CHAT_FLUSHES.get() {
        c.with_label_values(&[result]).inc();
    }
}

/// Record an outbound stanza (`local` or `remote`).
#[inline]
pub fn record_packet_routed(kind: &str) {
    if let Some(c) = PACKETS_ROUTED.get() {
        c.with_label_values(&[kind]).inc();
    }
}

#[inline]
pub fn record_notification_dropped() {
    if let Some(c) = NOTIFICATIONS_DROPPED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_personas_loaded(count: usize) {
    if let Some(g) = PERSONAS_LOADED.get() {
        g.set(count as i64);
    }
}

#[inline]
pub fn chat_opened() {
    if let Some(g) = ACTIVE_CHATS.get() {
        g.inc();
    }
}

#[inline]
pub fn chat_closed() {
    if let Some(g) = ACTIVE_CHATS.get() {
        g.dec();
    }
}
