//! Telemetry utilities for event timing and tracing spans.

use std::time::Instant;

/// Guard for timing one event step and recording metrics.
///
/// Records latency when dropped.
pub struct EventTimer {
    event: &'static str,
    start: Instant,
}

impl EventTimer {
    /// Start timing an event step.
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            start: Instant::now(),
        }
    }
}

impl Drop for EventTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_event(self.event, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use parley_proto::Address;
    use tracing::{Span, info_span};

    /// Span for one event step against one persona.
    pub fn event(name: &str, persona: &Address) -> Span {
        info_span!("event", name = %name, persona = %persona)
    }

    /// Span for a chat timer firing.
    pub fn chat_timer(persona: &Address, thread: &str) -> Span {
        info_span!("chat_timer", persona = %persona, thread = %thread)
    }

    /// Span for a dispatcher worker.
    pub fn worker(shard: usize) -> Span {
        info_span!("dispatch_worker", shard = shard)
    }

    pub fn intake() -> Span {
        info_span!("dispatch_intake")
    }
}
