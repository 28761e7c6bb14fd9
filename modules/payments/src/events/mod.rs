pub mod outbox;

pub use outbox::{enqueue_event, start_outbox_relay};

use event_bus::EventEnvelope;

pub const SOURCE_MODULE: &str = "payments";

/// Envelope constructor with this module's identity baked in.
pub fn new_envelope<T>(
    tenant_id: String,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    payload: T,
) -> EventEnvelope<T> {
    EventEnvelope::new(
        SOURCE_MODULE,
        env!("CARGO_PKG_VERSION"),
        tenant_id,
        correlation_id,
        causation_id,
        payload,
    )
}
