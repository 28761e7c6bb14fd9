//! Pub/sub seam shared by all Fieldline modules.
//!
//! Modules never call each other directly; every cross-module effect
//! (payment confirmed, order status changed, notification requested)
//! travels as an enveloped event over this bus. Two implementations:
//!
//! - [`NatsBus`]: production, wraps an `async_nats::Client`
//! - [`InMemoryBus`]: dev and tests, tokio broadcast channel with the
//!   same NATS-style subject semantics
//!
//! Which one a service uses is config-driven (`BUS_TYPE`), so a module
//! binary and its integration tests run identically with or without a
//! NATS server.
//!
//! ```rust,no_run
//! use event_bus::{EventBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//! bus.publish("payments.events.payment.succeeded", b"{}".to_vec()).await?;
//!
//! let mut stream = bus.subscribe("payments.events.>").await?;
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("{} ({} bytes)", msg.subject, msg.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

mod envelope;
mod inmemory;
mod nats;
pub mod retry;

pub use envelope::{validate_envelope_fields, EventEnvelope};
pub use inmemory::InMemoryBus;
pub use nats::NatsBus;
pub use retry::{retry_with_backoff, RetryConfig};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;

/// A message received from the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// Subject the message was published to.
    pub subject: String,
    /// Raw payload bytes (an enveloped JSON event for all Fieldline subjects).
    pub payload: Vec<u8>,
    /// Transport headers, if the backend carries any.
    pub headers: Option<HashMap<String, String>>,
}

impl BusMessage {
    pub fn new(subject: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            payload,
            headers: None,
        }
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Errors surfaced by bus implementations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    Publish(String),

    #[error("failed to subscribe to subject: {0}")]
    Subscribe(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid subject pattern: {0}")]
    InvalidSubject(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Publish/subscribe abstraction every module programs against.
///
/// Subject patterns follow NATS conventions: `*` matches exactly one
/// dot-separated token, `>` matches one or more trailing tokens.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish raw payload bytes to a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a subject pattern, receiving a stream of messages.
    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
