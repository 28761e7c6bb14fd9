pub mod consumer;

pub use consumer::{EnvelopeMetadata, EventConsumer};
