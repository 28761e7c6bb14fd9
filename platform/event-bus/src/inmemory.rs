//! In-memory bus used by tests and local development.

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Single-process bus backed by a tokio broadcast channel.
///
/// Every subscriber sees every published message and filters locally by
/// subject pattern, which keeps the wildcard semantics identical to the
/// NATS implementation. The channel buffers 1024 messages; a subscriber
/// that lags past that loses the oldest ones (logged, not fatal).
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// NATS-style subject matching: `*` consumes one token, `>` consumes
    /// the rest of the subject (and must match at least one token).
    fn subject_matches(subject: &str, pattern: &str) -> bool {
        let mut subj = subject.split('.');
        let mut pat = pattern.split('.');

        loop {
            match (subj.next(), pat.next()) {
                (Some(_), Some(">")) => return true,
                (Some(s), Some(p)) => {
                    if p != "*" && p != s {
                        return false;
                    }
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        // A send error only means there are no subscribers yet.
        let _ = self.sender.send(BusMessage::new(subject, payload));
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if Self::subject_matches(&msg.subject, &pattern) {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, pattern = %pattern, "in-memory bus subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[test]
    fn subject_matching() {
        assert!(InMemoryBus::subject_matches(
            "payments.events.payment.succeeded",
            "payments.events.payment.succeeded"
        ));
        assert!(InMemoryBus::subject_matches(
            "payments.events.payment.succeeded",
            "payments.events.>"
        ));
        assert!(InMemoryBus::subject_matches(
            "payments.events.payment.succeeded",
            "payments.*.payment.*"
        ));
        assert!(!InMemoryBus::subject_matches(
            "payments.events.payment.succeeded",
            "payments.events.*"
        ));
        assert!(!InMemoryBus::subject_matches(
            "orders.events.order.status.changed",
            "payments.>"
        ));
        // `>` must match at least one token
        assert!(!InMemoryBus::subject_matches("payments", "payments.>"));
        assert!(InMemoryBus::subject_matches("payments", "*"));
        assert!(InMemoryBus::subject_matches("payments", ">"));
    }

    #[tokio::test]
    async fn publish_reaches_matching_subscriber() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("orders.events.>").await.unwrap();

        bus.publish("orders.events.order.status.changed", b"x".to_vec())
            .await
            .unwrap();
        bus.publish("payments.events.payment.succeeded", b"y".to_vec())
            .await
            .unwrap();
        bus.publish("orders.events.order.status.changed", b"z".to_vec())
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(first.payload, b"x");

        // The payments event is filtered out; the next delivery is "z".
        let second = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(second.payload, b"z");
    }

    #[tokio::test]
    async fn broadcast_to_multiple_subscribers() {
        let bus = InMemoryBus::new();
        let mut a = bus.subscribe("notifications.>").await.unwrap();
        let mut b = bus.subscribe(">").await.unwrap();

        bus.publish("notifications.delivery.sent", b"hello".to_vec())
            .await
            .unwrap();

        for stream in [&mut a, &mut b] {
            let msg = tokio::time::timeout(Duration::from_secs(1), stream.next())
                .await
                .expect("timeout")
                .expect("stream ended");
            assert_eq!(msg.subject, "notifications.delivery.sent");
        }
    }
}
