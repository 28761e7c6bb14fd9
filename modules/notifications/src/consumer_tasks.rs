//! Subscription loops feeding the dispatcher.

use event_bus::{retry_with_backoff, BusMessage, EventBus, RetryConfig};
use futures::StreamExt;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::Instrument;

use crate::dlq;
use crate::events::EventConsumer;
use crate::handlers;
use crate::models::{OrderStatusChangedPayload, PaymentFailedPayload, PaymentSucceededPayload};
use crate::notifier::Notifier;

/// Start one consumer per subscribed subject.
pub async fn start_consumers(bus: Arc<dyn EventBus>, pool: PgPool, notifier: Arc<dyn Notifier>) {
    spawn_consumer(
        bus.clone(),
        pool.clone(),
        notifier.clone(),
        "payments.events.payment.succeeded",
        Dispatch::PaymentSucceeded,
    );
    spawn_consumer(
        bus.clone(),
        pool.clone(),
        notifier.clone(),
        "payments.events.payment.failed",
        Dispatch::PaymentFailed,
    );
    spawn_consumer(
        bus,
        pool,
        notifier,
        "orders.events.order.status.changed",
        Dispatch::OrderStatusChanged,
    );
}

#[derive(Clone, Copy)]
enum Dispatch {
    PaymentSucceeded,
    PaymentFailed,
    OrderStatusChanged,
}

fn spawn_consumer(
    bus: Arc<dyn EventBus>,
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
    subject: &'static str,
    dispatch: Dispatch,
) {
    tokio::spawn(async move {
        let mut stream = match bus.subscribe(subject).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(subject, error = %e, "failed to subscribe");
                return;
            }
        };

        tracing::info!(subject, "notification consumer started");

        let consumer = EventConsumer::new(pool.clone());
        let retry_config = RetryConfig::default();

        while let Some(msg) = stream.next().await {
            let span = tracing::info_span!("process_notification_event", subject = %msg.subject);

            async {
                let result = retry_with_backoff(
                    || {
                        let consumer = consumer.clone();
                        let pool = pool.clone();
                        let notifier = notifier.clone();
                        let msg = msg.clone();
                        async move {
                            process_one(&consumer, &pool, notifier.as_ref(), &msg, dispatch)
                                .await
                                .map_err(|e| format!("{e:#}"))
                        }
                    },
                    &retry_config,
                    "notifications_consumer",
                )
                .await;

                if let Err(error) = result {
                    tracing::error!(
                        error = %error,
                        attempts = retry_config.max_attempts,
                        "notification event processing exhausted retries; routing to DLQ"
                    );
                    dlq::record_failed_event(&pool, &msg, &error, retry_config.max_attempts as i32)
                        .await;
                }
            }
            .instrument(span)
            .await;
        }

        tracing::warn!(subject, "notification consumer stopped");
    });
}

async fn process_one(
    consumer: &EventConsumer,
    pool: &PgPool,
    notifier: &dyn Notifier,
    msg: &BusMessage,
    dispatch: Dispatch,
) -> anyhow::Result<()> {
    match dispatch {
        Dispatch::PaymentSucceeded => {
            consumer
                .process_idempotent(msg, |payload: PaymentSucceededPayload, metadata| async move {
                    handlers::handle_payment_succeeded(pool, notifier, payload, metadata).await
                })
                .await
        }
        Dispatch::PaymentFailed => {
            consumer
                .process_idempotent(msg, |payload: PaymentFailedPayload, metadata| async move {
                    handlers::handle_payment_failed(pool, notifier, payload, metadata).await
                })
                .await
        }
        Dispatch::OrderStatusChanged => {
            consumer
                .process_idempotent(
                    msg,
                    |payload: OrderStatusChangedPayload, metadata| async move {
                        handlers::handle_order_status_changed(pool, notifier, payload, metadata)
                            .await
                    },
                )
                .await
        }
    }
}
