//! Consumer keeping the order payment projection current.
//!
//! Subscribes to `payments.events.payment.succeeded` and adds each
//! confirmed amount to the linked order's `amount_paid_minor`. The
//! processed-events guard makes redelivered events no-ops, so the
//! projection never double-counts a payment.

use event_bus::{retry_with_backoff, BusMessage, EventBus, RetryConfig};
use futures::StreamExt;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::Instrument;

use crate::dlq;
use crate::events::{EnvelopeMetadata, EventConsumer};
use crate::models::PaymentSucceededPayload;
use crate::repos::order_repo;

const SUBJECT: &str = "payments.events.payment.succeeded";

pub async fn start_payment_consumer(bus: Arc<dyn EventBus>, pool: PgPool) {
    tokio::spawn(async move {
        let mut stream = match bus.subscribe(SUBJECT).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(subject = SUBJECT, error = %e, "failed to subscribe");
                return;
            }
        };

        tracing::info!(subject = SUBJECT, "payment projection consumer started");

        let consumer = EventConsumer::new(pool.clone());
        let retry_config = RetryConfig::default();

        while let Some(msg) = stream.next().await {
            let span = tracing::info_span!("process_payment_event", subject = %msg.subject);

            async {
                let result = retry_with_backoff(
                    || {
                        let consumer = consumer.clone();
                        let pool = pool.clone();
                        let msg = msg.clone();
                        async move {
                            process_payment_succeeded(&consumer, &pool, &msg)
                                .await
                                .map_err(|e| format!("{e:#}"))
                        }
                    },
                    &retry_config,
                    "orders_payment_consumer",
                )
                .await;

                if let Err(error) = result {
                    tracing::error!(
                        error = %error,
                        attempts = retry_config.max_attempts,
                        "payment event processing exhausted retries; routing to DLQ"
                    );
                    dlq::record_failed_event(
                        &pool,
                        &msg,
                        &error,
                        retry_config.max_attempts as i32,
                    )
                    .await;
                }
            }
            .instrument(span)
            .await;
        }

        tracing::warn!(subject = SUBJECT, "payment projection consumer stopped");
    });
}

/// Apply one payment-succeeded event to the projection, at most once.
pub async fn process_payment_succeeded(
    consumer: &EventConsumer,
    pool: &PgPool,
    msg: &BusMessage,
) -> anyhow::Result<()> {
    consumer
        .process_idempotent(
            msg,
            |payload: PaymentSucceededPayload, metadata: EnvelopeMetadata| async move {
                let Some(order_id) = payload.order_id else {
                    // Payments with no linked order have no projection to move.
                    return Ok(());
                };

                let applied = order_repo::apply_payment(
                    pool,
                    &metadata.tenant_id,
                    order_id,
                    payload.amount_minor,
                )
                .await?;

                if applied {
                    tracing::info!(
                        tenant_id = %metadata.tenant_id,
                        order_id,
                        payment_id = payload.payment_id,
                        amount_minor = payload.amount_minor,
                        "payment applied to order projection"
                    );
                } else {
                    tracing::warn!(
                        tenant_id = %metadata.tenant_id,
                        order_id,
                        payment_id = payload.payment_id,
                        "payment referenced an unknown order; nothing applied"
                    );
                }

                Ok(())
            },
        )
        .await
}
