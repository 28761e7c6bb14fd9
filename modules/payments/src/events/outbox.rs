//! Transactional outbox for payments events.
//!
//! Events are enqueued in the same transaction as the ledger write they
//! describe, then relayed to the bus by a background task. Consumers
//! (order projection, notifications) therefore only ever see effects of
//! committed transactions, and a crash between commit and publish loses
//! nothing.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tokio::time::{interval, Duration};

use event_bus::{EventBus, EventEnvelope};

/// Enqueue an event inside the caller's transaction.
pub async fn enqueue_event<T: Serialize>(
    tx: &mut Transaction<'_, Postgres>,
    event_type: &str,
    envelope: &EventEnvelope<T>,
) -> Result<(), sqlx::Error> {
    let payload = serde_json::to_value(&envelope.payload)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO payments_events_outbox
            (event_id, event_type, occurred_at, tenant_id, correlation_id, causation_id, payload)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(envelope.event_id)
    .bind(event_type)
    .bind(envelope.occurred_at)
    .bind(&envelope.tenant_id)
    .bind(&envelope.correlation_id)
    .bind(&envelope.causation_id)
    .bind(payload)
    .execute(&mut **tx)
    .await?;

    tracing::debug!(
        event_id = %envelope.event_id,
        event_type,
        "event enqueued to outbox"
    );

    Ok(())
}

/// Relay unpublished outbox rows to the bus, oldest first.
///
/// Runs forever on a 1s tick. A publish failure leaves the row
/// unpublished for the next tick; rows are only marked once the bus
/// accepted them.
pub async fn start_outbox_relay(
    pool: PgPool,
    bus: Arc<dyn EventBus>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ticker = interval(Duration::from_secs(1));

    loop {
        ticker.tick().await;

        #[derive(sqlx::FromRow)]
        struct OutboxRow {
            id: i64,
            event_id: uuid::Uuid,
            event_type: String,
            occurred_at: chrono::DateTime<chrono::Utc>,
            tenant_id: String,
            correlation_id: Option<String>,
            causation_id: Option<String>,
            payload: serde_json::Value,
        }

        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, event_type, occurred_at, tenant_id,
                   correlation_id, causation_id, payload
            FROM payments_events_outbox
            WHERE published_at IS NULL
            ORDER BY occurred_at
            LIMIT 100
            "#,
        )
        .fetch_all(&pool)
        .await?;

        for row in rows {
            let full_envelope = serde_json::json!({
                "event_id": row.event_id,
                "occurred_at": row.occurred_at,
                "tenant_id": row.tenant_id,
                "source_module": super::SOURCE_MODULE,
                "source_version": env!("CARGO_PKG_VERSION"),
                "correlation_id": row.correlation_id,
                "causation_id": row.causation_id,
                "payload": row.payload,
            });

            let subject = format!("payments.events.{}", row.event_type);
            let payload_bytes = serde_json::to_vec(&full_envelope)?;

            if let Err(e) = bus.publish(&subject, payload_bytes).await {
                tracing::error!(event_id = %row.event_id, error = %e, "failed to publish outbox event");
                continue;
            }

            sqlx::query("UPDATE payments_events_outbox SET published_at = NOW() WHERE id = $1")
                .bind(row.id)
                .execute(&pool)
                .await?;

            tracing::debug!(
                event_id = %row.event_id,
                subject = %subject,
                "outbox event published"
            );
        }
    }
}
