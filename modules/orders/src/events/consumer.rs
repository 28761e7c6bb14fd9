//! Idempotent event consumption.
//!
//! Every handled event id lands in `orders_processed_events`; a
//! redelivered event short-circuits before its handler runs, so consumer
//! side effects apply at most once per event.

use event_bus::{validate_envelope_fields, BusMessage};
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use uuid::Uuid;

/// Envelope fields handlers need alongside the payload.
#[derive(Debug, Clone)]
pub struct EnvelopeMetadata {
    pub event_id: Uuid,
    pub tenant_id: String,
    pub correlation_id: Option<String>,
}

#[derive(Clone)]
pub struct EventConsumer {
    pool: PgPool,
}

impl EventConsumer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn is_processed(&self, event_id: Uuid) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM orders_processed_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    pub async fn mark_processed(
        &self,
        event_id: Uuid,
        subject: &str,
        source_module: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO orders_processed_events (event_id, subject, source_module)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(subject)
        .bind(source_module)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Validate the envelope, skip already-processed events, run the
    /// handler, then record the event id.
    pub async fn process_idempotent<T, F, Fut>(
        &self,
        msg: &BusMessage,
        handler: F,
    ) -> anyhow::Result<()>
    where
        T: DeserializeOwned,
        F: FnOnce(T, EnvelopeMetadata) -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<()>>,
    {
        let envelope: serde_json::Value = serde_json::from_slice(&msg.payload)?;

        validate_envelope_fields(&envelope)
            .map_err(|e| anyhow::anyhow!("envelope validation failed: {e}"))?;

        let event_id = Uuid::parse_str(
            envelope
                .get("event_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
        )?;

        let tenant_id = envelope
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let correlation_id = envelope
            .get("correlation_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let source_module = envelope
            .get("source_module")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        if self.is_processed(event_id).await? {
            tracing::debug!(
                event_id = %event_id,
                subject = %msg.subject,
                "event already processed, skipping"
            );
            return Ok(());
        }

        let payload: T = serde_json::from_value(
            envelope
                .get("payload")
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("envelope has no payload"))?,
        )?;

        handler(
            payload,
            EnvelopeMetadata {
                event_id,
                tenant_id,
                correlation_id,
            },
        )
        .await?;

        self.mark_processed(event_id, &msg.subject, &source_module)
            .await?;

        Ok(())
    }
}
