//! Dead letter queue for events that exhausted consumer retries.

use event_bus::BusMessage;
use sqlx::PgPool;
use uuid::Uuid;

/// Store a failed event so nothing is silently dropped. Best-effort: a
/// DLQ write failure is logged, never propagated.
pub async fn record_failed_event(pool: &PgPool, msg: &BusMessage, error: &str, retry_count: i32) {
    let envelope: serde_json::Value = match serde_json::from_slice(&msg.payload) {
        Ok(value) => value,
        Err(_) => serde_json::json!({ "raw": String::from_utf8_lossy(&msg.payload) }),
    };

    let event_id = envelope
        .get("event_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let result = sqlx::query(
        r#"
        INSERT INTO notifications_failed_events (event_id, subject, envelope_json, error, retry_count)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (event_id) DO UPDATE
        SET retry_count = EXCLUDED.retry_count,
            error = EXCLUDED.error,
            failed_at = NOW()
        "#,
    )
    .bind(event_id)
    .bind(&msg.subject)
    .bind(&envelope)
    .bind(error)
    .bind(retry_count)
    .execute(pool)
    .await;

    match result {
        Ok(_) => tracing::error!(
            event_id = %event_id,
            subject = %msg.subject,
            retry_count,
            error,
            "event moved to DLQ after exhausting retries"
        ),
        Err(e) => tracing::error!(
            event_id = %event_id,
            subject = %msg.subject,
            error = %e,
            "failed to record event in DLQ"
        ),
    }
}
