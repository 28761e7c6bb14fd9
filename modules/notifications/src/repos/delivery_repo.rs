//! Persistence for the notification delivery log.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{DeliveryStatus, NotificationDelivery};

const COLUMNS: &str =
    "id, tenant_id, channel, recipient, template, entity_type, entity_id, status, error, \
     attempts, created_at";

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: i64,
    tenant_id: String,
    channel: String,
    recipient: Option<String>,
    template: String,
    entity_type: String,
    entity_id: String,
    status: String,
    error: Option<String>,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for NotificationDelivery {
    type Error = sqlx::Error;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        let status: DeliveryStatus = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(NotificationDelivery {
            id: row.id,
            tenant_id: row.tenant_id,
            channel: row.channel,
            recipient: row.recipient,
            template: row.template,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            status,
            error: row.error,
            attempts: row.attempts,
            created_at: row.created_at,
        })
    }
}

pub struct NewDelivery<'a> {
    pub tenant_id: &'a str,
    pub channel: &'a str,
    pub recipient: Option<&'a str>,
    pub template: &'a str,
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub status: DeliveryStatus,
    pub error: Option<&'a str>,
}

pub async fn insert(
    pool: &PgPool,
    delivery: NewDelivery<'_>,
) -> Result<NotificationDelivery, sqlx::Error> {
    let row: DeliveryRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO notification_deliveries
            (tenant_id, channel, recipient, template, entity_type, entity_id, status, error, attempts)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(delivery.tenant_id)
    .bind(delivery.channel)
    .bind(delivery.recipient)
    .bind(delivery.template)
    .bind(delivery.entity_type)
    .bind(delivery.entity_id)
    .bind(delivery.status.as_str())
    .bind(delivery.error)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

pub async fn fetch(
    pool: &PgPool,
    tenant_id: &str,
    id: i64,
) -> Result<Option<NotificationDelivery>, sqlx::Error> {
    let row: Option<DeliveryRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM notification_deliveries WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(NotificationDelivery::try_from).transpose()
}

pub async fn list_for_tenant(
    pool: &PgPool,
    tenant_id: &str,
    limit: i64,
) -> Result<Vec<NotificationDelivery>, sqlx::Error> {
    let rows: Vec<DeliveryRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM notification_deliveries \
         WHERE tenant_id = $1 ORDER BY created_at DESC LIMIT $2"
    ))
    .bind(tenant_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(NotificationDelivery::try_from)
        .collect()
}

/// Record the outcome of a manual resend attempt.
pub async fn record_attempt(
    pool: &PgPool,
    tenant_id: &str,
    id: i64,
    status: DeliveryStatus,
    error: Option<&str>,
) -> Result<Option<NotificationDelivery>, sqlx::Error> {
    let row: Option<DeliveryRow> = sqlx::query_as(&format!(
        r#"
        UPDATE notification_deliveries
        SET status = $3, error = $4, attempts = attempts + 1
        WHERE tenant_id = $1 AND id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(tenant_id)
    .bind(id)
    .bind(status.as_str())
    .bind(error)
    .fetch_optional(pool)
    .await?;

    row.map(NotificationDelivery::try_from).transpose()
}
