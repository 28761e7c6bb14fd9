//! Persistence for payment requests.
//!
//! All lookups are tenant-scoped unless the function name says otherwise;
//! the two tenant-agnostic lookups exist for the correlator only.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{PaymentRequest, RequestStatus};

const COLUMNS: &str = "id, tenant_id, checkout_reference, amount_minor, currency, description, \
     customer_email, order_id, job_id, provider_checkout_id, status, payment_link, \
     created_at, expires_at";

#[derive(sqlx::FromRow)]
struct PaymentRequestRow {
    id: i64,
    tenant_id: String,
    checkout_reference: String,
    amount_minor: i64,
    currency: String,
    description: String,
    customer_email: Option<String>,
    order_id: Option<i64>,
    job_id: Option<i64>,
    provider_checkout_id: Option<String>,
    status: String,
    payment_link: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRequestRow> for PaymentRequest {
    type Error = sqlx::Error;

    fn try_from(row: PaymentRequestRow) -> Result<Self, Self::Error> {
        let status: RequestStatus = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(PaymentRequest {
            id: row.id,
            tenant_id: row.tenant_id,
            checkout_reference: row.checkout_reference,
            amount_minor: row.amount_minor,
            currency: row.currency,
            description: row.description,
            customer_email: row.customer_email,
            order_id: row.order_id,
            job_id: row.job_id,
            provider_checkout_id: row.provider_checkout_id,
            status,
            payment_link: row.payment_link,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

fn convert_opt(row: Option<PaymentRequestRow>) -> Result<Option<PaymentRequest>, sqlx::Error> {
    row.map(PaymentRequest::try_from).transpose()
}

/// Fields for a new payment request; id/status/created_at are assigned here.
#[derive(Debug, Clone)]
pub struct NewPaymentRequest {
    pub tenant_id: String,
    pub checkout_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub customer_email: Option<String>,
    pub order_id: Option<i64>,
    pub job_id: Option<i64>,
}

pub async fn insert(
    pool: &PgPool,
    request: &NewPaymentRequest,
) -> Result<PaymentRequest, sqlx::Error> {
    let row: PaymentRequestRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO payment_requests
            (tenant_id, checkout_reference, amount_minor, currency, description,
             customer_email, order_id, job_id, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&request.tenant_id)
    .bind(&request.checkout_reference)
    .bind(request.amount_minor)
    .bind(&request.currency)
    .bind(&request.description)
    .bind(&request.customer_email)
    .bind(request.order_id)
    .bind(request.job_id)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

pub async fn fetch(
    pool: &PgPool,
    tenant_id: &str,
    id: i64,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    let row: Option<PaymentRequestRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payment_requests WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    convert_opt(row)
}

/// Fetch one request under a row lock. The lock is what makes
/// check-then-transition safe against a concurrent push/poll on the same
/// row; it is held until the surrounding transaction ends.
pub async fn fetch_for_update(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    id: i64,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    let row: Option<PaymentRequestRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payment_requests WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(tenant_id)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    convert_opt(row)
}

/// Tenant-scoped lookup by the provider's own checkout identifier.
pub async fn fetch_by_provider_checkout(
    pool: &PgPool,
    tenant_id: &str,
    provider_checkout_id: &str,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    let row: Option<PaymentRequestRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payment_requests \
         WHERE tenant_id = $1 AND provider_checkout_id = $2"
    ))
    .bind(tenant_id)
    .bind(provider_checkout_id)
    .fetch_optional(pool)
    .await?;

    convert_opt(row)
}

/// Tenant-agnostic lookup by provider checkout id, backed by a dedicated
/// index. Correlator step 4: covers legacy checkouts created before
/// tenant metadata was embedded in every provider session.
pub async fn fetch_by_provider_checkout_any_tenant(
    pool: &PgPool,
    provider_checkout_id: &str,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    let row: Option<PaymentRequestRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payment_requests \
         WHERE provider_checkout_id = $1 \
         ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(provider_checkout_id)
    .fetch_optional(pool)
    .await?;

    convert_opt(row)
}

/// Tenant-agnostic lookup by checkout reference (correlator step 3). The
/// reference is only unique per tenant; pending rows win over stale
/// terminal ones so a recycled reference resolves to the open request.
pub async fn fetch_by_reference_any_tenant(
    pool: &PgPool,
    checkout_reference: &str,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    let row: Option<PaymentRequestRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payment_requests \
         WHERE checkout_reference = $1 \
         ORDER BY (status = 'pending') DESC, created_at DESC \
         LIMIT 1"
    ))
    .bind(checkout_reference)
    .fetch_optional(pool)
    .await?;

    convert_opt(row)
}

/// Store the provider checkout artifact once a session exists. Expiry is
/// only set if the row has none yet.
pub async fn attach_checkout_artifact(
    pool: &PgPool,
    tenant_id: &str,
    id: i64,
    provider_checkout_id: &str,
    payment_link: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    let row: Option<PaymentRequestRow> = sqlx::query_as(&format!(
        r#"
        UPDATE payment_requests
        SET provider_checkout_id = $3,
            payment_link = COALESCE($4, payment_link),
            expires_at = COALESCE(expires_at, $5)
        WHERE tenant_id = $1 AND id = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(tenant_id)
    .bind(id)
    .bind(provider_checkout_id)
    .bind(payment_link)
    .bind(expires_at)
    .fetch_optional(pool)
    .await?;

    convert_opt(row)
}

/// Flip the status inside the caller's transaction. The caller has
/// already taken the row lock and re-checked the current status.
pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    id: i64,
    status: RequestStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE payment_requests SET status = $3 WHERE tenant_id = $1 AND id = $2")
        .bind(tenant_id)
        .bind(id)
        .bind(status.as_str())
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Pending requests linked to one order or job: the manual-refresh scope.
pub async fn list_pending_for_link(
    pool: &PgPool,
    tenant_id: &str,
    order_id: Option<i64>,
    job_id: Option<i64>,
) -> Result<Vec<PaymentRequest>, sqlx::Error> {
    let rows: Vec<PaymentRequestRow> = sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM payment_requests
        WHERE tenant_id = $1
          AND status = 'pending'
          AND ($2::BIGINT IS NULL OR order_id = $2)
          AND ($3::BIGINT IS NULL OR job_id = $3)
        ORDER BY created_at
        "#
    ))
    .bind(tenant_id)
    .bind(order_id)
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PaymentRequest::try_from).collect()
}

/// Pending requests that have a provider artifact to poll: the sweep set.
pub async fn list_pending_with_artifact(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<PaymentRequest>, sqlx::Error> {
    let rows: Vec<PaymentRequestRow> = sqlx::query_as(&format!(
        r#"
        SELECT {COLUMNS} FROM payment_requests
        WHERE status = 'pending' AND provider_checkout_id IS NOT NULL
        ORDER BY created_at
        LIMIT $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PaymentRequest::try_from).collect()
}
