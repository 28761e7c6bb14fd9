//! Persistence for confirmed payments (the ledger entries).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{Payment, PaymentMethod};

const COLUMNS: &str = "id, tenant_id, payment_request_id, order_id, job_id, amount_minor, \
     currency, method, provider_payment_reference, receipt_url, paid_at, notes";

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    tenant_id: String,
    payment_request_id: Option<i64>,
    order_id: Option<i64>,
    job_id: Option<i64>,
    amount_minor: i64,
    currency: String,
    method: String,
    provider_payment_reference: Option<String>,
    receipt_url: Option<String>,
    paid_at: DateTime<Utc>,
    notes: Option<String>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = sqlx::Error;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let method: PaymentMethod = row
            .method
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(Payment {
            id: row.id,
            tenant_id: row.tenant_id,
            payment_request_id: row.payment_request_id,
            order_id: row.order_id,
            job_id: row.job_id,
            amount_minor: row.amount_minor,
            currency: row.currency,
            method,
            provider_payment_reference: row.provider_payment_reference,
            receipt_url: row.receipt_url,
            paid_at: row.paid_at,
            notes: row.notes,
        })
    }
}

/// Fields for a new ledger entry.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub tenant_id: String,
    pub payment_request_id: Option<i64>,
    pub order_id: Option<i64>,
    pub job_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub provider_payment_reference: Option<String>,
    pub receipt_url: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// Insert a ledger entry inside the reconciliation transaction. The
/// partial unique index on `payment_request_id` makes a double insert for
/// one request a constraint violation rather than silent double-counting.
pub async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    payment: &NewPayment,
) -> Result<Payment, sqlx::Error> {
    let row: PaymentRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO payments
            (tenant_id, payment_request_id, order_id, job_id, amount_minor, currency,
             method, provider_payment_reference, receipt_url, paid_at, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&payment.tenant_id)
    .bind(payment.payment_request_id)
    .bind(payment.order_id)
    .bind(payment.job_id)
    .bind(payment.amount_minor)
    .bind(&payment.currency)
    .bind(payment.method.as_str())
    .bind(&payment.provider_payment_reference)
    .bind(&payment.receipt_url)
    .bind(payment.paid_at)
    .bind(&payment.notes)
    .fetch_one(&mut **tx)
    .await?;

    row.try_into()
}

/// Standalone insert for manual (cash/bank) payments.
pub async fn insert_manual(pool: &PgPool, payment: &NewPayment) -> Result<Payment, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let inserted = insert(&mut tx, payment).await?;
    tx.commit().await?;
    Ok(inserted)
}

pub async fn fetch_by_request(
    pool: &PgPool,
    tenant_id: &str,
    payment_request_id: i64,
) -> Result<Option<Payment>, sqlx::Error> {
    let row: Option<PaymentRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM payments WHERE tenant_id = $1 AND payment_request_id = $2"
    ))
    .bind(tenant_id)
    .bind(payment_request_id)
    .fetch_optional(pool)
    .await?;

    row.map(Payment::try_from).transpose()
}

pub async fn count_for_request(
    pool: &PgPool,
    tenant_id: &str,
    payment_request_id: i64,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM payments WHERE tenant_id = $1 AND payment_request_id = $2",
    )
    .bind(tenant_id)
    .bind(payment_request_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

/// Total confirmed against one order; the outstanding-balance input.
pub async fn sum_for_order(
    pool: &PgPool,
    tenant_id: &str,
    order_id: i64,
) -> Result<i64, sqlx::Error> {
    let (sum,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(SUM(amount_minor), 0)::BIGINT FROM payments \
         WHERE tenant_id = $1 AND order_id = $2",
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_one(pool)
    .await?;

    Ok(sum)
}
