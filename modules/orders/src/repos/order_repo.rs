//! Persistence for orders and their append-only status history.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{Order, OrderStatus, OrderStatusHistory};

const ORDER_COLUMNS: &str = "id, tenant_id, order_number, status, supplier, customer_email, \
     estimated_cost_minor, actual_cost_minor, deposit_minor, amount_paid_minor, \
     notify_on_ordered, notify_on_arrival, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    tenant_id: String,
    order_number: String,
    status: String,
    supplier: Option<String>,
    customer_email: Option<String>,
    estimated_cost_minor: i64,
    actual_cost_minor: Option<i64>,
    deposit_minor: i64,
    amount_paid_minor: i64,
    notify_on_ordered: bool,
    notify_on_arrival: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = sqlx::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(Order {
            id: row.id,
            tenant_id: row.tenant_id,
            order_number: row.order_number,
            status,
            supplier: row.supplier,
            customer_email: row.customer_email,
            estimated_cost_minor: row.estimated_cost_minor,
            actual_cost_minor: row.actual_cost_minor,
            deposit_minor: row.deposit_minor,
            amount_paid_minor: row.amount_paid_minor,
            notify_on_ordered: row.notify_on_ordered,
            notify_on_arrival: row.notify_on_arrival,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    order_id: i64,
    tenant_id: String,
    previous_status: Option<String>,
    new_status: String,
    reason: Option<String>,
    notes: Option<String>,
    changed_by: String,
    changed_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for OrderStatusHistory {
    type Error = sqlx::Error;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let parse = |s: &str| -> Result<OrderStatus, sqlx::Error> {
            s.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))
        };

        Ok(OrderStatusHistory {
            id: row.id,
            order_id: row.order_id,
            tenant_id: row.tenant_id,
            previous_status: row.previous_status.as_deref().map(parse).transpose()?,
            new_status: parse(&row.new_status)?,
            reason: row.reason,
            notes: row.notes,
            changed_by: row.changed_by,
            changed_at: row.changed_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub tenant_id: String,
    pub order_number: String,
    pub supplier: Option<String>,
    pub customer_email: Option<String>,
    pub estimated_cost_minor: i64,
    pub deposit_minor: i64,
    pub notify_on_ordered: bool,
    pub notify_on_arrival: bool,
}

pub async fn insert(pool: &PgPool, order: &NewOrder) -> Result<Order, sqlx::Error> {
    let row: OrderRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO orders
            (tenant_id, order_number, status, supplier, customer_email,
             estimated_cost_minor, deposit_minor, notify_on_ordered, notify_on_arrival)
        VALUES ($1, $2, 'not_ordered', $3, $4, $5, $6, $7, $8)
        RETURNING {ORDER_COLUMNS}
        "#
    ))
    .bind(&order.tenant_id)
    .bind(&order.order_number)
    .bind(&order.supplier)
    .bind(&order.customer_email)
    .bind(order.estimated_cost_minor)
    .bind(order.deposit_minor)
    .bind(order.notify_on_ordered)
    .bind(order.notify_on_arrival)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

pub async fn fetch(
    pool: &PgPool,
    tenant_id: &str,
    order_id: i64,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2"
    ))
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    row.map(Order::try_from).transpose()
}

/// Lock the order row for a status transition.
pub async fn fetch_for_update(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: &str,
    order_id: i64,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
    ))
    .bind(tenant_id)
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?;

    row.map(Order::try_from).transpose()
}

/// Append the history row and move the cached status in one shot.
/// Both writes live in the caller's transaction: an order update without
/// its history row (or the reverse) cannot be observed.
pub async fn apply_transition(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
    new_status: OrderStatus,
    changed_by: &str,
    reason: Option<&str>,
    notes: Option<&str>,
) -> Result<OrderStatusHistory, sqlx::Error> {
    let history: HistoryRow = sqlx::query_as(
        r#"
        INSERT INTO order_status_history
            (order_id, tenant_id, previous_status, new_status, reason, notes, changed_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, order_id, tenant_id, previous_status, new_status,
                  reason, notes, changed_by, changed_at
        "#,
    )
    .bind(order.id)
    .bind(&order.tenant_id)
    .bind(order.status.as_str())
    .bind(new_status.as_str())
    .bind(reason)
    .bind(notes)
    .bind(changed_by)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query("UPDATE orders SET status = $3, updated_at = NOW() WHERE tenant_id = $1 AND id = $2")
        .bind(&order.tenant_id)
        .bind(order.id)
        .bind(new_status.as_str())
        .execute(&mut **tx)
        .await?;

    history.try_into()
}

/// Full history for one order, oldest first.
pub async fn list_history(
    pool: &PgPool,
    tenant_id: &str,
    order_id: i64,
) -> Result<Vec<OrderStatusHistory>, sqlx::Error> {
    let rows: Vec<HistoryRow> = sqlx::query_as(
        r#"
        SELECT id, order_id, tenant_id, previous_status, new_status,
               reason, notes, changed_by, changed_at
        FROM order_status_history
        WHERE tenant_id = $1 AND order_id = $2
        ORDER BY changed_at, id
        "#,
    )
    .bind(tenant_id)
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(OrderStatusHistory::try_from).collect()
}

/// Add a confirmed payment to the order's paid projection. Returns false
/// when the order does not exist for this tenant.
pub async fn apply_payment(
    pool: &PgPool,
    tenant_id: &str,
    order_id: i64,
    amount_minor: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders \
         SET amount_paid_minor = amount_paid_minor + $3, updated_at = NOW() \
         WHERE tenant_id = $1 AND id = $2",
    )
    .bind(tenant_id)
    .bind(order_id)
    .bind(amount_minor)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
