//! Order lifecycle service.
//!
//! A transition is one atomic unit: the history append and the cached
//! status update commit together or not at all, with the status-changed
//! event enqueued in the same transaction. Payment completion never moves
//! order status; fulfillment and payment are orthogonal axes.

use sqlx::PgPool;
use thiserror::Error;

use crate::events::{self, enqueue_event};
use crate::models::{Order, OrderStatus, OrderStatusChangedPayload};
use crate::repos::order_repo;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("unknown order status '{0}'")]
    UnknownStatus(String),

    #[error("order {order_id} not found for tenant {tenant_id}")]
    NotFound { tenant_id: String, order_id: i64 },

    #[error("order number must be non-empty")]
    EmptyOrderNumber,

    #[error("order number '{0}' already exists for this tenant")]
    DuplicateOrderNumber(String),

    #[error("cost amounts must not be negative")]
    NegativeAmount,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

const PG_UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone)]
pub struct CreateOrderInput {
    pub tenant_id: String,
    pub order_number: String,
    pub supplier: Option<String>,
    pub customer_email: Option<String>,
    pub estimated_cost_minor: i64,
    pub deposit_minor: i64,
    pub notify_on_ordered: bool,
    pub notify_on_arrival: bool,
}

pub async fn create_order(pool: &PgPool, input: CreateOrderInput) -> LifecycleResult<Order> {
    let order_number = input.order_number.trim().to_string();
    if order_number.is_empty() {
        return Err(LifecycleError::EmptyOrderNumber);
    }
    if input.estimated_cost_minor < 0 || input.deposit_minor < 0 {
        return Err(LifecycleError::NegativeAmount);
    }

    let order = order_repo::insert(
        pool,
        &order_repo::NewOrder {
            tenant_id: input.tenant_id,
            order_number: order_number.clone(),
            supplier: input.supplier,
            customer_email: input.customer_email,
            estimated_cost_minor: input.estimated_cost_minor,
            deposit_minor: input.deposit_minor,
            notify_on_ordered: input.notify_on_ordered,
            notify_on_arrival: input.notify_on_arrival,
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            LifecycleError::DuplicateOrderNumber(order_number.clone())
        } else {
            e.into()
        }
    })?;

    tracing::info!(
        tenant_id = %order.tenant_id,
        order_id = order.id,
        order_number = %order.order_number,
        "order created"
    );

    Ok(order)
}

#[derive(Debug, Clone)]
pub struct TransitionInput {
    pub tenant_id: String,
    pub order_id: i64,
    /// Status token from the caller; validated against the known set.
    pub new_status: String,
    pub changed_by: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Apply one status transition.
///
/// The order row is locked, the history row appended with the observed
/// previous status, the cached status updated, and the status-changed
/// event enqueued, all in one transaction.
pub async fn transition(pool: &PgPool, input: TransitionInput) -> LifecycleResult<Order> {
    let new_status: OrderStatus = input
        .new_status
        .parse()
        .map_err(|_| LifecycleError::UnknownStatus(input.new_status.clone()))?;

    let mut tx = pool.begin().await?;

    let order = order_repo::fetch_for_update(&mut tx, &input.tenant_id, input.order_id)
        .await?
        .ok_or_else(|| LifecycleError::NotFound {
            tenant_id: input.tenant_id.clone(),
            order_id: input.order_id,
        })?;

    let history = order_repo::apply_transition(
        &mut tx,
        &order,
        new_status,
        &input.changed_by,
        input.reason.as_deref(),
        input.notes.as_deref(),
    )
    .await?;

    let notify = match new_status {
        OrderStatus::Ordered => order.notify_on_ordered,
        OrderStatus::Arrived => order.notify_on_arrival,
        _ => false,
    };

    let envelope = events::new_envelope(
        order.tenant_id.clone(),
        Some(order.order_number.clone()),
        None,
        OrderStatusChangedPayload {
            order_id: order.id,
            order_number: order.order_number.clone(),
            previous_status: Some(order.status),
            new_status,
            reason: input.reason.clone(),
            changed_by: input.changed_by.clone(),
            notify,
            customer_email: order.customer_email.clone(),
        },
    );
    enqueue_event(&mut tx, "order.status.changed", &envelope).await?;

    tx.commit().await?;

    tracing::info!(
        tenant_id = %order.tenant_id,
        order_id = order.id,
        previous_status = %order.status,
        new_status = %new_status,
        changed_by = %input.changed_by,
        history_id = history.id,
        "order status changed"
    );

    Ok(Order {
        status: new_status,
        ..order
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == PG_UNIQUE_VIOLATION)
}
