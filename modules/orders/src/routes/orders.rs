//! Order API: creation, status transitions, history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::{api_error, lifecycle_error, ApiError};
use crate::models::{Order, OrderStatusHistory};
use crate::repos::order_repo;
use crate::services::lifecycle::{self, CreateOrderInput, TransitionInput};

#[derive(Debug, Deserialize)]
pub struct TenantScope {
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub tenant_id: String,
    pub order_number: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,
    pub estimated_cost_minor: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_cost_minor: Option<i64>,
    pub deposit_minor: i64,
    pub amount_paid_minor: i64,
    pub outstanding_minor: i64,
    pub notify_on_ordered: bool,
    pub notify_on_arrival: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let outstanding_minor = order.outstanding_minor();
        Self {
            id: order.id,
            tenant_id: order.tenant_id,
            order_number: order.order_number,
            status: order.status.to_string(),
            supplier: order.supplier,
            estimated_cost_minor: order.estimated_cost_minor,
            actual_cost_minor: order.actual_cost_minor,
            deposit_minor: order.deposit_minor,
            amount_paid_minor: order.amount_paid_minor,
            outstanding_minor,
            notify_on_ordered: order.notify_on_ordered,
            notify_on_arrival: order.notify_on_arrival,
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderBody {
    pub tenant_id: String,
    pub order_number: String,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub estimated_cost_minor: i64,
    #[serde(default)]
    pub deposit_minor: i64,
    #[serde(default)]
    pub notify_on_ordered: bool,
    #[serde(default)]
    pub notify_on_arrival: bool,
}

/// Handler for POST /api/orders
pub async fn create_order(
    State(pool): State<PgPool>,
    Json(body): Json<CreateOrderBody>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = lifecycle::create_order(
        &pool,
        CreateOrderInput {
            tenant_id: body.tenant_id,
            order_number: body.order_number,
            supplier: body.supplier,
            customer_email: body.customer_email,
            estimated_cost_minor: body.estimated_cost_minor,
            deposit_minor: body.deposit_minor,
            notify_on_ordered: body.notify_on_ordered,
            notify_on_arrival: body.notify_on_arrival,
        },
    )
    .await
    .map_err(lifecycle_error)?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub tenant_id: String,
    pub status: String,
    pub changed_by: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Handler for POST /api/orders/{order_id}/status
pub async fn change_order_status(
    State(pool): State<PgPool>,
    Path(order_id): Path<i64>,
    Json(body): Json<TransitionBody>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = lifecycle::transition(
        &pool,
        TransitionInput {
            tenant_id: body.tenant_id,
            order_id,
            new_status: body.status,
            changed_by: body.changed_by,
            reason: body.reason,
            notes: body.notes,
        },
    )
    .await
    .map_err(lifecycle_error)?;

    Ok(Json(order.into()))
}

/// Handler for GET /api/orders/{order_id}
pub async fn get_order(
    State(pool): State<PgPool>,
    Path(order_id): Path<i64>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = order_repo::fetch(&pool, &scope.tenant_id, order_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("order {order_id} not found"),
            )
        })?;

    Ok(Json(order.into()))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub order_id: i64,
    pub rows: Vec<OrderStatusHistory>,
}

/// Handler for GET /api/orders/{order_id}/history
pub async fn get_order_history(
    State(pool): State<PgPool>,
    Path(order_id): Path<i64>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<HistoryResponse>, ApiError> {
    // 404 for unknown orders rather than an empty history.
    order_repo::fetch(&pool, &scope.tenant_id, order_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("order {order_id} not found"),
            )
        })?;

    let rows = order_repo::list_history(&pool, &scope.tenant_id, order_id)
        .await
        .map_err(internal)?;

    Ok(Json(HistoryResponse { order_id, rows }))
}

fn internal(e: sqlx::Error) -> ApiError {
    tracing::error!(error = %e, "database error");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error",
    )
}
