//! Staff surface: delivery log listing and manual resend.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::models::{DeliveryStatus, NotificationDelivery, OutboundNotification};
use crate::notifier::Notifier;
use crate::repos::delivery_repo;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn internal(e: sqlx::Error) -> ApiError {
    tracing::error!(error = %e, "database error");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error",
    )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub tenant_id: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Handler for GET /api/notifications
pub async fn list_deliveries(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<NotificationDelivery>>, ApiError> {
    let rows =
        delivery_repo::list_for_tenant(&state.pool, &query.tenant_id, query.limit.clamp(1, 500))
            .await
            .map_err(internal)?;

    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ResendQuery {
    pub tenant_id: String,
}

/// Handler for POST /api/notifications/{id}/resend
///
/// The recovery path for failed deliveries: re-dispatch through the
/// channel and record the new attempt on the same row.
pub async fn resend_delivery(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ResendQuery>,
) -> Result<Json<NotificationDelivery>, ApiError> {
    let delivery = delivery_repo::fetch(&state.pool, &query.tenant_id, id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("notification {id} not found"),
            )
        })?;

    let Some(recipient) = delivery.recipient.clone() else {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "no_recipient",
            "this notification has no recipient on file to resend to",
        ));
    };

    let notification = OutboundNotification {
        tenant_id: delivery.tenant_id.clone(),
        channel: delivery.channel.clone(),
        recipient,
        template: delivery.template.clone(),
        subject_line: format!("[resend] {}", delivery.template),
        entity_type: delivery.entity_type.clone(),
        entity_id: delivery.entity_id.clone(),
    };

    let (status, error) = match state.notifier.send(&notification).await {
        Ok(_) => (DeliveryStatus::Sent, None),
        Err(e) => (DeliveryStatus::Failed, Some(e.to_string())),
    };

    let updated =
        delivery_repo::record_attempt(&state.pool, &query.tenant_id, id, status, error.as_deref())
            .await
            .map_err(internal)?
            .ok_or_else(|| {
                api_error(
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("notification {id} not found"),
                )
            })?;

    Ok(Json(updated))
}
