pub mod orders;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::services::lifecycle::LifecycleError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error, message)))
}

pub fn lifecycle_error(e: LifecycleError) -> ApiError {
    match e {
        LifecycleError::UnknownStatus(status) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "unknown_status",
            format!("'{status}' is not a valid order status"),
        ),
        LifecycleError::EmptyOrderNumber | LifecycleError::NegativeAmount => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", e.to_string())
        }
        LifecycleError::DuplicateOrderNumber(_) => {
            api_error(StatusCode::CONFLICT, "duplicate_order_number", e.to_string())
        }
        LifecycleError::NotFound {
            tenant_id,
            order_id,
        } => api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("order {order_id} not found for tenant {tenant_id}"),
        ),
        LifecycleError::Database(e) => {
            tracing::error!(error = %e, "database error");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
    }
}
