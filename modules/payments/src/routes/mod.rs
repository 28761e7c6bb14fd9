pub mod accounts;
pub mod checkout;
pub mod payment_requests;
pub mod payments;
pub mod receipts;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;

use crate::metrics::Metrics;
use crate::services::ledger::LedgerError;
use crate::services::reconciliation::ReconciliationEngine;
use crate::validation::ValidationError;

/// Shared state for all payments routes.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub engine: Arc<ReconciliationEngine>,
    pub metrics: Arc<Metrics>,
    /// Absent in dev: webhook signature checks are skipped with a warning.
    pub webhook_secret: Option<String>,
    pub platform_fee_bps: i64,
}

/// Structured error body shared by every endpoint.
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

pub fn ledger_error(e: LedgerError) -> ApiError {
    match e {
        LedgerError::Validation(v) => validation_error(v),
        LedgerError::DuplicateReference(reference) => api_error(
            StatusCode::CONFLICT,
            "duplicate_reference",
            format!("checkout reference '{reference}' already exists"),
        ),
        LedgerError::NotFound { tenant_id, id } => api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("payment request {id} not found for tenant {tenant_id}"),
        ),
        LedgerError::Database(e) => {
            tracing::error!(error = %e, "database error");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        }
        LedgerError::ReferenceExhausted => api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "could not allocate a checkout reference",
        ),
    }
}

pub fn validation_error(e: ValidationError) -> ApiError {
    api_error(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", e.to_string())
}
