//! Manual refresh (the synchronous pull path) and manual payment entry.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{api_error, ledger_error, validation_error, ApiError, AppState};
use crate::models::PaymentMethod;
use crate::money;
use crate::services::ledger::{self, ManualPaymentInput};
use crate::services::reconciliation::{RefreshSummary, RefreshTarget};
use crate::validation::ValidationError;

#[derive(Debug, Deserialize)]
pub struct TenantScope {
    pub tenant_id: String,
}

/// Handler for POST /api/payments/orders/{order_id}/refresh
pub async fn refresh_order_payments(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<RefreshSummary>, ApiError> {
    refresh(&state, &scope.tenant_id, RefreshTarget::Order(order_id)).await
}

/// Handler for POST /api/payments/jobs/{job_id}/refresh
pub async fn refresh_job_payments(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
    Query(scope): Query<TenantScope>,
) -> Result<Json<RefreshSummary>, ApiError> {
    refresh(&state, &scope.tenant_id, RefreshTarget::Job(job_id)).await
}

async fn refresh(
    state: &AppState,
    tenant_id: &str,
    target: RefreshTarget,
) -> Result<Json<RefreshSummary>, ApiError> {
    let summary = state
        .engine
        .refresh_for_target(tenant_id, target)
        .await
        .map_err(|e| {
            tracing::error!(tenant_id, error = %e, "manual refresh failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "refresh_failed",
                "could not refresh payment status",
            )
        })?;

    state
        .metrics
        .recon_events_total
        .with_label_values(&["pull", "refreshed"])
        .inc();

    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct ManualPaymentBody {
    pub tenant_id: String,
    pub amount: Decimal,
    pub currency: String,
    /// cash | card | bank_transfer | other
    pub method: String,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ManualPaymentResponse {
    pub id: i64,
    pub tenant_id: String,
    pub amount: String,
    pub amount_minor: i64,
    pub currency: String,
    pub method: String,
    pub paid_at: DateTime<Utc>,
}

/// Handler for POST /api/payments: record a cash/bank payment that
/// never went through the provider.
pub async fn record_manual_payment(
    State(state): State<AppState>,
    Json(body): Json<ManualPaymentBody>,
) -> Result<(StatusCode, Json<ManualPaymentResponse>), ApiError> {
    let method: PaymentMethod = body
        .method
        .parse()
        .map_err(|_: String| validation_error(ValidationError::UnknownMethod(body.method.clone())))?;

    let payment = ledger::record_manual_payment(
        &state.pool,
        ManualPaymentInput {
            tenant_id: body.tenant_id,
            amount: body.amount,
            currency: body.currency,
            method,
            order_id: body.order_id,
            job_id: body.job_id,
            paid_at: body.paid_at,
            notes: body.notes,
        },
    )
    .await
    .map_err(ledger_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ManualPaymentResponse {
            id: payment.id,
            tenant_id: payment.tenant_id,
            amount: money::to_decimal(payment.amount_minor).to_string(),
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            method: payment.method.to_string(),
            paid_at: payment.paid_at,
        }),
    ))
}
