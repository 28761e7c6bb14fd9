//! Receipt retrieval for reconciled payments.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{api_error, ApiError, AppState};
use crate::correlator::{self, CorrelationHints};
use crate::models::RequestStatus;
use crate::money;
use crate::repos::payment_repo;

#[derive(Debug, Deserialize)]
pub struct ReceiptQuery {
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub receipt_number: String,
    pub tenant_id: String,
    pub checkout_reference: String,
    pub description: String,
    pub amount: String,
    pub currency: String,
    /// Platform fee share, for the tenant's records.
    pub platform_fee: String,
    pub method: String,
    pub paid_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

/// Handler for GET /api/receipts/{provider_ref}
///
/// `provider_ref` is the provider's session/intent identifier; the
/// underlying Payment must be resolvable through the correlator.
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(provider_ref): Path<String>,
    Query(query): Query<ReceiptQuery>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let hints = CorrelationHints {
        tenant_id: query.tenant_id,
        provider_checkout_id: Some(provider_ref.clone()),
        ..Default::default()
    };

    let request = correlator::resolve(&state.pool, &hints)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "unknown_reference",
                format!("no payment resolves from '{provider_ref}'"),
            )
        })?;

    if request.status != RequestStatus::Paid {
        return Err(api_error(
            StatusCode::CONFLICT,
            "not_paid",
            "this payment request has not been paid",
        ));
    }

    let payment = payment_repo::fetch_by_request(&state.pool, &request.tenant_id, request.id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            // A paid request without a ledger entry is an invariant
            // breach worth a loud log, not a silent 404.
            tracing::error!(
                tenant_id = %request.tenant_id,
                payment_request_id = request.id,
                "paid request has no payment ledger entry"
            );
            api_error(
                StatusCode::NOT_FOUND,
                "receipt_unavailable",
                "no ledger entry found for this payment",
            )
        })?;

    let fee_minor = money::apply_fee_bps(payment.amount_minor, state.platform_fee_bps);

    Ok(Json(ReceiptResponse {
        receipt_number: format!("RCPT-{:08}", payment.id),
        tenant_id: payment.tenant_id,
        checkout_reference: request.checkout_reference,
        description: request.description,
        amount: money::to_decimal(payment.amount_minor).to_string(),
        currency: payment.currency,
        platform_fee: money::to_decimal(fee_minor).to_string(),
        method: payment.method.to_string(),
        paid_at: payment.paid_at,
        provider_payment_reference: payment.provider_payment_reference,
        receipt_url: payment.receipt_url,
    }))
}

fn internal(e: sqlx::Error) -> ApiError {
    tracing::error!(error = %e, "database error");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "internal error",
    )
}
