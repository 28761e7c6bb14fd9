//! Checkout initialization: everything the hosted payment page needs to
//! take a payment for a checkout reference.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{api_error, ApiError, AppState};
use crate::correlator::{self, CorrelationHints};
use crate::gateway::types::{META_PAYMENT_REQUEST_ID, META_TENANT_ID};
use crate::gateway::{CreateCheckoutRequest, Metadata};
use crate::models::{PaymentRequest, RequestStatus};
use crate::money;
use crate::repos::tenant_account_repo;
use crate::services::ledger;

#[derive(Debug, Serialize)]
pub struct CheckoutInitResponse {
    pub checkout_reference: String,
    pub amount: String,
    pub currency: String,
    pub description: String,
    /// Provider session token the payment page completes against.
    pub provider_checkout_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

const PAY_ANOTHER_WAY: &str =
    "Online payment is currently unavailable for this business. Please pay another way.";

/// Handler for GET /api/checkout/{checkout_reference}
pub async fn init_checkout(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<CheckoutInitResponse>, ApiError> {
    let request = correlator::resolve(&state.pool, &CorrelationHints::from_reference(&reference))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "checkout lookup failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        })?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "unknown_reference",
                format!("no payment request matches reference '{reference}'"),
            )
        })?;

    match request.status {
        RequestStatus::Pending => {}
        RequestStatus::Paid => {
            return Err(api_error(
                StatusCode::CONFLICT,
                "already_paid",
                "this payment has already been completed",
            ));
        }
        RequestStatus::Failed | RequestStatus::Expired => {
            return Err(api_error(
                StatusCode::GONE,
                "no_longer_payable",
                "this payment request is no longer open",
            ));
        }
    }

    let account = tenant_account_repo::fetch(&state.pool, &request.tenant_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "tenant account lookup failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        })?;

    let Some(account) = account.filter(|a| a.enabled) else {
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            PAY_ANOTHER_WAY,
        ));
    };

    let request = ensure_session(&state, request, &account.merchant_code).await?;

    // ensure_session always leaves an artifact on the row.
    let provider_checkout_id = request.provider_checkout_id.clone().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            PAY_ANOTHER_WAY,
        )
    })?;

    Ok(Json(CheckoutInitResponse {
        checkout_reference: request.checkout_reference,
        amount: money::to_decimal(request.amount_minor).to_string(),
        currency: request.currency,
        description: request.description,
        provider_checkout_id,
        payment_link: request.payment_link,
        expires_at: request.expires_at,
    }))
}

/// Create the provider session on first use and persist the artifact.
/// Tenant + request ids are embedded in session metadata so every later
/// confirmation correlates without scanning.
async fn ensure_session(
    state: &AppState,
    request: PaymentRequest,
    merchant_code: &str,
) -> Result<PaymentRequest, ApiError> {
    if request.provider_checkout_id.is_some() {
        return Ok(request);
    }

    let mut metadata = Metadata::new();
    metadata.insert(META_TENANT_ID.to_string(), request.tenant_id.clone());
    metadata.insert(META_PAYMENT_REQUEST_ID.to_string(), request.id.to_string());

    let session = state
        .engine
        .gateway()
        .create_checkout(CreateCheckoutRequest {
            checkout_reference: request.checkout_reference.clone(),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            merchant_code: merchant_code.to_string(),
            description: Some(request.description.clone()),
            customer_email: request.customer_email.clone(),
            metadata: Some(metadata),
        })
        .await
        .map_err(|e| {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                payment_request_id = request.id,
                error = %e,
                "provider session creation failed"
            );
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "provider_unavailable",
                PAY_ANOTHER_WAY,
            )
        })?;

    ledger::attach_checkout_artifact(&state.pool, &request.tenant_id, request.id, &session)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to persist checkout artifact");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        })
}
