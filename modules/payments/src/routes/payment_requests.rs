//! Payment request creation.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ledger_error, ApiError, AppState};
use crate::models::PaymentRequest;
use crate::money;
use crate::services::ledger::{self, CreateRequestInput};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequestBody {
    pub tenant_id: String,
    /// Decimal currency amount, e.g. "49.99".
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub checkout_reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentRequestResponse {
    pub id: i64,
    pub tenant_id: String,
    pub checkout_reference: String,
    pub amount: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
}

impl From<PaymentRequest> for PaymentRequestResponse {
    fn from(request: PaymentRequest) -> Self {
        Self {
            id: request.id,
            tenant_id: request.tenant_id,
            checkout_reference: request.checkout_reference,
            amount: money::to_decimal(request.amount_minor).to_string(),
            amount_minor: request.amount_minor,
            currency: request.currency,
            description: request.description,
            status: request.status.to_string(),
            order_id: request.order_id,
            job_id: request.job_id,
            payment_link: request.payment_link,
        }
    }
}

/// Handler for POST /api/payment-requests
pub async fn create_payment_request(
    State(state): State<AppState>,
    Json(body): Json<CreatePaymentRequestBody>,
) -> Result<(StatusCode, Json<PaymentRequestResponse>), ApiError> {
    let request = ledger::create_payment_request(
        &state.pool,
        CreateRequestInput {
            tenant_id: body.tenant_id,
            amount: body.amount,
            currency: body.currency,
            description: body.description,
            customer_email: body.customer_email,
            order_id: body.order_id,
            job_id: body.job_id,
            checkout_reference: body.checkout_reference,
        },
    )
    .await
    .map_err(ledger_error)?;

    Ok((StatusCode::CREATED, Json(request.into())))
}
