//! Inbound confirmation endpoint.
//!
//! The gateway retries deliveries that don't get a 2xx, so everything
//! past payload integrity acknowledges with 200: a processing problem is
//! ours to recover (the sweeper will), not the provider's to retry into
//! a storm.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{api_error, ApiError, AppState};
use crate::gateway::types::{META_PAYMENT_REQUEST_ID, META_TENANT_ID};
use crate::gateway::webhook::verify_webhook_signature;
use crate::models::{ConfirmationKind, ProviderEvent};

pub const SIGNATURE_HEADER: &str = "gateway-signature";

/// Wire shape of a gateway confirmation delivery.
#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    pub event_type: String,
    #[serde(default)]
    pub checkout_id: Option<String>,
    #[serde(default)]
    pub checkout_reference: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub amount_minor: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

/// Handler for POST /api/webhooks/gateway
pub async fn receive_gateway_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if verify_webhook_signature(&body, signature, secret, None).is_err() {
            state
                .metrics
                .webhook_rejected_total
                .with_label_values(&["signature"])
                .inc();
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "invalid_signature",
                "webhook signature verification failed",
            ));
        }
    } else {
        tracing::warn!("GATEWAY_WEBHOOK_SECRET unset; accepting unsigned webhook");
    }

    let parsed: WebhookBody = match serde_json::from_str(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            state
                .metrics
                .webhook_rejected_total
                .with_label_values(&["malformed"])
                .inc();
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "malformed_payload",
                format!("could not parse event payload: {e}"),
            ));
        }
    };

    let Some(event) = to_provider_event(parsed) else {
        // Unknown event types are acknowledged and dropped; the gateway
        // sends more types than this platform consumes.
        return Ok(Json(WebhookAck {
            received: true,
            outcome: "ignored",
        }));
    };

    match state.engine.ingest_event(&event).await {
        Ok(outcome) => {
            state.metrics.record_outcome("push", outcome);
            Ok(Json(WebhookAck {
                received: true,
                outcome: outcome.as_str(),
            }))
        }
        Err(e) => {
            // Logged for operators; the next sweep retries. Returning an
            // error here would only trigger a provider redelivery storm.
            tracing::error!(error = %e, "webhook processing failed; deferred to poll path");
            Ok(Json(WebhookAck {
                received: true,
                outcome: "deferred",
            }))
        }
    }
}

fn to_provider_event(body: WebhookBody) -> Option<ProviderEvent> {
    let kind = match body.event_type.as_str() {
        "checkout.completed" | "payment.succeeded" | "charge.completed" => {
            ConfirmationKind::Succeeded
        }
        "checkout.failed" | "payment.failed" => ConfirmationKind::Failed,
        "checkout.expired" => ConfirmationKind::Expired,
        _ => return None,
    };

    let metadata = body.metadata.unwrap_or_default();
    let tenant_id = metadata.get(META_TENANT_ID).cloned();
    let payment_request_id = metadata
        .get(META_PAYMENT_REQUEST_ID)
        .and_then(|raw| raw.parse::<i64>().ok());

    Some(ProviderEvent {
        kind,
        tenant_id,
        payment_request_id,
        provider_checkout_id: body.checkout_id,
        checkout_reference: body.checkout_reference,
        amount_minor: body.amount_minor,
        currency: body.currency,
        transaction_id: body.transaction_id,
        receipt_url: body.receipt_url,
        failure_reason: body.failure_reason,
    })
}
