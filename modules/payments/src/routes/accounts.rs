//! Connected-account status and linkage (admin surface).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{api_error, ApiError, AppState};
use crate::repos::tenant_account_repo;

#[derive(Debug, Serialize)]
pub struct AccountStatusResponse {
    pub tenant_id: String,
    pub merchant_code: String,
    pub enabled: bool,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}

/// Handler for GET /api/tenants/{tenant_id}/gateway/account
pub async fn get_account_status(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<AccountStatusResponse>, ApiError> {
    let account = tenant_account_repo::fetch(&state.pool, &tenant_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "tenant account lookup failed");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal error",
            )
        })?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "not_connected",
                format!("tenant {tenant_id} has no connected gateway account"),
            )
        })?;

    let status = state
        .engine
        .gateway()
        .merchant_status(&account.merchant_code)
        .await
        .map_err(|e| {
            tracing::warn!(tenant_id = %tenant_id, error = %e, "merchant status lookup failed");
            api_error(
                StatusCode::BAD_GATEWAY,
                "gateway_unavailable",
                "the payment provider did not answer",
            )
        })?;

    Ok(Json(AccountStatusResponse {
        tenant_id: account.tenant_id,
        merchant_code: status.merchant_code,
        enabled: account.enabled,
        charges_enabled: status.charges_enabled,
        payouts_enabled: status.payouts_enabled,
        disabled_reason: status.disabled_reason,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConnectAccountBody {
    pub merchant_code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct ConnectAccountResponse {
    pub tenant_id: String,
    pub merchant_code: String,
    pub enabled: bool,
}

/// Handler for PUT /api/tenants/{tenant_id}/gateway/account
pub async fn connect_account(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<ConnectAccountBody>,
) -> Result<Json<ConnectAccountResponse>, ApiError> {
    if body.merchant_code.trim().is_empty() {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_failed",
            "merchant_code must be non-empty",
        ));
    }

    let account =
        tenant_account_repo::upsert(&state.pool, &tenant_id, &body.merchant_code, body.enabled)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "tenant account upsert failed");
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error",
                )
            })?;

    Ok(Json(ConnectAccountResponse {
        tenant_id: account.tenant_id,
        merchant_code: account.merchant_code,
        enabled: account.enabled,
    }))
}
