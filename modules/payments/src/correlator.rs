//! Tenant correlator: maps an inbound confirmation (or a bare checkout
//! reference) to the owning tenant's PaymentRequest.
//!
//! Resolution is a strict ladder; each step runs only when every earlier
//! step produced nothing. A miss is `Ok(None)`, never an error: the
//! reconciliation engine treats unmatched events as acknowledged no-ops
//! because providers redeliver events for checkouts we no longer (or
//! never did) track.

use sqlx::PgPool;

use crate::models::PaymentRequest;
use crate::repos::payment_request_repo;

/// Prefix baked into customer-facing payment links. Clients sometimes
/// echo the reference back with the prefix stripped or doubled, so the
/// reference lookup tolerates both forms.
pub const REFERENCE_PREFIX: &str = "flp-";

/// Correlation data carried by (or recoverable from) a confirmation event.
#[derive(Debug, Clone, Default)]
pub struct CorrelationHints {
    pub tenant_id: Option<String>,
    pub payment_request_id: Option<i64>,
    pub provider_checkout_id: Option<String>,
    pub checkout_reference: Option<String>,
}

impl CorrelationHints {
    pub fn from_reference(reference: &str) -> Self {
        Self {
            checkout_reference: Some(reference.to_string()),
            ..Default::default()
        }
    }
}

/// Candidate spellings for a client-supplied checkout reference, most
/// literal first: trimmed as-is, then prefix-stripped, then prefixed.
pub fn reference_candidates(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut candidates = vec![trimmed.to_string()];

    if let Some(stripped) = trimmed.strip_prefix(REFERENCE_PREFIX) {
        candidates.push(stripped.to_string());
    } else {
        candidates.push(format!("{REFERENCE_PREFIX}{trimmed}"));
    }

    candidates
}

/// Resolve the owning PaymentRequest for a confirmation event.
///
/// Ladder:
/// 1. explicit tenant + request id from event metadata
/// 2. explicit tenant + provider checkout id
/// 3. bare checkout reference, tenant-agnostic, with normalization
/// 4. provider checkout id alone, via the tenant-agnostic index
///
/// Step 4 serves checkouts created before tenant metadata was embedded in
/// every provider session; sessions created by this service always carry
/// the metadata that makes steps 1–2 hit.
pub async fn resolve(
    pool: &PgPool,
    hints: &CorrelationHints,
) -> Result<Option<PaymentRequest>, sqlx::Error> {
    // Step 1: direct keyed lookup.
    if let (Some(tenant_id), Some(request_id)) = (&hints.tenant_id, hints.payment_request_id) {
        if let Some(request) = payment_request_repo::fetch(pool, tenant_id, request_id).await? {
            return Ok(Some(request));
        }
    }

    // Step 2: provider checkout id within the hinted tenant.
    if let (Some(tenant_id), Some(checkout_id)) = (&hints.tenant_id, &hints.provider_checkout_id) {
        if let Some(request) =
            payment_request_repo::fetch_by_provider_checkout(pool, tenant_id, checkout_id).await?
        {
            return Ok(Some(request));
        }
    }

    // Step 3: checkout reference recovered from the payment link.
    if let Some(reference) = &hints.checkout_reference {
        for candidate in reference_candidates(reference) {
            if let Some(request) =
                payment_request_repo::fetch_by_reference_any_tenant(pool, &candidate).await?
            {
                return Ok(Some(request));
            }
        }
    }

    // Step 4: indexed tenant-agnostic lookup by provider checkout id.
    if let Some(checkout_id) = &hints.provider_checkout_id {
        if let Some(request) =
            payment_request_repo::fetch_by_provider_checkout_any_tenant(pool, checkout_id).await?
        {
            tracing::debug!(
                provider_checkout_id = %checkout_id,
                tenant_id = %request.tenant_id,
                payment_request_id = request.id,
                "correlated via tenant-agnostic provider index (legacy checkout)"
            );
            return Ok(Some(request));
        }
    }

    Ok(None)
}
