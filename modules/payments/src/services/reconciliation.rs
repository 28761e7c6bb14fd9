//! Reconciliation engine: the coordinator that turns provider
//! confirmations into ledger transitions.
//!
//! Two entry points feed it, inbound provider events (push) and status
//! polls (pull), and both converge on the same idempotent transitions in
//! the ledger service, so duplicate delivery, missed delivery, and
//! user-triggered refreshes all end in the same terminal state.

use chrono::Utc;
use sqlx::PgPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::correlator::{self, CorrelationHints};
use crate::gateway::{CheckoutStatus, GatewayError, PaymentGateway};
use crate::models::{ConfirmationKind, PaymentRequest, ProviderEvent, RequestStatus};
use crate::repos::payment_request_repo;
use crate::services::ledger::{self, LedgerError, PaidDetails, TransitionOutcome};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// What one reconciliation attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A Payment entry now exists for this request.
    Confirmed,
    MarkedFailed,
    MarkedExpired,
    /// The request was already terminal; nothing changed.
    AlreadyProcessed,
    /// No PaymentRequest correlates with the event.
    Unmatched,
    /// Nothing to apply (still pending, or verification disagreed).
    NoChange,
    /// Provider reported paid over a local failed/expired row.
    Conflict,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Confirmed => "confirmed",
            ReconcileOutcome::MarkedFailed => "marked_failed",
            ReconcileOutcome::MarkedExpired => "marked_expired",
            ReconcileOutcome::AlreadyProcessed => "already_processed",
            ReconcileOutcome::Unmatched => "unmatched",
            ReconcileOutcome::NoChange => "no_change",
            ReconcileOutcome::Conflict => "conflict",
        }
    }

    fn changed(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Confirmed
                | ReconcileOutcome::MarkedFailed
                | ReconcileOutcome::MarkedExpired
        )
    }
}

/// Counts returned by the manual refresh endpoint.
#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct RefreshSummary {
    pub updated: u32,
    pub confirmed: u32,
}

/// Counts from one background sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepSummary {
    pub scanned: u32,
    pub updated: u32,
    pub confirmed: u32,
    pub conflicts: u32,
    pub errors: u32,
}

/// What a manual refresh is scoped to.
#[derive(Debug, Clone, Copy)]
pub enum RefreshTarget {
    Order(i64),
    Job(i64),
}

/// Map a provider-side checkout status to the transition it implies.
/// `None` means leave the request alone (still pending provider-side).
pub fn map_provider_status(status: CheckoutStatus) -> Option<ConfirmationKind> {
    match status {
        CheckoutStatus::Paid => Some(ConfirmationKind::Succeeded),
        CheckoutStatus::Failed => Some(ConfirmationKind::Failed),
        CheckoutStatus::Expired => Some(ConfirmationKind::Expired),
        CheckoutStatus::Pending => None,
    }
}

pub struct ReconciliationEngine {
    pool: PgPool,
    gateway: Arc<dyn PaymentGateway>,
    /// Re-verify pushed "paid" claims against the gateway before
    /// committing (defense against forged or stale webhook payloads).
    verify_events: bool,
    sweep_batch: i64,
    sweep_in_flight: AtomicBool,
}

impl ReconciliationEngine {
    pub fn new(pool: PgPool, gateway: Arc<dyn PaymentGateway>, verify_events: bool) -> Self {
        Self {
            pool,
            gateway,
            verify_events,
            sweep_batch: 100,
            sweep_in_flight: AtomicBool::new(false),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PaymentGateway> {
        &self.gateway
    }

    /// Push path: ingest one provider confirmation event.
    pub async fn ingest_event(&self, event: &ProviderEvent) -> ReconcileResult<ReconcileOutcome> {
        let hints = CorrelationHints {
            tenant_id: event.tenant_id.clone(),
            payment_request_id: event.payment_request_id,
            provider_checkout_id: event.provider_checkout_id.clone(),
            checkout_reference: event.checkout_reference.clone(),
        };

        let Some(request) = correlator::resolve(&self.pool, &hints).await? else {
            tracing::info!(
                provider_checkout_id = event.provider_checkout_id.as_deref().unwrap_or("-"),
                checkout_reference = event.checkout_reference.as_deref().unwrap_or("-"),
                "confirmation event matched no payment request; acknowledged without action"
            );
            return Ok(ReconcileOutcome::Unmatched);
        };

        if request.status.is_terminal() {
            return Ok(self.terminal_outcome(&request, event.kind));
        }

        if self.verify_events && event.kind == ConfirmationKind::Succeeded {
            if let Some(outcome) = self.verify_claim(&request).await? {
                return Ok(outcome);
            }
        }

        let outcome = match event.kind {
            ConfirmationKind::Succeeded => {
                let details = PaidDetails {
                    provider_payment_reference: event.transaction_id.clone(),
                    receipt_url: event.receipt_url.clone(),
                    paid_at: None,
                };
                ledger::mark_paid(&self.pool, &request.tenant_id, request.id, details).await?
            }
            ConfirmationKind::Failed => {
                ledger::mark_failed(
                    &self.pool,
                    &request.tenant_id,
                    request.id,
                    event.failure_reason.clone(),
                )
                .await?
            }
            ConfirmationKind::Expired => {
                ledger::mark_expired(&self.pool, &request.tenant_id, request.id).await?
            }
        };

        Ok(Self::transition_outcome(outcome, event.kind))
    }

    /// Pull path: reconcile one pending request against the gateway.
    pub async fn refresh_request(
        &self,
        request: &PaymentRequest,
    ) -> ReconcileResult<ReconcileOutcome> {
        if request.status.is_terminal() {
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }

        let Some(checkout_id) = &request.provider_checkout_id else {
            // Nothing to poll; the request can still time out locally.
            if past_expiry(request) {
                let outcome =
                    ledger::mark_expired(&self.pool, &request.tenant_id, request.id).await?;
                return Ok(Self::transition_outcome(outcome, ConfirmationKind::Expired));
            }
            return Ok(ReconcileOutcome::NoChange);
        };

        let session = self.gateway.get_checkout(checkout_id).await?;

        let kind = match map_provider_status(session.status) {
            Some(kind) => kind,
            None => {
                if past_expiry(request) {
                    let outcome =
                        ledger::mark_expired(&self.pool, &request.tenant_id, request.id).await?;
                    return Ok(Self::transition_outcome(outcome, ConfirmationKind::Expired));
                }
                return Ok(ReconcileOutcome::NoChange);
            }
        };

        let outcome = match kind {
            ConfirmationKind::Succeeded => {
                if session.amount_minor != request.amount_minor {
                    tracing::warn!(
                        tenant_id = %request.tenant_id,
                        payment_request_id = request.id,
                        expected_minor = request.amount_minor,
                        reported_minor = session.amount_minor,
                        "provider-paid amount disagrees with the request; left for manual review"
                    );
                    return Ok(ReconcileOutcome::NoChange);
                }
                let details = PaidDetails {
                    provider_payment_reference: session.transaction_id.clone(),
                    receipt_url: session.receipt_url.clone(),
                    paid_at: None,
                };
                ledger::mark_paid(&self.pool, &request.tenant_id, request.id, details).await?
            }
            ConfirmationKind::Failed => {
                ledger::mark_failed(
                    &self.pool,
                    &request.tenant_id,
                    request.id,
                    session.failure_reason.clone(),
                )
                .await?
            }
            ConfirmationKind::Expired => {
                ledger::mark_expired(&self.pool, &request.tenant_id, request.id).await?
            }
        };

        Ok(Self::transition_outcome(outcome, kind))
    }

    /// Synchronous pull over every pending request linked to one order or
    /// job, backing the manual refresh endpoint. Gateway failures on one request
    /// are logged and the rest still run.
    pub async fn refresh_for_target(
        &self,
        tenant_id: &str,
        target: RefreshTarget,
    ) -> ReconcileResult<RefreshSummary> {
        let (order_id, job_id) = match target {
            RefreshTarget::Order(id) => (Some(id), None),
            RefreshTarget::Job(id) => (None, Some(id)),
        };

        let pending =
            payment_request_repo::list_pending_for_link(&self.pool, tenant_id, order_id, job_id)
                .await?;

        let mut summary = RefreshSummary::default();
        for request in &pending {
            match self.refresh_request(request).await {
                Ok(outcome) => {
                    if outcome.changed() {
                        summary.updated += 1;
                    }
                    if outcome == ReconcileOutcome::Confirmed {
                        summary.confirmed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        tenant_id,
                        payment_request_id = request.id,
                        error = %e,
                        "refresh failed for one payment request; continuing"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// One background sweep over pending requests with a provider
    /// artifact. Single-flight: a sweep that would overlap a running one
    /// returns `None` instead of starting.
    pub async fn sweep_pending(&self) -> ReconcileResult<Option<SweepSummary>> {
        if self.sweep_in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("pending sweep already in flight; skipping this cycle");
            return Ok(None);
        }

        let result = self.sweep_pending_inner().await;
        self.sweep_in_flight.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn sweep_pending_inner(&self) -> ReconcileResult<SweepSummary> {
        let pending =
            payment_request_repo::list_pending_with_artifact(&self.pool, self.sweep_batch).await?;

        let mut summary = SweepSummary {
            scanned: pending.len() as u32,
            ..Default::default()
        };

        for request in &pending {
            // One failing provider call must not abort the remainder.
            match self.refresh_request(request).await {
                Ok(outcome) => {
                    if outcome.changed() {
                        summary.updated += 1;
                    }
                    match outcome {
                        ReconcileOutcome::Confirmed => summary.confirmed += 1,
                        ReconcileOutcome::Conflict => summary.conflicts += 1,
                        _ => {}
                    }
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!(
                        tenant_id = %request.tenant_id,
                        payment_request_id = request.id,
                        error = %e,
                        "sweep: reconciliation failed for one request; continuing"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Re-verify a pushed "paid" claim against the gateway. Returns
    /// `Some(outcome)` to short-circuit, `None` to proceed with the
    /// transition.
    async fn verify_claim(
        &self,
        request: &PaymentRequest,
    ) -> ReconcileResult<Option<ReconcileOutcome>> {
        let Some(checkout_id) = &request.provider_checkout_id else {
            // No artifact to verify against (legacy row); accept the event.
            return Ok(None);
        };

        let session = self.gateway.get_checkout(checkout_id).await?;

        if session.status != CheckoutStatus::Paid {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                payment_request_id = request.id,
                gateway_status = ?session.status,
                "event claims paid but gateway disagrees; not committing"
            );
            return Ok(Some(ReconcileOutcome::NoChange));
        }

        if session.amount_minor != request.amount_minor {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                payment_request_id = request.id,
                expected_minor = request.amount_minor,
                reported_minor = session.amount_minor,
                "event amount disagrees with the request; not committing"
            );
            return Ok(Some(ReconcileOutcome::NoChange));
        }

        Ok(None)
    }

    fn terminal_outcome(
        &self,
        request: &PaymentRequest,
        kind: ConfirmationKind,
    ) -> ReconcileOutcome {
        if kind == ConfirmationKind::Succeeded
            && matches!(
                request.status,
                RequestStatus::Failed | RequestStatus::Expired
            )
        {
            tracing::warn!(
                tenant_id = %request.tenant_id,
                payment_request_id = request.id,
                local_status = %request.status,
                "provider reports paid over a terminal non-paid request; flagged for manual review"
            );
            return ReconcileOutcome::Conflict;
        }

        tracing::info!(
            tenant_id = %request.tenant_id,
            payment_request_id = request.id,
            status = %request.status,
            "duplicate confirmation for a settled request; acknowledged without action"
        );
        ReconcileOutcome::AlreadyProcessed
    }

    fn transition_outcome(outcome: TransitionOutcome, kind: ConfirmationKind) -> ReconcileOutcome {
        match outcome {
            TransitionOutcome::Applied { .. } => match kind {
                ConfirmationKind::Succeeded => ReconcileOutcome::Confirmed,
                ConfirmationKind::Failed => ReconcileOutcome::MarkedFailed,
                ConfirmationKind::Expired => ReconcileOutcome::MarkedExpired,
            },
            TransitionOutcome::AlreadyTerminal(_) => ReconcileOutcome::AlreadyProcessed,
            TransitionOutcome::Conflict(_) => ReconcileOutcome::Conflict,
        }
    }
}

fn past_expiry(request: &PaymentRequest) -> bool {
    request
        .expires_at
        .is_some_and(|expires_at| expires_at < Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(
            map_provider_status(CheckoutStatus::Paid),
            Some(ConfirmationKind::Succeeded)
        );
        assert_eq!(
            map_provider_status(CheckoutStatus::Failed),
            Some(ConfirmationKind::Failed)
        );
        assert_eq!(
            map_provider_status(CheckoutStatus::Expired),
            Some(ConfirmationKind::Expired)
        );
        assert_eq!(map_provider_status(CheckoutStatus::Pending), None);
    }

    #[test]
    fn changed_covers_exactly_the_applied_outcomes() {
        assert!(ReconcileOutcome::Confirmed.changed());
        assert!(ReconcileOutcome::MarkedFailed.changed());
        assert!(ReconcileOutcome::MarkedExpired.changed());
        assert!(!ReconcileOutcome::AlreadyProcessed.changed());
        assert!(!ReconcileOutcome::Unmatched.changed());
        assert!(!ReconcileOutcome::NoChange.changed());
        assert!(!ReconcileOutcome::Conflict.changed());
    }
}
