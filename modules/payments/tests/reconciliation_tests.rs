//! Integration tests for the reconciliation engine: push/pull
//! convergence, idempotent replay, and sweep behavior.
//!
//! These need a Postgres instance (`DATABASE_URL`); without one they
//! skip rather than fail.

mod common;

use std::sync::Arc;

use rust_decimal_macros::dec;
use serial_test::serial;
use sqlx::PgPool;

use fieldline_payments::gateway::{MockGateway, PaymentGateway};
use fieldline_payments::models::{ConfirmationKind, PaymentRequest, ProviderEvent, RequestStatus};
use fieldline_payments::repos::{payment_repo, payment_request_repo};
use fieldline_payments::services::ledger::{self, CreateRequestInput};
use fieldline_payments::{ReconcileOutcome, ReconciliationEngine};

struct Harness {
    pool: PgPool,
    gateway: Arc<MockGateway>,
    engine: ReconciliationEngine,
    tenant_id: String,
}

async fn harness(pool: PgPool) -> Harness {
    let gateway = Arc::new(MockGateway::new());
    let engine = ReconciliationEngine::new(
        pool.clone(),
        gateway.clone() as Arc<dyn PaymentGateway>,
        true,
    );

    Harness {
        pool,
        gateway,
        engine,
        tenant_id: common::test_tenant(),
    }
}

impl Harness {
    /// Create a pending request with a live provider session attached.
    async fn pending_request_with_session(
        &self,
        amount: rust_decimal::Decimal,
        order_id: Option<i64>,
    ) -> PaymentRequest {
        let request = ledger::create_payment_request(
            &self.pool,
            CreateRequestInput {
                tenant_id: self.tenant_id.clone(),
                amount,
                currency: "GBP".to_string(),
                description: "Boiler service deposit".to_string(),
                customer_email: Some("customer@example.co.uk".to_string()),
                order_id,
                job_id: None,
                checkout_reference: None,
            },
        )
        .await
        .expect("create request");

        let session = self
            .gateway
            .create_checkout(fieldline_payments::gateway::CreateCheckoutRequest {
                checkout_reference: request.checkout_reference.clone(),
                amount_minor: request.amount_minor,
                currency: request.currency.clone(),
                merchant_code: "M-TEST".to_string(),
                description: None,
                customer_email: None,
                metadata: None,
            })
            .await
            .expect("create session");

        ledger::attach_checkout_artifact(&self.pool, &self.tenant_id, request.id, &session)
            .await
            .expect("attach artifact")
    }

    fn succeeded_event(&self, request: &PaymentRequest) -> ProviderEvent {
        ProviderEvent {
            kind: ConfirmationKind::Succeeded,
            tenant_id: Some(self.tenant_id.clone()),
            payment_request_id: Some(request.id),
            provider_checkout_id: request.provider_checkout_id.clone(),
            checkout_reference: Some(request.checkout_reference.clone()),
            amount_minor: Some(request.amount_minor),
            currency: Some(request.currency.clone()),
            transaction_id: Some("txn_push".to_string()),
            receipt_url: None,
            failure_reason: None,
        }
    }

    async fn payment_count(&self, request_id: i64) -> i64 {
        payment_repo::count_for_request(&self.pool, &self.tenant_id, request_id)
            .await
            .expect("count payments")
    }

    async fn succeeded_outbox_count(&self) -> i64 {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM payments_events_outbox \
             WHERE tenant_id = $1 AND event_type = 'payment.succeeded'",
        )
        .bind(&self.tenant_id)
        .fetch_one(&self.pool)
        .await
        .expect("count outbox");
        count
    }

    async fn reload(&self, request_id: i64) -> PaymentRequest {
        payment_request_repo::fetch(&self.pool, &self.tenant_id, request_id)
            .await
            .expect("fetch request")
            .expect("request exists")
    }
}

#[tokio::test]
#[serial]
async fn push_confirmation_settles_request_exactly_once() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = harness(pool).await;

    // 49.99 GBP requested; the provider reports the checkout paid.
    let request = h.pending_request_with_session(dec!(49.99), Some(301)).await;
    assert_eq!(request.amount_minor, 4999);
    let checkout_id = request.provider_checkout_id.clone().unwrap();
    h.gateway.complete_checkout(&checkout_id);

    let event = h.succeeded_event(&request);
    let outcome = h.engine.ingest_event(&event).await.expect("ingest");
    assert_eq!(outcome, ReconcileOutcome::Confirmed);

    let reloaded = h.reload(request.id).await;
    assert_eq!(reloaded.status, RequestStatus::Paid);
    assert_eq!(h.payment_count(request.id).await, 1);
    assert_eq!(h.succeeded_outbox_count().await, 1);

    let payment = payment_repo::fetch_by_request(&h.pool, &h.tenant_id, request.id)
        .await
        .unwrap()
        .expect("ledger entry");
    assert_eq!(payment.amount_minor, 4999);
    assert_eq!(payment.order_id, Some(301));

    // Redeliver the same confirmation three more times.
    for _ in 0..3 {
        let outcome = h.engine.ingest_event(&event).await.expect("replay");
        assert_eq!(outcome, ReconcileOutcome::AlreadyProcessed);
    }

    // Still one ledger entry and one notification-driving event.
    assert_eq!(h.payment_count(request.id).await, 1);
    assert_eq!(h.succeeded_outbox_count().await, 1);
}

#[tokio::test]
#[serial]
async fn paid_requests_never_regress() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = harness(pool).await;

    let request = h.pending_request_with_session(dec!(20.00), None).await;
    let checkout_id = request.provider_checkout_id.clone().unwrap();
    h.gateway.complete_checkout(&checkout_id);

    h.engine
        .ingest_event(&h.succeeded_event(&request))
        .await
        .expect("ingest");
    assert_eq!(h.reload(request.id).await.status, RequestStatus::Paid);

    // A late failure report must not move the row.
    let mut failed = h.succeeded_event(&request);
    failed.kind = ConfirmationKind::Failed;
    failed.failure_reason = Some("card declined".to_string());

    let outcome = h.engine.ingest_event(&failed).await.expect("ingest failed");
    assert_eq!(outcome, ReconcileOutcome::AlreadyProcessed);
    assert_eq!(h.reload(request.id).await.status, RequestStatus::Paid);

    // Same through the pull path.
    h.gateway.fail_checkout(&checkout_id, "late failure");
    let outcome = h
        .engine
        .refresh_request(&h.reload(request.id).await)
        .await
        .expect("refresh");
    assert_eq!(outcome, ReconcileOutcome::AlreadyProcessed);
    assert_eq!(h.reload(request.id).await.status, RequestStatus::Paid);
}

#[tokio::test]
#[serial]
async fn concurrent_confirmations_write_one_ledger_entry() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = Arc::new(harness(pool).await);

    let request = h.pending_request_with_session(dec!(75.50), None).await;
    let checkout_id = request.provider_checkout_id.clone().unwrap();
    h.gateway.complete_checkout(&checkout_id);

    let event = h.succeeded_event(&request);

    // A webhook delivery and a poll racing on the same request.
    let h1 = h.clone();
    let h2 = h.clone();
    let e1 = event.clone();
    let r2 = request.clone();
    let push = tokio::spawn(async move { h1.engine.ingest_event(&e1).await });
    let pull = tokio::spawn(async move { h2.engine.refresh_request(&r2).await });

    let push_outcome = push.await.unwrap().expect("push path");
    let pull_outcome = pull.await.unwrap().expect("pull path");

    let confirmed = [push_outcome, pull_outcome]
        .iter()
        .filter(|o| **o == ReconcileOutcome::Confirmed)
        .count();
    assert_eq!(confirmed, 1, "exactly one path may apply the transition");

    assert_eq!(h.payment_count(request.id).await, 1);
    assert_eq!(h.succeeded_outbox_count().await, 1);
    assert_eq!(h.reload(request.id).await.status, RequestStatus::Paid);
}

#[tokio::test]
#[serial]
async fn sweep_survives_a_provider_timeout_mid_batch() {
    let Some(pool) = common::try_pool().await else {
        return;
    };

    // Park pending leftovers from earlier runs so this sweep batch only
    // contains rows this test controls.
    sqlx::query(
        "UPDATE payment_requests SET status = 'expired' \
         WHERE status = 'pending' AND provider_checkout_id IS NOT NULL",
    )
    .execute(&pool)
    .await
    .expect("clean stale pending rows");

    let h = harness(pool).await;

    let first = h.pending_request_with_session(dec!(10.00), None).await;
    let second = h.pending_request_with_session(dec!(11.00), None).await;
    let third = h.pending_request_with_session(dec!(12.00), None).await;

    h.gateway
        .complete_checkout(first.provider_checkout_id.as_deref().unwrap());
    h.gateway
        .inject_lookup_failure(second.provider_checkout_id.as_deref().unwrap());
    h.gateway
        .complete_checkout(third.provider_checkout_id.as_deref().unwrap());

    let summary = h
        .engine
        .sweep_pending()
        .await
        .expect("sweep")
        .expect("not skipped");

    assert!(summary.scanned >= 3);
    assert!(summary.errors >= 1, "the timed-out request counts as an error");
    assert_eq!(h.reload(first.id).await.status, RequestStatus::Paid);
    assert_eq!(h.reload(second.id).await.status, RequestStatus::Pending);
    assert_eq!(h.reload(third.id).await.status, RequestStatus::Paid);

    // Once the provider recovers, the next sweep settles the leftover.
    h.gateway
        .clear_lookup_failure(second.provider_checkout_id.as_deref().unwrap());
    h.gateway
        .complete_checkout(second.provider_checkout_id.as_deref().unwrap());

    h.engine
        .sweep_pending()
        .await
        .expect("second sweep")
        .expect("not skipped");
    assert_eq!(h.reload(second.id).await.status, RequestStatus::Paid);
}

#[tokio::test]
#[serial]
async fn manual_refresh_reports_updated_and_confirmed_counts() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = harness(pool).await;
    let order_id = 871;

    let paid = h
        .pending_request_with_session(dec!(30.00), Some(order_id))
        .await;
    let failed = h
        .pending_request_with_session(dec!(40.00), Some(order_id))
        .await;
    let still_pending = h
        .pending_request_with_session(dec!(50.00), Some(order_id))
        .await;

    h.gateway
        .complete_checkout(paid.provider_checkout_id.as_deref().unwrap());
    h.gateway
        .fail_checkout(failed.provider_checkout_id.as_deref().unwrap(), "declined");

    let summary = h
        .engine
        .refresh_for_target(
            &h.tenant_id,
            fieldline_payments::services::reconciliation::RefreshTarget::Order(order_id),
        )
        .await
        .expect("refresh");

    assert_eq!(summary.updated, 2);
    assert_eq!(summary.confirmed, 1);
    assert_eq!(h.reload(paid.id).await.status, RequestStatus::Paid);
    assert_eq!(h.reload(failed.id).await.status, RequestStatus::Failed);
    assert_eq!(
        h.reload(still_pending.id).await.status,
        RequestStatus::Pending
    );
}

#[tokio::test]
#[serial]
async fn paid_report_over_failed_request_is_flagged_not_applied() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = harness(pool).await;

    let request = h.pending_request_with_session(dec!(15.00), None).await;
    ledger::mark_failed(
        &h.pool,
        &h.tenant_id,
        request.id,
        Some("customer cancelled".to_string()),
    )
    .await
    .expect("mark failed");

    let checkout_id = request.provider_checkout_id.clone().unwrap();
    h.gateway.complete_checkout(&checkout_id);

    let outcome = h
        .engine
        .ingest_event(&h.succeeded_event(&request))
        .await
        .expect("ingest");

    assert_eq!(outcome, ReconcileOutcome::Conflict);
    assert_eq!(h.reload(request.id).await.status, RequestStatus::Failed);
    assert_eq!(h.payment_count(request.id).await, 0);
}

#[tokio::test]
#[serial]
async fn unmatched_events_are_acknowledged_no_ops() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = harness(pool).await;

    let event = ProviderEvent {
        kind: ConfirmationKind::Succeeded,
        tenant_id: None,
        payment_request_id: None,
        provider_checkout_id: Some("chk_from_another_install".to_string()),
        checkout_reference: Some("flp-does-not-exist".to_string()),
        amount_minor: Some(100),
        currency: Some("GBP".to_string()),
        transaction_id: None,
        receipt_url: None,
        failure_reason: None,
    };

    let outcome = h.engine.ingest_event(&event).await.expect("ingest");
    assert_eq!(outcome, ReconcileOutcome::Unmatched);
}

#[tokio::test]
#[serial]
async fn colliding_references_stay_tenant_isolated() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant_a = common::test_tenant();
    let tenant_b = common::test_tenant();
    let shared_reference = format!("dup-{}", common::test_tenant());

    let make = |tenant: String, pool: PgPool, reference: String| async move {
        ledger::create_payment_request(
            &pool,
            CreateRequestInput {
                tenant_id: tenant,
                amount: dec!(25.00),
                currency: "GBP".to_string(),
                description: "Callout fee".to_string(),
                customer_email: None,
                order_id: None,
                job_id: None,
                checkout_reference: Some(reference),
            },
        )
        .await
        .expect("create request")
    };

    let request_a = make(tenant_a.clone(), pool.clone(), shared_reference.clone()).await;
    let request_b = make(tenant_b.clone(), pool.clone(), shared_reference.clone()).await;

    let gateway = Arc::new(MockGateway::new());
    let engine =
        ReconciliationEngine::new(pool.clone(), gateway as Arc<dyn PaymentGateway>, false);

    // Confirmation addressed to tenant B must never settle tenant A's row.
    let event = ProviderEvent {
        kind: ConfirmationKind::Succeeded,
        tenant_id: Some(tenant_b.clone()),
        payment_request_id: Some(request_b.id),
        provider_checkout_id: None,
        checkout_reference: Some(shared_reference.clone()),
        amount_minor: Some(2500),
        currency: Some("GBP".to_string()),
        transaction_id: Some("txn_b".to_string()),
        receipt_url: None,
        failure_reason: None,
    };

    let outcome = engine.ingest_event(&event).await.expect("ingest");
    assert_eq!(outcome, ReconcileOutcome::Confirmed);

    let a = payment_request_repo::fetch(&pool, &tenant_a, request_a.id)
        .await
        .unwrap()
        .unwrap();
    let b = payment_request_repo::fetch(&pool, &tenant_b, request_b.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.status, RequestStatus::Pending);
    assert_eq!(b.status, RequestStatus::Paid);

    // Tenant-scoped fetch never crosses the boundary either.
    let cross = payment_request_repo::fetch(&pool, &tenant_a, request_b.id)
        .await
        .unwrap();
    assert!(cross.is_none());
}

#[tokio::test]
#[serial]
async fn stale_pending_requests_expire_on_refresh() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let h = harness(pool).await;

    let request = h.pending_request_with_session(dec!(60.00), None).await;

    // Age the expiry clock past its window; the provider still says pending.
    sqlx::query(
        "UPDATE payment_requests SET expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1",
    )
    .bind(request.id)
    .execute(&h.pool)
    .await
    .expect("age request");

    let outcome = h
        .engine
        .refresh_request(&h.reload(request.id).await)
        .await
        .expect("refresh");

    assert_eq!(outcome, ReconcileOutcome::MarkedExpired);
    assert_eq!(h.reload(request.id).await.status, RequestStatus::Expired);
    assert_eq!(h.payment_count(request.id).await, 0);
}
