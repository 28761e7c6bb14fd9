//! Scriptable in-memory gateway for tests and local development.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::error::GatewayError;
use super::types::{CheckoutSession, CheckoutStatus, CreateCheckoutRequest, MerchantAccountStatus};
use super::PaymentGateway;

/// In-memory [`PaymentGateway`]: sessions live in a map, tests flip their
/// status and inject per-checkout failures to exercise the poll paths.
#[derive(Default)]
pub struct MockGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    failing_checkouts: Mutex<HashSet<String>>,
    counter: AtomicU64,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a session to PAID with a synthetic transaction reference.
    pub fn complete_checkout(&self, checkout_id: &str) {
        let mut sessions = self.sessions.lock().expect("mock gateway lock");
        if let Some(session) = sessions.get_mut(checkout_id) {
            session.status = CheckoutStatus::Paid;
            session.transaction_id = Some(format!("txn_{checkout_id}"));
            session.receipt_url = Some(format!("https://receipts.example/{checkout_id}"));
        }
    }

    pub fn fail_checkout(&self, checkout_id: &str, reason: &str) {
        let mut sessions = self.sessions.lock().expect("mock gateway lock");
        if let Some(session) = sessions.get_mut(checkout_id) {
            session.status = CheckoutStatus::Failed;
            session.failure_reason = Some(reason.to_string());
        }
    }

    pub fn expire_checkout(&self, checkout_id: &str) {
        let mut sessions = self.sessions.lock().expect("mock gateway lock");
        if let Some(session) = sessions.get_mut(checkout_id) {
            session.status = CheckoutStatus::Expired;
        }
    }

    /// Make every `get_checkout` for this id fail with a timeout-shaped
    /// transport error until cleared.
    pub fn inject_lookup_failure(&self, checkout_id: &str) {
        self.failing_checkouts
            .lock()
            .expect("mock gateway lock")
            .insert(checkout_id.to_string());
    }

    pub fn clear_lookup_failure(&self, checkout_id: &str) {
        self.failing_checkouts
            .lock()
            .expect("mock gateway lock")
            .remove(checkout_id);
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let id = format!("mock_chk_{}", self.counter.fetch_add(1, Ordering::SeqCst));
        let session = CheckoutSession {
            id: id.clone(),
            checkout_reference: request.checkout_reference,
            amount_minor: request.amount_minor,
            currency: request.currency,
            status: CheckoutStatus::Pending,
            payment_link: Some(format!("https://pay.example/c/{id}")),
            transaction_id: None,
            receipt_url: None,
            failure_reason: None,
            metadata: request.metadata,
        };

        self.sessions
            .lock()
            .expect("mock gateway lock")
            .insert(id, session.clone());

        Ok(session)
    }

    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutSession, GatewayError> {
        if self
            .failing_checkouts
            .lock()
            .expect("mock gateway lock")
            .contains(checkout_id)
        {
            return Err(GatewayError::Http(format!(
                "timed out fetching checkout {checkout_id}"
            )));
        }

        self.sessions
            .lock()
            .expect("mock gateway lock")
            .get(checkout_id)
            .cloned()
            .ok_or(GatewayError::Api {
                status_code: 404,
                message: format!("checkout {checkout_id} not found"),
            })
    }

    async fn merchant_status(
        &self,
        merchant_code: &str,
    ) -> Result<MerchantAccountStatus, GatewayError> {
        Ok(MerchantAccountStatus {
            merchant_code: merchant_code.to_string(),
            charges_enabled: true,
            payouts_enabled: true,
            disabled_reason: None,
        })
    }
}
