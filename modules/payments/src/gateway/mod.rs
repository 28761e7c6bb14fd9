//! Payment gateway adapter.
//!
//! The provider's observable contract (hosted checkout sessions with a
//! retrievable status, merchant sub-accounts with fee splits) hides
//! behind [`PaymentGateway`]. Production uses the HTTP client; tests and
//! local dev use [`MockGateway`], selected via `GATEWAY_MODE`.

pub mod client;
pub mod error;
pub mod mock;
pub mod types;
pub mod webhook;

pub use client::{GatewayConfig, HttpGateway};
pub use error::GatewayError;
pub use mock::MockGateway;
pub use types::{
    CheckoutSession, CheckoutStatus, CreateCheckoutRequest, MerchantAccountStatus, Metadata,
};

use async_trait::async_trait;

/// The external provider's observable contract, as this platform uses it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session for a payment request.
    async fn create_checkout(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Fetch the current state of a checkout session.
    async fn get_checkout(&self, checkout_id: &str) -> Result<CheckoutSession, GatewayError>;

    /// Whether a tenant's merchant sub-account can take charges/payouts.
    async fn merchant_status(
        &self,
        merchant_code: &str,
    ) -> Result<MerchantAccountStatus, GatewayError>;
}
