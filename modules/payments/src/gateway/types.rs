use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form metadata attached to a checkout session. The platform always
/// embeds `tenant_id` and `payment_request_id` here so confirmations
/// correlate without any scanning.
pub type Metadata = HashMap<String, String>;

pub const META_TENANT_ID: &str = "tenant_id";
pub const META_PAYMENT_REQUEST_ID: &str = "payment_request_id";

/// Provider-side status of a hosted checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

/// A hosted checkout session as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub checkout_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub status: CheckoutStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Request body for creating a hosted checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckoutRequest {
    pub checkout_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub merchant_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Capability snapshot of a tenant's connected merchant sub-account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantAccountStatus {
    pub merchant_code: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
}
