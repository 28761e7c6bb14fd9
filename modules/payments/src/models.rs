use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// LEDGER ROWS
// ============================================================================

/// Lifecycle of a requested charge. `Pending` is the only non-terminal
/// state; once a request leaves it, it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Paid => "paid",
            RequestStatus::Failed => "failed",
            RequestStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "paid" => Ok(RequestStatus::Paid),
            "failed" => Ok(RequestStatus::Failed),
            "expired" => Ok(RequestStatus::Expired),
            other => Err(format!("unknown payment request status '{other}'")),
        }
    }
}

/// How a ledger entry was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Provider,
    Other,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Provider => "provider",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "provider" => Ok(PaymentMethod::Provider),
            "other" => Ok(PaymentMethod::Other),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// A requested charge. One row per checkout the platform asked a customer
/// to complete; `checkout_reference` is unique per tenant and is the
/// correlation key recoverable from the customer-facing payment link.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub id: i64,
    pub tenant_id: String,
    pub checkout_reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub customer_email: Option<String>,
    pub order_id: Option<i64>,
    pub job_id: Option<i64>,
    pub provider_checkout_id: Option<String>,
    pub status: RequestStatus,
    pub payment_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A confirmed charge. Created exactly once per reconciled
/// PaymentRequest; manual (cash/bank) payments carry no request id.
#[derive(Debug, Clone)]
pub struct Payment {
    pub id: i64,
    pub tenant_id: String,
    pub payment_request_id: Option<i64>,
    pub order_id: Option<i64>,
    pub job_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub provider_payment_reference: Option<String>,
    pub receipt_url: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A tenant's connected provider sub-account.
#[derive(Debug, Clone)]
pub struct TenantGatewayAccount {
    pub tenant_id: String,
    pub merchant_code: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// INBOUND CONFIRMATION EVENTS
// ============================================================================

/// What an inbound provider event claims happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationKind {
    Succeeded,
    Failed,
    Expired,
}

/// A normalized provider confirmation event, as fed into the
/// reconciliation engine by the webhook route.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub kind: ConfirmationKind,
    pub tenant_id: Option<String>,
    pub payment_request_id: Option<i64>,
    pub provider_checkout_id: Option<String>,
    pub checkout_reference: Option<String>,
    pub amount_minor: Option<i64>,
    pub currency: Option<String>,
    pub transaction_id: Option<String>,
    pub receipt_url: Option<String>,
    pub failure_reason: Option<String>,
}

// ============================================================================
// OUTGOING EVENT PAYLOADS
// ============================================================================

/// Payload for payments.events.payment.succeeded
///
/// Manual (cash/bank) payments also emit this event so the order payment
/// projection stays complete; those carry no request id or reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSucceededPayload {
    pub payment_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_request_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_reference: Option<String>,
    pub method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_url: Option<String>,
}

/// Payload for payments.events.payment.failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentFailedPayload {
    pub payment_request_id: i64,
    pub checkout_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub failure_reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            RequestStatus::Pending,
            RequestStatus::Paid,
            RequestStatus::Failed,
            RequestStatus::Expired,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!("cancelled".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(RequestStatus::Paid.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::Expired.is_terminal());
    }

    #[test]
    fn method_round_trips_through_strings() {
        for method in [
            PaymentMethod::Cash,
            PaymentMethod::Card,
            PaymentMethod::BankTransfer,
            PaymentMethod::Provider,
            PaymentMethod::Other,
        ] {
            assert_eq!(method.as_str().parse::<PaymentMethod>(), Ok(method));
        }
    }
}
