use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// INCOMING EVENT PAYLOADS
// ============================================================================

/// Payload consumed from payments.events.payment.succeeded
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSucceededPayload {
    pub payment_id: i64,
    #[serde(default)]
    pub payment_request_id: Option<i64>,
    #[serde(default)]
    pub checkout_reference: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub job_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub receipt_url: Option<String>,
}

/// Payload consumed from payments.events.payment.failed
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentFailedPayload {
    pub payment_request_id: i64,
    #[serde(default)]
    pub checkout_reference: Option<String>,
    #[serde(default)]
    pub order_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    pub failure_reason: String,
}

/// Payload consumed from orders.events.order.status.changed
#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusChangedPayload {
    pub order_id: i64,
    pub order_number: String,
    pub new_status: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub changed_by: String,
    /// Producer-side gating from the per-order notification flags.
    pub notify: bool,
    #[serde(default)]
    pub customer_email: Option<String>,
}

// ============================================================================
// DELIVERY LOG
// ============================================================================

/// Delivery state of one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    /// No usable recipient; nothing was attempted.
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            "skipped" => Ok(DeliveryStatus::Skipped),
            other => Err(format!("unknown delivery status '{other}'")),
        }
    }
}

/// One row in the delivery log: enough context for a manual resend.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationDelivery {
    pub id: i64,
    pub tenant_id: String,
    pub channel: String,
    pub recipient: Option<String>,
    pub template: String,
    pub entity_type: String,
    pub entity_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
}

/// A rendered notification ready for a delivery channel.
#[derive(Debug, Clone)]
pub struct OutboundNotification {
    pub tenant_id: String,
    pub channel: String,
    pub recipient: String,
    pub template: String,
    pub subject_line: String,
    pub entity_type: String,
    pub entity_id: String,
}
