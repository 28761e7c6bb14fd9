use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fulfillment progression of an order. The documented path is
/// `not_ordered -> ordered -> arrived -> completed`; other transitions
/// are not forbidden, but every transition is logged in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    NotOrdered,
    Ordered,
    Arrived,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::NotOrdered => "not_ordered",
            OrderStatus::Ordered => "ordered",
            OrderStatus::Arrived => "arrived",
            OrderStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_ordered" => Ok(OrderStatus::NotOrdered),
            "ordered" => Ok(OrderStatus::Ordered),
            "arrived" => Ok(OrderStatus::Arrived),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// A fulfillment order. `status` is a cached pointer to the latest
/// history row; `amount_paid_minor` is the projection maintained from
/// payment events.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub tenant_id: String,
    pub order_number: String,
    pub status: OrderStatus,
    pub supplier: Option<String>,
    pub customer_email: Option<String>,
    pub estimated_cost_minor: i64,
    pub actual_cost_minor: Option<i64>,
    pub deposit_minor: i64,
    pub amount_paid_minor: i64,
    pub notify_on_ordered: bool,
    pub notify_on_arrival: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// What the customer still owes: cost (actual once known, estimated
    /// until then) less deposit and confirmed payments, floored at zero.
    pub fn outstanding_minor(&self) -> i64 {
        let cost = self.actual_cost_minor.unwrap_or(self.estimated_cost_minor);
        (cost - self.deposit_minor - self.amount_paid_minor).max(0)
    }
}

/// One append-only history row. Never mutated or deleted.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: i64,
    pub tenant_id: String,
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Derive the current status from the history alone. Orders start as
/// `not_ordered`, so an empty history folds to that.
pub fn fold_history(rows: &[OrderStatusHistory]) -> OrderStatus {
    rows.last()
        .map(|row| row.new_status)
        .unwrap_or(OrderStatus::NotOrdered)
}

// ============================================================================
// EVENT PAYLOADS
// ============================================================================

/// Payload for orders.events.order.status.changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedPayload {
    pub order_id: i64,
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<OrderStatus>,
    pub new_status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub changed_by: String,
    /// Whether the tenant's per-order notification flags ask for a
    /// customer notification on this change.
    pub notify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

/// Payload consumed from payments.events.payment.succeeded
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSucceededPayload {
    pub payment_id: i64,
    #[serde(default)]
    pub payment_request_id: Option<i64>,
    #[serde(default)]
    pub order_id: Option<i64>,
    #[serde(default)]
    pub job_id: Option<i64>,
    pub amount_minor: i64,
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_row(id: i64, new_status: OrderStatus) -> OrderStatusHistory {
        OrderStatusHistory {
            id,
            order_id: 1,
            tenant_id: "ten_1".to_string(),
            previous_status: None,
            new_status,
            reason: None,
            notes: None,
            changed_by: "ops@example.com".to_string(),
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            OrderStatus::NotOrdered,
            OrderStatus::Ordered,
            OrderStatus::Arrived,
            OrderStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn empty_history_folds_to_not_ordered() {
        assert_eq!(fold_history(&[]), OrderStatus::NotOrdered);
    }

    #[test]
    fn fold_tracks_the_latest_row() {
        let rows = vec![
            history_row(1, OrderStatus::Ordered),
            history_row(2, OrderStatus::Arrived),
            history_row(3, OrderStatus::Completed),
        ];
        assert_eq!(fold_history(&rows), OrderStatus::Completed);
    }

    #[test]
    fn outstanding_balance_never_goes_negative() {
        let mut order = Order {
            id: 1,
            tenant_id: "ten_1".to_string(),
            order_number: "ORD-001".to_string(),
            status: OrderStatus::Ordered,
            supplier: None,
            customer_email: None,
            estimated_cost_minor: 10_000,
            actual_cost_minor: None,
            deposit_minor: 2_500,
            amount_paid_minor: 5_000,
            notify_on_ordered: false,
            notify_on_arrival: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(order.outstanding_minor(), 2_500);

        // Actual cost takes over once known.
        order.actual_cost_minor = Some(8_000);
        assert_eq!(order.outstanding_minor(), 500);

        // Overpayment floors at zero rather than going negative.
        order.amount_paid_minor = 9_000;
        assert_eq!(order.outstanding_minor(), 0);
    }
}
