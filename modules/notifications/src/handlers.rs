//! Event handlers: render, dispatch, record.
//!
//! Dispatch failure is recorded and swallowed here. A notification is a
//! consequence of already-committed ledger/order state; nothing that
//! happens in this module may flow back into that state, so handlers
//! return Ok even when the channel is down and leave recovery to the
//! manual resend endpoint.

use sqlx::PgPool;

use crate::events::EnvelopeMetadata;
use crate::models::{
    DeliveryStatus, OrderStatusChangedPayload, OutboundNotification, PaymentFailedPayload,
    PaymentSucceededPayload,
};
use crate::notifier::Notifier;
use crate::repos::delivery_repo;

pub const CHANNEL_EMAIL: &str = "email";

/// Render the receipt notification for a confirmed payment.
pub fn render_payment_succeeded(
    tenant_id: &str,
    payload: &PaymentSucceededPayload,
) -> Option<OutboundNotification> {
    let recipient = payload.customer_email.clone()?;
    Some(OutboundNotification {
        tenant_id: tenant_id.to_string(),
        channel: CHANNEL_EMAIL.to_string(),
        recipient,
        template: "payment_receipt".to_string(),
        subject_line: "Your payment was received".to_string(),
        entity_type: "payment".to_string(),
        entity_id: payload.payment_id.to_string(),
    })
}

/// Render the failure notice for a declined payment.
pub fn render_payment_failed(
    tenant_id: &str,
    payload: &PaymentFailedPayload,
) -> Option<OutboundNotification> {
    let recipient = payload.customer_email.clone()?;
    Some(OutboundNotification {
        tenant_id: tenant_id.to_string(),
        channel: CHANNEL_EMAIL.to_string(),
        recipient,
        template: "payment_failed".to_string(),
        subject_line: "There was a problem with your payment".to_string(),
        entity_type: "payment_request".to_string(),
        entity_id: payload.payment_request_id.to_string(),
    })
}

/// Render the status-change notice for an order, honoring the
/// producer-side notify gate.
pub fn render_order_status_changed(
    tenant_id: &str,
    payload: &OrderStatusChangedPayload,
) -> Option<OutboundNotification> {
    if !payload.notify {
        return None;
    }
    let recipient = payload.customer_email.clone()?;
    let template = match payload.new_status.as_str() {
        "ordered" => "order_placed",
        "arrived" => "order_arrived",
        _ => return None,
    };
    Some(OutboundNotification {
        tenant_id: tenant_id.to_string(),
        channel: CHANNEL_EMAIL.to_string(),
        recipient,
        template: template.to_string(),
        subject_line: format!("Update on order {}", payload.order_number),
        entity_type: "order".to_string(),
        entity_id: payload.order_id.to_string(),
    })
}

pub async fn handle_payment_succeeded(
    pool: &PgPool,
    notifier: &dyn Notifier,
    payload: PaymentSucceededPayload,
    metadata: EnvelopeMetadata,
) -> anyhow::Result<()> {
    match render_payment_succeeded(&metadata.tenant_id, &payload) {
        Some(notification) => dispatch(pool, notifier, notification).await,
        None => {
            record_skip(
                pool,
                &metadata.tenant_id,
                "payment_receipt",
                "payment",
                &payload.payment_id.to_string(),
            )
            .await
        }
    }
}

pub async fn handle_payment_failed(
    pool: &PgPool,
    notifier: &dyn Notifier,
    payload: PaymentFailedPayload,
    metadata: EnvelopeMetadata,
) -> anyhow::Result<()> {
    match render_payment_failed(&metadata.tenant_id, &payload) {
        Some(notification) => dispatch(pool, notifier, notification).await,
        None => {
            record_skip(
                pool,
                &metadata.tenant_id,
                "payment_failed",
                "payment_request",
                &payload.payment_request_id.to_string(),
            )
            .await
        }
    }
}

pub async fn handle_order_status_changed(
    pool: &PgPool,
    notifier: &dyn Notifier,
    payload: OrderStatusChangedPayload,
    metadata: EnvelopeMetadata,
) -> anyhow::Result<()> {
    let Some(notification) = render_order_status_changed(&metadata.tenant_id, &payload) else {
        // Gated off, or a status with no customer-facing notice.
        return Ok(());
    };
    dispatch(pool, notifier, notification).await
}

/// Send and record one notification. The delivery log row is written for
/// both outcomes so staff can see and resend failures.
pub async fn dispatch(
    pool: &PgPool,
    notifier: &dyn Notifier,
    notification: OutboundNotification,
) -> anyhow::Result<()> {
    let (status, error) = match notifier.send(&notification).await {
        Ok(_message_id) => (DeliveryStatus::Sent, None),
        Err(e) => {
            tracing::warn!(
                tenant_id = %notification.tenant_id,
                entity_type = %notification.entity_type,
                entity_id = %notification.entity_id,
                template = %notification.template,
                error = %e,
                "notification dispatch failed; recorded for manual resend"
            );
            (DeliveryStatus::Failed, Some(e.to_string()))
        }
    };

    delivery_repo::insert(
        pool,
        delivery_repo::NewDelivery {
            tenant_id: &notification.tenant_id,
            channel: &notification.channel,
            recipient: Some(&notification.recipient),
            template: &notification.template,
            entity_type: &notification.entity_type,
            entity_id: &notification.entity_id,
            status,
            error: error.as_deref(),
        },
    )
    .await?;

    Ok(())
}

async fn record_skip(
    pool: &PgPool,
    tenant_id: &str,
    template: &str,
    entity_type: &str,
    entity_id: &str,
) -> anyhow::Result<()> {
    tracing::warn!(
        tenant_id,
        entity_type,
        entity_id,
        template,
        "no customer contact on file; notification skipped"
    );

    delivery_repo::insert(
        pool,
        delivery_repo::NewDelivery {
            tenant_id,
            channel: CHANNEL_EMAIL,
            recipient: None,
            template,
            entity_type,
            entity_id,
            status: DeliveryStatus::Skipped,
            error: Some("no recipient on file"),
        },
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded_payload(email: Option<&str>) -> PaymentSucceededPayload {
        PaymentSucceededPayload {
            payment_id: 7,
            payment_request_id: Some(3),
            checkout_reference: Some("flp-abc".to_string()),
            order_id: Some(12),
            job_id: None,
            amount_minor: 4999,
            currency: "GBP".to_string(),
            customer_email: email.map(String::from),
            receipt_url: None,
        }
    }

    #[test]
    fn receipt_targets_the_paying_customer() {
        let n = render_payment_succeeded("ten_1", &succeeded_payload(Some("c@example.com")))
            .expect("renders");
        assert_eq!(n.recipient, "c@example.com");
        assert_eq!(n.template, "payment_receipt");
        assert_eq!(n.entity_id, "7");
    }

    #[test]
    fn receipt_without_contact_renders_nothing() {
        assert!(render_payment_succeeded("ten_1", &succeeded_payload(None)).is_none());
    }

    fn order_payload(notify: bool, status: &str) -> OrderStatusChangedPayload {
        OrderStatusChangedPayload {
            order_id: 12,
            order_number: "ORD-009".to_string(),
            new_status: status.to_string(),
            reason: None,
            changed_by: "ops@example.com".to_string(),
            notify,
            customer_email: Some("c@example.com".to_string()),
        }
    }

    #[test]
    fn order_notice_honors_the_notify_gate() {
        assert!(render_order_status_changed("ten_1", &order_payload(false, "arrived")).is_none());
        let n = render_order_status_changed("ten_1", &order_payload(true, "arrived"))
            .expect("renders");
        assert_eq!(n.template, "order_arrived");
    }

    #[test]
    fn only_placed_and_arrival_notify() {
        assert!(render_order_status_changed("ten_1", &order_payload(true, "completed")).is_none());
        assert_eq!(
            render_order_status_changed("ten_1", &order_payload(true, "ordered"))
                .unwrap()
                .template,
            "order_placed"
        );
    }
}
