//! Integration tests for notification dispatch: once-per-event delivery,
//! non-fatal failure recording, and manual resend.

mod common;

use event_bus::BusMessage;
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

use fieldline_notifications::events::EventConsumer;
use fieldline_notifications::models::{DeliveryStatus, NotificationDelivery};
use fieldline_notifications::notifier::StubNotifier;
use fieldline_notifications::repos::delivery_repo;

fn payment_succeeded_msg(tenant_id: &str, event_id: Uuid, email: Option<&str>) -> BusMessage {
    let envelope = serde_json::json!({
        "event_id": event_id,
        "occurred_at": chrono::Utc::now().to_rfc3339(),
        "tenant_id": tenant_id,
        "source_module": "payments",
        "source_version": "0.4.1",
        "payload": {
            "payment_id": 31,
            "payment_request_id": 8,
            "checkout_reference": "flp-1a2b3c",
            "order_id": 5,
            "amount_minor": 4999,
            "currency": "GBP",
            "customer_email": email,
        }
    });

    BusMessage::new(
        "payments.events.payment.succeeded",
        serde_json::to_vec(&envelope).unwrap(),
    )
}

async fn deliveries(pool: &PgPool, tenant_id: &str) -> Vec<NotificationDelivery> {
    delivery_repo::list_for_tenant(pool, tenant_id, 50)
        .await
        .expect("list deliveries")
}

async fn process(
    pool: &PgPool,
    consumer: &EventConsumer,
    notifier: &StubNotifier,
    msg: &BusMessage,
) {
    consumer
        .process_idempotent(
            msg,
            |payload: fieldline_notifications::models::PaymentSucceededPayload, metadata| async move {
                fieldline_notifications::handlers::handle_payment_succeeded(
                    pool, notifier, payload, metadata,
                )
                .await
            },
        )
        .await
        .expect("process event");
}

#[tokio::test]
#[serial]
async fn replayed_event_dispatches_exactly_once() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let consumer = EventConsumer::new(pool.clone());
    let notifier = StubNotifier::new();

    let msg = payment_succeeded_msg(&tenant, Uuid::new_v4(), Some("c@example.co.uk"));

    for _ in 0..4 {
        process(&pool, &consumer, &notifier, &msg).await;
    }

    assert_eq!(notifier.sends(), 1, "one dispatch attempt per event");
    let rows = deliveries(&pool, &tenant).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::Sent);
    assert_eq!(rows[0].recipient.as_deref(), Some("c@example.co.uk"));
    assert_eq!(rows[0].template, "payment_receipt");
}

#[tokio::test]
#[serial]
async fn channel_failure_is_recorded_not_raised() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let consumer = EventConsumer::new(pool.clone());
    let notifier = StubNotifier::new();
    notifier.set_failing(true);

    let msg = payment_succeeded_msg(&tenant, Uuid::new_v4(), Some("c@example.co.uk"));
    process(&pool, &consumer, &notifier, &msg).await;

    let rows = deliveries(&pool, &tenant).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::Failed);
    assert!(rows[0].error.is_some());

    // The event counts as processed: recovery goes through resend, not
    // through redelivery.
    process(&pool, &consumer, &notifier, &msg).await;
    assert_eq!(notifier.sends(), 1);
}

#[tokio::test]
#[serial]
async fn missing_recipient_is_skipped_with_context() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let consumer = EventConsumer::new(pool.clone());
    let notifier = StubNotifier::new();

    let msg = payment_succeeded_msg(&tenant, Uuid::new_v4(), None);
    process(&pool, &consumer, &notifier, &msg).await;

    assert_eq!(notifier.sends(), 0);
    let rows = deliveries(&pool, &tenant).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DeliveryStatus::Skipped);
    assert_eq!(rows[0].entity_type, "payment");
}

#[tokio::test]
#[serial]
async fn failed_delivery_can_be_resent() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let consumer = EventConsumer::new(pool.clone());
    let notifier = StubNotifier::new();
    notifier.set_failing(true);

    let msg = payment_succeeded_msg(&tenant, Uuid::new_v4(), Some("c@example.co.uk"));
    process(&pool, &consumer, &notifier, &msg).await;

    let failed = &deliveries(&pool, &tenant).await[0];
    assert_eq!(failed.status, DeliveryStatus::Failed);

    // The channel recovers; a manual attempt goes through.
    notifier.set_failing(false);
    let notification = fieldline_notifications::models::OutboundNotification {
        tenant_id: tenant.clone(),
        channel: failed.channel.clone(),
        recipient: failed.recipient.clone().unwrap(),
        template: failed.template.clone(),
        subject_line: "[resend] payment_receipt".to_string(),
        entity_type: failed.entity_type.clone(),
        entity_id: failed.entity_id.clone(),
    };
    use fieldline_notifications::notifier::Notifier as _;
    notifier.send(&notification).await.expect("resend");

    let updated = delivery_repo::record_attempt(
        &pool,
        &tenant,
        failed.id,
        DeliveryStatus::Sent,
        None,
    )
    .await
    .expect("record attempt")
    .expect("row exists");

    assert_eq!(updated.status, DeliveryStatus::Sent);
    assert_eq!(updated.attempts, 2);
}
