//! Integration tests for the order lifecycle and the payment projection.

mod common;

use event_bus::BusMessage;
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

use fieldline_orders::events::EventConsumer;
use fieldline_orders::models::{fold_history, Order, OrderStatus};
use fieldline_orders::repos::order_repo;
use fieldline_orders::services::lifecycle::{
    self, CreateOrderInput, LifecycleError, TransitionInput,
};

async fn seed_order(pool: &PgPool, tenant_id: &str, notify_on_arrival: bool) -> Order {
    lifecycle::create_order(
        pool,
        CreateOrderInput {
            tenant_id: tenant_id.to_string(),
            order_number: format!("ORD-{}", &Uuid::new_v4().simple().to_string()[..8]),
            supplier: Some("Plumb Supplies Ltd".to_string()),
            customer_email: Some("customer@example.co.uk".to_string()),
            estimated_cost_minor: 25_000,
            deposit_minor: 5_000,
            notify_on_ordered: false,
            notify_on_arrival,
        },
    )
    .await
    .expect("create order")
}

fn transition_input(order: &Order, status: &str) -> TransitionInput {
    TransitionInput {
        tenant_id: order.tenant_id.clone(),
        order_id: order.id,
        new_status: status.to_string(),
        changed_by: "ops@fieldline.app".to_string(),
        reason: Some("supplier confirmed".to_string()),
        notes: None,
    }
}

#[tokio::test]
#[serial]
async fn transitions_append_history_and_move_the_cached_status() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let order = seed_order(&pool, &tenant, false).await;

    assert_eq!(order.status, OrderStatus::NotOrdered);

    let order = lifecycle::transition(&pool, transition_input(&order, "ordered"))
        .await
        .expect("to ordered");
    assert_eq!(order.status, OrderStatus::Ordered);

    let order = lifecycle::transition(&pool, transition_input(&order, "arrived"))
        .await
        .expect("to arrived");
    let order = lifecycle::transition(&pool, transition_input(&order, "completed"))
        .await
        .expect("to completed");

    let history = order_repo::list_history(&pool, &tenant, order.id)
        .await
        .expect("history");

    assert_eq!(history.len(), 3);
    assert_eq!(history[0].previous_status, Some(OrderStatus::NotOrdered));
    assert_eq!(history[0].new_status, OrderStatus::Ordered);
    assert_eq!(history[1].previous_status, Some(OrderStatus::Ordered));
    assert_eq!(history[2].new_status, OrderStatus::Completed);

    // The append-only log reproduces the cached status exactly.
    let current = order_repo::fetch(&pool, &tenant, order.id)
        .await
        .unwrap()
        .unwrap()
        .status;
    assert_eq!(fold_history(&history), current);
}

#[tokio::test]
#[serial]
async fn unknown_status_is_rejected_with_no_history_row() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let order = seed_order(&pool, &tenant, false).await;

    let result = lifecycle::transition(&pool, transition_input(&order, "teleported")).await;
    assert!(matches!(result, Err(LifecycleError::UnknownStatus(_))));

    let history = order_repo::list_history(&pool, &tenant, order.id)
        .await
        .expect("history");
    assert!(history.is_empty(), "rejected transitions leave no trace");
}

#[tokio::test]
#[serial]
async fn order_numbers_are_unique_per_tenant_only() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant_a = common::test_tenant();
    let tenant_b = common::test_tenant();

    let make = |tenant: String| CreateOrderInput {
        tenant_id: tenant,
        order_number: "ORD-SHARED".to_string(),
        supplier: None,
        customer_email: None,
        estimated_cost_minor: 1_000,
        deposit_minor: 0,
        notify_on_ordered: false,
        notify_on_arrival: false,
    };

    lifecycle::create_order(&pool, make(tenant_a.clone()))
        .await
        .expect("first");

    assert!(matches!(
        lifecycle::create_order(&pool, make(tenant_a)).await,
        Err(LifecycleError::DuplicateOrderNumber(_))
    ));

    // Same number under another tenant is a different namespace.
    assert!(lifecycle::create_order(&pool, make(tenant_b)).await.is_ok());
}

#[tokio::test]
#[serial]
async fn notification_gating_follows_the_per_order_flags() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let order = seed_order(&pool, &tenant, true).await;

    let order = lifecycle::transition(&pool, transition_input(&order, "ordered"))
        .await
        .expect("to ordered");
    lifecycle::transition(&pool, transition_input(&order, "arrived"))
        .await
        .expect("to arrived");

    #[derive(sqlx::FromRow)]
    struct OutboxRow {
        payload: serde_json::Value,
    }

    let rows: Vec<OutboxRow> = sqlx::query_as(
        "SELECT payload FROM orders_events_outbox \
         WHERE tenant_id = $1 AND event_type = 'order.status.changed' \
         ORDER BY occurred_at",
    )
    .bind(&tenant)
    .fetch_all(&pool)
    .await
    .expect("outbox rows");

    assert_eq!(rows.len(), 2);
    // notify_on_ordered is off, notify_on_arrival is on.
    assert_eq!(rows[0].payload["new_status"], "ordered");
    assert_eq!(rows[0].payload["notify"], false);
    assert_eq!(rows[1].payload["new_status"], "arrived");
    assert_eq!(rows[1].payload["notify"], true);
}

#[tokio::test]
#[serial]
async fn redelivered_payment_events_apply_to_the_projection_once() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant = common::test_tenant();
    let order = seed_order(&pool, &tenant, false).await;

    let event_id = Uuid::new_v4();
    let envelope = serde_json::json!({
        "event_id": event_id,
        "occurred_at": chrono::Utc::now().to_rfc3339(),
        "tenant_id": tenant,
        "source_module": "payments",
        "source_version": "0.4.1",
        "payload": {
            "payment_id": 9001,
            "payment_request_id": 17,
            "order_id": order.id,
            "amount_minor": 4_999,
            "currency": "GBP"
        }
    });
    let msg = BusMessage::new(
        "payments.events.payment.succeeded",
        serde_json::to_vec(&envelope).unwrap(),
    );

    let consumer = EventConsumer::new(pool.clone());

    // First delivery applies; the redeliveries dedupe on event_id.
    for _ in 0..3 {
        fieldline_orders::consumer_task::process_payment_succeeded(&consumer, &pool, &msg)
            .await
            .expect("process");
    }

    let reloaded = order_repo::fetch(&pool, &tenant, order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.amount_paid_minor, 4_999);
    // 25_000 estimated - 5_000 deposit - 4_999 paid
    assert_eq!(reloaded.outstanding_minor(), 15_001);
}

#[tokio::test]
#[serial]
async fn payment_projection_is_tenant_scoped() {
    let Some(pool) = common::try_pool().await else {
        return;
    };
    let tenant_a = common::test_tenant();
    let tenant_b = common::test_tenant();
    let order = seed_order(&pool, &tenant_a, false).await;

    // An event for the same order id under a different tenant is a no-op.
    let applied = order_repo::apply_payment(&pool, &tenant_b, order.id, 10_000)
        .await
        .expect("apply");
    assert!(!applied);

    let reloaded = order_repo::fetch(&pool, &tenant_a, order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.amount_paid_minor, 0);
}
