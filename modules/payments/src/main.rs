use axum::{
    routing::{get, post},
    Router,
};
use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use fieldline_payments::config::Config;
use fieldline_payments::gateway::{HttpGateway, MockGateway, PaymentGateway};
use fieldline_payments::health::health;
use fieldline_payments::metrics::Metrics;
use fieldline_payments::routes::{
    accounts::{connect_account, get_account_status},
    checkout::init_checkout,
    payment_requests::create_payment_request,
    payments::{record_manual_payment, refresh_job_payments, refresh_order_payments},
    receipts::get_receipt,
    webhooks::receive_gateway_event,
    AppState,
};
use fieldline_payments::services::sweeper::start_pending_sweeper;
use fieldline_payments::{events, ReconciliationEngine};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting payments service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Connecting to database...");
    let pool = fieldline_payments::db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .set_ignore_missing(true)
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using in-memory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = async_nats::connect(&config.nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(NatsBus::new(client))
        }
        other => panic!("Invalid BUS_TYPE: {other}. Must be 'inmemory' or 'nats'"),
    };

    let gateway: Arc<dyn PaymentGateway> = match config.gateway_mode.as_str() {
        "mock" => {
            tracing::warn!("GATEWAY_MODE=mock: no real provider calls will be made");
            Arc::new(MockGateway::new())
        }
        _ => Arc::new(HttpGateway::from_env().expect("Failed to configure gateway client")),
    };

    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(ReconciliationEngine::new(
        pool.clone(),
        gateway,
        config.verify_events,
    ));

    // Outbox relay: committed ledger events reach the bus from here.
    let relay_pool = pool.clone();
    let relay_bus = bus.clone();
    tokio::spawn(async move {
        if let Err(e) = events::start_outbox_relay(relay_pool, relay_bus).await {
            tracing::error!(error = %e, "outbox relay stopped");
        }
    });

    // Pull path: periodic sweep over pending requests.
    start_pending_sweeper(
        engine.clone(),
        metrics.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let state = AppState {
        pool: pool.clone(),
        engine,
        metrics: metrics.clone(),
        webhook_secret: config.webhook_secret.clone(),
        platform_fee_bps: config.platform_fee_bps,
    };

    let metrics_for_route = metrics.clone();
    let app = Router::new()
        .route("/api/health", get(health))
        .route(
            "/metrics",
            get(move || {
                let metrics = metrics_for_route.clone();
                async move { metrics.render().unwrap_or_default() }
            }),
        )
        .route("/api/webhooks/gateway", post(receive_gateway_event))
        .route("/api/payment-requests", post(create_payment_request))
        .route("/api/payments", post(record_manual_payment))
        .route(
            "/api/payments/orders/{order_id}/refresh",
            post(refresh_order_payments),
        )
        .route(
            "/api/payments/jobs/{job_id}/refresh",
            post(refresh_job_payments),
        )
        .route("/api/checkout/{checkout_reference}", get(init_checkout))
        .route("/api/receipts/{provider_ref}", get(get_receipt))
        .route(
            "/api/tenants/{tenant_id}/gateway/account",
            get(get_account_status).put(connect_account),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Payments service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
