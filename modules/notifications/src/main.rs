use axum::{
    routing::{get, post},
    Router,
};
use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use fieldline_notifications::config::Config;
use fieldline_notifications::health::health;
use fieldline_notifications::notifier::{LogNotifier, Notifier};
use fieldline_notifications::routes::{list_deliveries, resend_delivery, AppState};
use fieldline_notifications::start_consumers;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting notifications service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Connecting to database...");
    let pool = fieldline_notifications::db::init_pool(&config.database_url)
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

    // Delivery mechanics are external; the log notifier stands in for the
    // mail/SMS integration.
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

    start_consumers(bus.clone(), pool.clone(), notifier.clone()).await;

    let state = AppState {
        pool: pool.clone(),
        notifier,
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/notifications", get(list_deliveries))
        .route("/api/notifications/{id}/resend", post(resend_delivery))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Notifications service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
