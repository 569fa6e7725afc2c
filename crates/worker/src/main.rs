use std::sync::Arc;
use std::time::Duration;

use nrc_events::store::PgStore;
use nrc_events::{broker, EventBus, NotificationStore, SubscriptionIndex};
use nrc_worker::shutdown::shutdown_signal;
use nrc_worker::{telemetry, BackgroundServices, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    telemetry::init("nrc_worker=debug,nrc_events=debug");

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        broker_url = config.dispatch.broker_url.as_deref().unwrap_or("DATABASE_URL"),
        concurrency = config.dispatch.dispatch_concurrency,
        "Loaded worker configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = nrc_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    nrc_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    nrc_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Broker ---
    if config.dispatch.uses_memory_broker() {
        tracing::warn!(
            "BROKER_URL is memory://; a standalone worker only sees jobs enqueued in this process"
        );
    }
    let broker = broker::open(
        config.dispatch.broker_url.as_deref(),
        &pool,
        config.dispatch.delivery_lease(),
    )
    .await
    .expect("Failed to connect to broker");

    // --- Engine ---
    let store: Arc<dyn NotificationStore> = Arc::new(PgStore::new(pool));
    let index = Arc::new(SubscriptionIndex::new(
        Arc::clone(&store),
        config.dispatch.index_staleness(),
    ));
    let events = Arc::new(EventBus::default());

    let services = BackgroundServices::start(store, index, broker, events, &config)
        .expect("Failed to build outbound HTTP client");

    shutdown_signal().await;

    services
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;
    tracing::info!("Worker shut down");
}
