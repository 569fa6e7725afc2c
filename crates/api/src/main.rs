use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nrc_core::permissions;
use nrc_events::store::PgStore;
use nrc_events::{broker, EventBus, NotificationStore, PublishPipeline, SubscriptionIndex};
use nrc_worker::shutdown::shutdown_signal;
use nrc_worker::{telemetry, BackgroundServices};

use nrc_api::config::ServerConfig;
use nrc_api::router::build_app_router;
use nrc_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    telemetry::init("nrc_api=debug,nrc_events=debug,tower_http=debug");

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        embedded_dispatcher = config.embedded_dispatcher,
        "Loaded server configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = nrc_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    nrc_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    nrc_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Routing engine ---
    let dispatch = &config.worker.dispatch;
    if dispatch.uses_memory_broker() {
        tracing::warn!(
            "BROKER_URL is memory://; queued dispatch jobs are lost on restart, use for development only"
        );
        if !config.embedded_dispatcher {
            tracing::warn!(
                "BROKER_URL is memory:// but the dispatcher is not embedded; published notifications will not be delivered"
            );
        }
    }
    let broker = broker::open(dispatch.broker_url.as_deref(), &pool, dispatch.delivery_lease())
        .await
        .expect("Failed to connect to broker");

    let pg_store = PgStore::new(pool);
    let store: Arc<dyn NotificationStore> = Arc::new(pg_store.clone());
    let index = Arc::new(SubscriptionIndex::new(
        Arc::clone(&store),
        dispatch.index_staleness(),
    ));
    let pipeline = if dispatch.uses_store_queue() {
        tracing::info!("Dispatch jobs are queued in the notification database");
        PublishPipeline::with_outbox(pg_store)
    } else {
        PublishPipeline::new(Arc::clone(&store), Arc::clone(&broker))
    };

    let background = if config.embedded_dispatcher {
        let events = Arc::new(EventBus::default());
        let services = BackgroundServices::start(
            Arc::clone(&store),
            Arc::clone(&index),
            broker,
            events,
            &config.worker,
        )
        .expect("Failed to build outbound HTTP client");
        Some(services)
    } else {
        None
    };

    // --- App state ---
    let state = AppState {
        store,
        index,
        pipeline,
        config: Arc::new(config.clone()),
        capabilities: permissions::scope_policy(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    if let Some(services) = background {
        services
            .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
            .await;
    }

    tracing::info!("Graceful shutdown complete");
}
