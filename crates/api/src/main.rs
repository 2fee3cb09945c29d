use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genqueue_api::config::{LogFormat, ServerConfig};
use genqueue_api::engine;
use genqueue_api::router::build_app_router;
use genqueue_api::state::AppState;
use genqueue_core::clip::ClipStore;
use genqueue_db::store::PgClipStore;
use genqueue_pipeline::health::HealthMonitor;
use genqueue_pipeline::memory_store::MemoryClipStore;
use genqueue_pipeline::service::GenerationService;

const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const PERSISTENCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "genqueue_api=debug,genqueue_pipeline=debug,genqueue_backend=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
    tracing::info!(
        host = %config.host,
        port = config.port,
        backends = config.backends.len(),
        "Loaded server configuration",
    );

    // --- Clip store ---
    let (pool, clips) = match &config.database_url {
        Some(url) => {
            let pool = genqueue_db::create_pool(url)
                .await
                .expect("Failed to connect to database");
            genqueue_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database connection pool created");
            let store: Arc<dyn ClipStore> = Arc::new(PgClipStore::new(pool.clone()));
            (Some(pool), store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory clip store");
            let store: Arc<dyn ClipStore> = Arc::new(MemoryClipStore::permissive());
            (None, store)
        }
    };

    // --- Generation pipeline ---
    let service = engine::build_service(&config, Arc::clone(&clips))
        .await
        .expect("Failed to build generation pipeline");
    let queue = Arc::clone(service.queue());

    let cancel = CancellationToken::new();

    let persistence_handle = tokio::spawn(GenerationService::run_result_persistence(
        clips,
        queue.completed_results().await,
    ));

    let dispatcher_handle = tokio::spawn(Arc::clone(&queue).run(cancel.clone()));

    let monitor = HealthMonitor::new(Arc::clone(&queue), config.health_check_interval);
    let monitor_cancel = cancel.clone();
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_cancel).await;
    });

    tracing::info!("Background services started (dispatcher, health monitor, result persistence)");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        service,
        pool,
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

    // Stops the dispatcher and the monitor; in-flight jobs get a backend cancel.
    cancel.cancel();
    let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, dispatcher_handle).await;
    let _ = tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, monitor_handle).await;
    tracing::info!("Dispatcher and health monitor stopped");

    // Persistence exits once the result channel is closed and drained.
    queue.close_results().await;
    match tokio::time::timeout(PERSISTENCE_DRAIN_TIMEOUT, persistence_handle).await {
        Ok(_) => tracing::info!("Result persistence drained"),
        Err(_) => tracing::warn!(
            timeout_secs = PERSISTENCE_DRAIN_TIMEOUT.as_secs(),
            "Result persistence did not drain in time",
        ),
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
