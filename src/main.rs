use drive_image_import::{
    app_state,
    config::{AppConfig, QueueBackend},
    db, routes, shutdown,
    services::worker_pool::WorkerPool,
    telemetry,
};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    telemetry::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!(queue_backend = %config.queue_backend, "Initializing drive-image-import server");

    let prometheus = Arc::new(
        telemetry::install_metrics().expect("Failed to install Prometheus metrics recorder"),
    );

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let state = app_state::build(&config, db_pool).expect("Failed to initialize services");

    let (stop_tx, stop_rx) = watch::channel(false);

    // The in-process queue is only visible to this process, so it also runs the workers.
    let workers = match config.queue_backend {
        QueueBackend::Memory => {
            let pool = WorkerPool::new(
                Arc::clone(&state.queue),
                state.orchestrator.clone(),
                config.worker_concurrency,
                config.poll_interval(),
            );
            let mut stop_rx = stop_rx.clone();
            Some(tokio::spawn(pool.run(async move {
                let _ = stop_rx.wait_for(|stop| *stop).await;
            })))
        }
        QueueBackend::Redis => None,
    };

    let app = routes::router(state, prometheus);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown::shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .await
        .expect("Server error");

    if let Some(workers) = workers {
        if let Err(e) = workers.await {
            tracing::error!(error = %e, "Worker pool terminated abnormally");
        }
    }

    tracing::info!("Server stopped");
}
