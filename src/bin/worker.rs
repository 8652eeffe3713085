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

    tracing::info!("Starting import worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    if config.queue_backend == QueueBackend::Memory {
        tracing::error!("QUEUE_BACKEND=memory runs workers inside the API process; nothing to do");
        std::process::exit(1);
    }

    let prometheus = Arc::new(
        telemetry::install_metrics().expect("Failed to install Prometheus metrics recorder"),
    );

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let state = app_state::build(&config, db_pool).expect("Failed to initialize services");

    let (stop_tx, stop_rx) = watch::channel(false);

    // Health and metrics listener
    let listener = tokio::net::TcpListener::bind(&config.worker_health_addr)
        .await
        .expect("Failed to bind worker health address");
    tracing::info!("Worker health endpoint listening on {}", config.worker_health_addr);

    let ops = routes::ops_router(state.clone(), prometheus);
    let mut ops_stop = stop_rx.clone();
    let ops_server = tokio::spawn(async move {
        let served = axum::serve(listener, ops)
            .with_graceful_shutdown(async move {
                let _ = ops_stop.wait_for(|stop| *stop).await;
            })
            .await;
        if let Err(e) = served {
            tracing::error!(error = %e, "Worker health endpoint failed");
        }
    });

    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    tracing::info!(
        concurrency = config.worker_concurrency,
        "Worker ready, starting task processing loop"
    );

    let mut pool_stop = stop_rx;
    WorkerPool::new(
        Arc::clone(&state.queue),
        state.orchestrator.clone(),
        config.worker_concurrency,
        config.poll_interval(),
    )
    .run(async move {
        let _ = pool_stop.wait_for(|stop| *stop).await;
    })
    .await;

    let _ = ops_server.await;
    tracing::info!("Worker stopped");
}
