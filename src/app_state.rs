use sqlx::PgPool;
use std::sync::Arc;

use crate::config::{AppConfig, QueueBackend};
use crate::db::{ImportStore, PgStore};
use crate::services::{
    drive::{DriveClient, DriveError, FolderSource},
    orchestrator::{JobOrchestrator, OrchestratorOptions},
    queue::{MemoryTaskQueue, QueueError, RedisTaskQueue, TaskQueue},
    status::StatusService,
    storage::{AssetStorage, S3Settings, S3Storage, StorageError},
};

/// Shared application state passed to all route handlers and workers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ImportStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub status: StatusService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ImportStore>,
        queue: Arc<dyn TaskQueue>,
        source: Arc<dyn FolderSource>,
        storage: Arc<dyn AssetStorage>,
        options: OrchestratorOptions,
    ) -> Self {
        let orchestrator = JobOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            source,
            storage,
            options,
        );

        Self {
            status: StatusService::new(Arc::clone(&queue)),
            store,
            queue,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to initialize Drive client: {0}")]
    Drive(#[from] DriveError),

    #[error("Failed to initialize object storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to initialize task queue: {0}")]
    Queue(#[from] QueueError),
}

/// Wire the production store, queue and providers from configuration.
pub fn build(config: &AppConfig, pool: PgPool) -> Result<AppState, BootstrapError> {
    let queue: Arc<dyn TaskQueue> = match config.queue_backend {
        QueueBackend::Redis => {
            tracing::info!("Using Redis task queue");
            Arc::new(RedisTaskQueue::new(&config.redis_url)?.with_lease(config.task_lease()))
        }
        QueueBackend::Memory => {
            tracing::info!("Using in-process task queue");
            Arc::new(MemoryTaskQueue::new().with_lease(config.task_lease()))
        }
    };

    tracing::info!("Initializing Google Drive client");
    let source = DriveClient::new(
        &config.drive_api_base,
        &config.google_api_key,
        config.provider_timeout(),
    )?;

    tracing::info!(bucket = %config.s3_bucket, "Initializing S3 storage client");
    let storage = S3Storage::new(&S3Settings {
        bucket: config.s3_bucket.clone(),
        endpoint: config.s3_endpoint.clone(),
        region: config.s3_region.clone(),
        access_key: config.s3_access_key.clone(),
        secret_key: config.s3_secret_key.clone(),
        path_style: config.s3_path_style,
        key_prefix: config.s3_key_prefix.clone(),
        public_base_url: config.public_base_url.clone(),
        timeout: config.provider_timeout(),
    })?;

    let options = OrchestratorOptions {
        default_max_images: config.default_max_images,
        enqueue_options: config.enqueue_options(),
    };

    Ok(AppState::new(
        Arc::new(PgStore::new(pool)),
        queue,
        Arc::new(source),
        Arc::new(storage),
        options,
    ))
}
