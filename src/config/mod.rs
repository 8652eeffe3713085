use serde::Deserialize;
use std::time::Duration;
use strum::Display;

use crate::services::queue::{Backoff, EnqueueOptions};

/// Which queue implementation backs the task pipeline.
#[derive(Debug, Clone, Copy, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueueBackend {
    /// Shared Redis queue; API and worker run as separate processes.
    Redis,
    /// In-process queue; the API process also runs the worker pool.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Bind address for the worker's health and metrics listener
    #[serde(default = "default_worker_health_addr")]
    pub worker_health_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the task queue
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_queue_backend")]
    pub queue_backend: QueueBackend,

    /// Google API key with Drive read access to shared folders
    pub google_api_key: String,

    /// Drive REST base URL (overridable for tests and proxies)
    #[serde(default = "default_drive_api_base")]
    pub drive_api_base: String,

    /// S3 bucket name
    pub s3_bucket: String,

    /// S3-compatible endpoint URL
    pub s3_endpoint: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    /// Use path-style bucket addressing (MinIO and most self-hosted stores)
    #[serde(default)]
    pub s3_path_style: bool,

    /// Object key prefix for imported images
    #[serde(default = "default_s3_key_prefix")]
    pub s3_key_prefix: String,

    /// Public (CDN) base URL that stored keys are appended to
    pub public_base_url: String,

    /// Maximum number of concurrently active tasks per worker process
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Idle sleep between empty queue polls
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Request timeout applied to every Drive and S3 call
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    /// Attempts per task before it is marked failed
    #[serde(default = "default_task_attempts")]
    pub task_attempts: u32,

    /// Base delay of the exponential retry backoff
    #[serde(default = "default_task_backoff_ms")]
    pub task_backoff_ms: u64,

    /// How long a reserved task may go without a progress report before
    /// another worker may reclaim it
    #[serde(default = "default_task_lease_secs")]
    pub task_lease_secs: u64,

    /// Item cap used when a submission does not specify one
    #[serde(default = "default_max_images")]
    pub default_max_images: i32,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_worker_health_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_queue_backend() -> QueueBackend {
    QueueBackend::Redis
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_s3_region() -> String {
    "auto".to_string()
}

fn default_s3_key_prefix() -> String {
    "image-import-system".to_string()
}

fn default_worker_concurrency() -> usize {
    5
}

fn default_worker_poll_interval_ms() -> u64 {
    1000
}

fn default_provider_timeout_secs() -> u64 {
    30
}

fn default_task_attempts() -> u32 {
    3
}

fn default_task_backoff_ms() -> u64 {
    5000
}

fn default_task_lease_secs() -> u64 {
    300
}

fn default_max_images() -> i32 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn task_lease(&self) -> Duration {
        Duration::from_secs(self.task_lease_secs.max(1))
    }

    /// Queue policy applied to every task this process enqueues.
    pub fn enqueue_options(&self) -> EnqueueOptions {
        EnqueueOptions {
            attempts: self.task_attempts.max(1),
            backoff: Backoff::exponential(Duration::from_millis(self.task_backoff_ms)),
        }
    }
}
