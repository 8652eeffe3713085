use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

/// JSON logs filtered by `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Install the global Prometheus recorder and describe the pipeline metrics.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_counter!("import_jobs_submitted_total", "Import jobs accepted and queued");
    metrics::describe_counter!(
        "import_jobs_completed_total",
        "Import jobs that finished with per-file counts"
    );
    metrics::describe_counter!(
        "import_jobs_failed_total",
        "Import jobs that ended FAILED"
    );
    metrics::describe_counter!(
        "import_files_imported_total",
        "Files uploaded and recorded as assets"
    );
    metrics::describe_counter!(
        "import_files_failed_total",
        "Files that failed to download, upload or persist"
    );
    metrics::describe_counter!(
        "asset_deletions_total",
        "Assets deleted through the API"
    );
    metrics::describe_histogram!(
        "import_job_processing_seconds",
        metrics::Unit::Seconds,
        "Wall time of one import task attempt"
    );
    metrics::describe_gauge!(
        "import_queue_depth",
        "Tasks waiting to run, including those in retry backoff"
    );
}
