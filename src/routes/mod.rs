pub mod health;
pub mod images;
pub mod import;
pub mod metrics;

use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Import requests are small JSON documents.
const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Public API served by the API process.
pub fn router(state: AppState, prometheus: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/api/import", post(import::submit_import))
        .route("/api/import/google-drive", post(import::submit_import))
        .route("/api/import/status/{task_id}", get(import::task_status))
        .route("/api/import/jobs/{job_id}", get(import::get_job))
        .route("/api/import/jobs/{job_id}/images", get(import::list_job_images))
        .route("/api/images", get(images::list_images))
        .route("/api/images/{id}", delete(images::delete_image))
        .route("/health", get(health::health_check))
        .with_state(state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}

/// Health and metrics only, served by worker processes.
pub fn ops_router(state: AppState, prometheus: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .with_state(state)
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
}
