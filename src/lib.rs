//! Google Drive image import pipeline
//!
//! Accepts import requests for shared Drive folders, queues them as
//! background tasks, and copies each image into S3-compatible storage while
//! recording jobs and assets in PostgreSQL. The API process and the worker
//! process share this library; see `src/main.rs` and `src/bin/worker.rs`.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod shutdown;
pub mod telemetry;
