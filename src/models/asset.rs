use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An imported image stored with the object-storage provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: i64,
    pub import_job_id: Uuid,
    pub file_name: String,
    pub source_file_id: String,
    pub storage_key: String,
    pub url: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: String,
    pub uploaded_at: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// Row written after a file has been uploaded.
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub import_job_id: Uuid,
    pub file_name: String,
    pub source_file_id: String,
    pub storage_key: String,
    pub url: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: String,
    pub tags: Vec<String>,
}
