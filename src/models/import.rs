use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::asset::Asset;
use crate::services::queue::{TaskId, TaskState, TaskStatus};

/// Request to import images from a shared Drive folder.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// Folder URL (`.../folders/{id}`) or a bare folder id
    #[garde(length(min = 1, max = 2048))]
    pub drive_url: String,

    #[garde(length(min = 1, max = 200))]
    pub import_name: Option<String>,

    #[garde(range(min = 1, max = 10_000))]
    pub max_images: Option<i32>,

    #[serde(default)]
    #[garde(length(max = 50), inner(length(min = 1, max = 64)))]
    pub tags: Vec<String>,
}

/// Identifiers handed back once a job has been queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedImport {
    pub job_id: Uuid,
    pub task_id: TaskId,
}

/// Response after submitting an import.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitImportResponse {
    pub success: bool,
    pub message: String,
    pub job_id: Uuid,
    pub task_id: TaskId,
}

impl From<SubmittedImport> for SubmitImportResponse {
    fn from(submitted: SubmittedImport) -> Self {
        Self {
            success: true,
            message: "Import job queued".to_string(),
            job_id: submitted.job_id,
            task_id: submitted.task_id,
        }
    }
}

/// Response for polling a queued task.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub success: bool,
    pub task_id: TaskId,
    pub state: TaskState,
    pub progress: u8,
    pub failed_reason: Option<String>,
}

impl From<TaskStatus> for TaskStatusResponse {
    fn from(status: TaskStatus) -> Self {
        Self {
            success: true,
            task_id: status.id,
            state: status.state,
            progress: status.progress,
            failed_reason: status.failed_reason,
        }
    }
}

/// Generic `{ success, data }` envelope for read endpoints.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// A page of one job's assets.
#[derive(Debug, Serialize)]
pub struct JobAssetsPage {
    pub success: bool,
    pub images: Vec<Asset>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// `?limit=&offset=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageParams {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
