use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of an import job, stored verbatim in `import_jobs.status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Legal edges of `QUEUED -> PROCESSING -> {COMPLETED, FAILED}`.
    ///
    /// `PROCESSING -> PROCESSING` is allowed: a retried task re-enters the
    /// processing state without moving the job backward.
    ///
    /// The database enforces the same edges through the `WHERE status IN (...)`
    /// guards in `db::queries` (`mark_processing`, `complete_job`, `fail_job`);
    /// this is the in-memory statement of that table, used by store doubles
    /// and kept in step with those queries.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

/// One user-initiated batch import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub folder_id: String,
    pub import_name: Option<String>,
    pub max_images: i32,
    pub tags: Vec<String>,
    pub status: JobStatus,
    pub total_files: i32,
    pub imported_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when a job is first persisted.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub folder_id: String,
    pub import_name: Option<String>,
    pub max_images: i32,
    pub tags: Vec<String>,
}
