use async_trait::async_trait;
use garde::Validate;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::db::ImportStore;
use crate::error::AppError;
use crate::models::asset::{Asset, NewAsset};
use crate::models::import::{ImportRequest, PageParams, SubmittedImport};
use crate::models::job::{ImportJob, NewImportJob};
use crate::services::drive::{DriveFile, FolderSource};
use crate::services::folder_ref::parse_folder_id;
use crate::services::image_probe;
use crate::services::queue::{
    DeletePayload, EnqueueOptions, ImportPayload, Task, TaskId, TaskPayload, TaskQueue,
};
use crate::services::storage::{AssetStorage, DestroyOutcome, UploadRequest};
use crate::services::worker_pool::{ProgressReporter, TaskHandler};

/// Recorded on a job whose folder listing came back empty.
pub const NO_IMAGES_FOUND: &str = "No images found";

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Cap applied when a submission leaves `maxImages` unset
    pub default_max_images: i32,
    /// Policy for every task this orchestrator enqueues
    pub enqueue_options: EnqueueOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            default_max_images: 1000,
            enqueue_options: EnqueueOptions::default(),
        }
    }
}

/// Owns the import job lifecycle: submission, background processing,
/// asset deletion and the read side over jobs and assets.
pub struct JobOrchestrator {
    store: Arc<dyn ImportStore>,
    queue: Arc<dyn TaskQueue>,
    source: Arc<dyn FolderSource>,
    storage: Arc<dyn AssetStorage>,
    options: OrchestratorOptions,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn ImportStore>,
        queue: Arc<dyn TaskQueue>,
        source: Arc<dyn FolderSource>,
        storage: Arc<dyn AssetStorage>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            store,
            queue,
            source,
            storage,
            options,
        }
    }

    /// Validate a request, persist a QUEUED job and enqueue its IMPORT task.
    pub async fn submit(&self, request: ImportRequest) -> Result<SubmittedImport, AppError> {
        request
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;
        let folder_id = parse_folder_id(&request.drive_url).ok_or_else(|| {
            AppError::InvalidInput("Invalid Google Drive folder URL".to_string())
        })?;

        let job = self
            .store
            .create_job(&NewImportJob {
                folder_id,
                import_name: request.import_name,
                max_images: request
                    .max_images
                    .unwrap_or(self.options.default_max_images),
                tags: request.tags,
            })
            .await?;

        let payload = TaskPayload::Import(ImportPayload {
            job_id: job.id,
            folder_id: job.folder_id.clone(),
            max_images: job.max_images,
        });

        // QUEUED -> FAILED is not a legal edge, so the row is left as is.
        let handle = self
            .queue
            .enqueue(payload, self.options.enqueue_options)
            .await
            .inspect_err(|e| {
                tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue import task");
            })?;

        metrics::counter!("import_jobs_submitted_total").increment(1);
        tracing::info!(
            job_id = %job.id,
            task_id = %handle.id,
            folder_id = %job.folder_id,
            max_images = job.max_images,
            "Import job queued"
        );

        Ok(SubmittedImport {
            job_id: job.id,
            task_id: handle.id,
        })
    }

    /// Remove an asset row now and its stored object in the background.
    pub async fn delete_asset(&self, asset_id: i64) -> Result<TaskId, AppError> {
        let asset = self
            .store
            .get_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {asset_id}")))?;

        let handle = self
            .queue
            .enqueue(
                TaskPayload::Delete(DeletePayload {
                    asset_id,
                    storage_key: asset.storage_key.clone(),
                }),
                self.options.enqueue_options,
            )
            .await?;

        if !self.store.delete_asset(asset_id).await? {
            tracing::warn!(asset_id, "Image row was already gone");
        }

        metrics::counter!("asset_deletions_total").increment(1);
        tracing::info!(
            asset_id,
            task_id = %handle.id,
            storage_key = %asset.storage_key,
            "Image deleted, storage cleanup queued"
        );

        Ok(handle.id)
    }

    /// Run one attempt of an IMPORT task.
    ///
    /// Per-file failures are counted on the job. Anything that stops the whole
    /// attempt is written to the job and returned so the queue can retry.
    pub async fn process_import(
        &self,
        task: &Task,
        payload: &ImportPayload,
        progress: &ProgressReporter,
    ) -> Result<(), AppError> {
        let job_id = payload.job_id;

        let Some(job) = self.store.get_job(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Import job no longer exists, skipping");
            return Ok(());
        };
        if job.status.is_terminal() {
            tracing::warn!(job_id = %job_id, status = %job.status, "Import job already finished, skipping");
            return Ok(());
        }

        let started = Instant::now();
        let result = self.run_import(&job, payload, progress).await;
        metrics::histogram!("import_job_processing_seconds").record(started.elapsed().as_secs_f64());

        let Err(err) = result else {
            return Ok(());
        };

        let message = err.to_string();
        if task.is_final_attempt() {
            match self.store.fail_job(job_id, &message).await {
                Ok(true) => {
                    metrics::counter!("import_jobs_failed_total").increment(1);
                    tracing::error!(job_id = %job_id, error = %err, "Import job failed");
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to mark job failed");
                }
            }
        } else if let Err(e) = self.store.record_job_error(job_id, &message).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job error");
        }

        Err(err)
    }

    async fn run_import(
        &self,
        job: &ImportJob,
        payload: &ImportPayload,
        progress: &ProgressReporter,
    ) -> Result<(), AppError> {
        if !self.store.mark_processing(job.id).await? {
            tracing::warn!(job_id = %job.id, "Import job left the runnable states, skipping");
            return Ok(());
        }

        let cap = usize::try_from(payload.max_images).unwrap_or(0);
        let files = self.source.list_images(&payload.folder_id, cap).await?;

        if files.is_empty() {
            if self.store.fail_job(job.id, NO_IMAGES_FOUND).await? {
                metrics::counter!("import_jobs_failed_total").increment(1);
            }
            tracing::info!(job_id = %job.id, folder_id = %payload.folder_id, "No images found in folder");
            return Ok(());
        }

        let total = files.len();
        self.store
            .set_total_files(job.id, i32::try_from(total).unwrap_or(i32::MAX))
            .await?;
        tracing::info!(job_id = %job.id, total_files = total, "Importing folder");

        let mut imported_count = 0;
        let mut failed_count = 0;

        for (index, file) in files.iter().enumerate() {
            let imported = match self.import_file(job, file).await {
                Ok(asset) => {
                    imported_count += 1;
                    metrics::counter!("import_files_imported_total").increment(1);
                    tracing::debug!(
                        job_id = %job.id,
                        asset_id = asset.id,
                        file_name = %file.name,
                        "File imported"
                    );
                    true
                }
                Err(e) => {
                    failed_count += 1;
                    metrics::counter!("import_files_failed_total").increment(1);
                    tracing::warn!(
                        job_id = %job.id,
                        file_id = %file.id,
                        file_name = %file.name,
                        error = %e,
                        "Failed to import file"
                    );
                    false
                }
            };

            self.store.record_file_outcome(job.id, imported).await?;
            progress.report(percent_complete(index + 1, total)).await;
        }

        if self
            .store
            .complete_job(job.id, imported_count, failed_count)
            .await?
        {
            metrics::counter!("import_jobs_completed_total").increment(1);
        }

        tracing::info!(
            job_id = %job.id,
            imported_count,
            failed_count,
            "Import job completed"
        );
        Ok(())
    }

    async fn import_file(&self, job: &ImportJob, file: &DriveFile) -> Result<Asset, AppError> {
        let bytes = self.source.download(file).await?;
        let info = image_probe::probe(&bytes);
        let content_type = info.content_type(&file.mime_type);

        let stored = self
            .storage
            .upload(UploadRequest {
                job_id: job.id,
                file_name: &file.name,
                bytes: &bytes,
                content_type: &content_type,
            })
            .await?;

        let new_asset = NewAsset {
            import_job_id: job.id,
            file_name: file.name.clone(),
            source_file_id: file.id.clone(),
            storage_key: stored.storage_key.clone(),
            url: stored.url,
            size: stored.byte_size,
            width: info.width(),
            height: info.height(),
            format: info.format_name(&file.mime_type),
            tags: job.tags.clone(),
        };

        match self.store.insert_asset(&new_asset).await {
            Ok(asset) => Ok(asset),
            Err(e) => {
                if let Err(destroy_err) = self.storage.destroy(&stored.storage_key).await {
                    tracing::warn!(
                        job_id = %job.id,
                        storage_key = %stored.storage_key,
                        error = %destroy_err,
                        "Failed to remove orphaned upload"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Run a DELETE task. Provider errors are logged and swallowed.
    pub async fn process_delete(&self, payload: &DeletePayload) -> Result<(), AppError> {
        match self.storage.destroy(&payload.storage_key).await {
            Ok(DestroyOutcome::Deleted) => {
                tracing::info!(asset_id = payload.asset_id, storage_key = %payload.storage_key, "Stored object removed");
            }
            Ok(DestroyOutcome::AlreadyAbsent) => {
                tracing::info!(asset_id = payload.asset_id, storage_key = %payload.storage_key, "Stored object already absent");
            }
            Err(e) => {
                tracing::warn!(
                    asset_id = payload.asset_id,
                    storage_key = %payload.storage_key,
                    error = %e,
                    "Failed to remove stored object"
                );
            }
        }
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<ImportJob, AppError> {
        self.store
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Import job {job_id}")))
    }

    /// Newest assets across all jobs.
    pub async fn list_assets(&self, page: PageParams) -> Result<Vec<Asset>, AppError> {
        Ok(self.store.list_assets(page.limit(), page.offset()).await?)
    }

    /// One page of a job's assets and the job's total asset count.
    pub async fn list_job_assets(
        &self,
        job_id: Uuid,
        page: PageParams,
    ) -> Result<(Vec<Asset>, i64), AppError> {
        self.get_job(job_id).await?;
        Ok(self
            .store
            .list_job_assets(job_id, page.limit(), page.offset())
            .await?)
    }
}

#[async_trait]
impl TaskHandler for JobOrchestrator {
    async fn handle(&self, task: &Task, progress: &ProgressReporter) -> Result<(), AppError> {
        match &task.payload {
            TaskPayload::Import(payload) => self.process_import(task, payload, progress).await,
            TaskPayload::Delete(payload) => self.process_delete(payload).await,
        }
    }
}

/// `round(done / total * 100)`, clamped to 100.
pub fn percent_complete(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (done as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}
