//! In-memory doubles for the store and both providers, plus a harness that
//! drives queued tasks one at a time.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use drive_image_import::app_state::AppState;
use drive_image_import::db::ImportStore;
use drive_image_import::error::AppError;
use drive_image_import::models::asset::{Asset, NewAsset};
use drive_image_import::models::job::{ImportJob, JobStatus, NewImportJob};
use drive_image_import::services::drive::{DriveError, DriveFile, FolderSource};
use drive_image_import::services::orchestrator::OrchestratorOptions;
use drive_image_import::services::queue::{
    Backoff, EnqueueOptions, MemoryTaskQueue, TaskId, TaskQueue,
};
use drive_image_import::services::storage::{
    AssetStorage, DestroyOutcome, StorageError, StoredObject, UploadRequest,
};
use drive_image_import::services::worker_pool::{ProgressReporter, TaskHandler};

/// A small valid PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

pub fn drive_file(id: &str) -> DriveFile {
    DriveFile {
        id: id.to_string(),
        name: format!("{id}.png"),
        mime_type: "image/png".to_string(),
    }
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<Uuid, ImportJob>,
    assets: BTreeMap<i64, Asset>,
    next_asset_id: i64,
    transitions: Vec<(Uuid, JobStatus, JobStatus)>,
    rejected_transitions: Vec<(Uuid, JobStatus, JobStatus)>,
    /// Times imported + failed exceeded total_files
    count_violations: usize,
}

/// [`ImportStore`] that enforces the same status guards as the SQL queries.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
    failing_inserts: Mutex<HashSet<String>>,
    unavailable: Mutex<bool>,
}

impl FakeStore {
    pub fn job(&self, job_id: Uuid) -> ImportJob {
        self.state.lock().unwrap().jobs[&job_id].clone()
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.state.lock().unwrap().assets.values().cloned().collect()
    }

    pub fn assets_for(&self, job_id: Uuid) -> Vec<Asset> {
        self.assets()
            .into_iter()
            .filter(|a| a.import_job_id == job_id)
            .collect()
    }

    pub fn transitions(&self, job_id: Uuid) -> Vec<(JobStatus, JobStatus)> {
        self.state
            .lock()
            .unwrap()
            .transitions
            .iter()
            .filter(|(id, _, _)| *id == job_id)
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    /// Status changes refused because the edge is not legal.
    pub fn rejected_transitions(&self) -> Vec<(JobStatus, JobStatus)> {
        self.state
            .lock()
            .unwrap()
            .rejected_transitions
            .iter()
            .map(|(_, from, to)| (*from, *to))
            .collect()
    }

    pub fn count_violations(&self) -> usize {
        self.state.lock().unwrap().count_violations
    }

    /// Insert an asset row directly, with a chosen id.
    pub fn seed_asset(&self, id: i64, storage_key: &str) -> Asset {
        let mut state = self.state.lock().unwrap();
        let asset = Asset {
            id,
            import_job_id: Uuid::new_v4(),
            file_name: format!("seed-{id}.png"),
            source_file_id: format!("seed-{id}"),
            storage_key: storage_key.to_string(),
            url: format!("https://cdn.test/{storage_key}"),
            size: 3,
            width: None,
            height: None,
            format: "png".to_string(),
            uploaded_at: Utc::now(),
            tags: Vec::new(),
        };
        state.next_asset_id = state.next_asset_id.max(id);
        state.assets.insert(id, asset.clone());
        asset
    }

    /// Make `insert_asset` fail for this file name.
    pub fn fail_insert_for(&self, file_name: &str) {
        self.failing_inserts
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    fn check_available(&self) -> Result<(), sqlx::Error> {
        if *self.unavailable.lock().unwrap() {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }

    fn transition(&self, job_id: Uuid, next: JobStatus, apply: impl FnOnce(&mut ImportJob)) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(job) = state.jobs.get_mut(&job_id) else {
            return false;
        };
        let from = job.status;
        if !from.can_transition_to(next) {
            state.rejected_transitions.push((job_id, from, next));
            return false;
        }
        job.status = next;
        apply(job);
        state.transitions.push((job_id, from, next));
        true
    }

    fn check_counts(state: &mut StoreState, job_id: Uuid) {
        let over = state
            .jobs
            .get(&job_id)
            .is_some_and(|job| job.imported_count + job.failed_count > job.total_files);
        if over {
            state.count_violations += 1;
        }
    }
}

#[async_trait]
impl ImportStore for FakeStore {
    async fn create_job(&self, job: &NewImportJob) -> Result<ImportJob, sqlx::Error> {
        self.check_available()?;
        let created = ImportJob {
            id: Uuid::new_v4(),
            folder_id: job.folder_id.clone(),
            import_name: job.import_name.clone(),
            max_images: job.max_images,
            tags: job.tags.clone(),
            status: JobStatus::Queued,
            total_files: 0,
            imported_count: 0,
            failed_count: 0,
            error_message: None,
            created_at: Utc::now(),
            processing_started_at: None,
            completed_at: None,
        };
        self.state
            .lock()
            .unwrap()
            .jobs
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, sqlx::Error> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().jobs.get(&job_id).cloned())
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, sqlx::Error> {
        self.check_available()?;
        Ok(self.transition(job_id, JobStatus::Processing, |job| {
            job.processing_started_at.get_or_insert_with(Utc::now);
        }))
    }

    async fn set_total_files(&self, job_id: Uuid, total: i32) -> Result<(), sqlx::Error> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                job.total_files = total;
                job.imported_count = 0;
                job.failed_count = 0;
            }
        }
        Ok(())
    }

    async fn record_file_outcome(&self, job_id: Uuid, imported: bool) -> Result<(), sqlx::Error> {
        self.check_available()?;
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(&job_id) {
            if job.status == JobStatus::Processing {
                if imported {
                    job.imported_count += 1;
                } else {
                    job.failed_count += 1;
                }
            }
        }
        Self::check_counts(&mut state, job_id);
        Ok(())
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        imported_count: i32,
        failed_count: i32,
    ) -> Result<bool, sqlx::Error> {
        self.check_available()?;
        let completed = self.transition(job_id, JobStatus::Completed, |job| {
            job.imported_count = imported_count;
            job.failed_count = failed_count;
            job.error_message = None;
            job.completed_at = Some(Utc::now());
        });
        Self::check_counts(&mut self.state.lock().unwrap(), job_id);
        Ok(completed)
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        self.check_available()?;
        Ok(self.transition(job_id, JobStatus::Failed, |job| {
            job.error_message = Some(error.to_string());
            job.completed_at = Some(Utc::now());
        }))
    }

    async fn record_job_error(&self, job_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        self.check_available()?;
        if let Some(job) = self.state.lock().unwrap().jobs.get_mut(&job_id) {
            job.error_message = Some(error.to_string());
        }
        Ok(())
    }

    async fn insert_asset(&self, asset: &NewAsset) -> Result<Asset, sqlx::Error> {
        self.check_available()?;
        if self.failing_inserts.lock().unwrap().contains(&asset.file_name) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut state = self.state.lock().unwrap();
        state.next_asset_id += 1;
        let stored = Asset {
            id: state.next_asset_id,
            import_job_id: asset.import_job_id,
            file_name: asset.file_name.clone(),
            source_file_id: asset.source_file_id.clone(),
            storage_key: asset.storage_key.clone(),
            url: asset.url.clone(),
            size: asset.size,
            width: asset.width,
            height: asset.height,
            format: asset.format.clone(),
            uploaded_at: Utc::now(),
            tags: asset.tags.clone(),
        };
        state.assets.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_asset(&self, asset_id: i64) -> Result<Option<Asset>, sqlx::Error> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().assets.get(&asset_id).cloned())
    }

    async fn delete_asset(&self, asset_id: i64) -> Result<bool, sqlx::Error> {
        self.check_available()?;
        Ok(self.state.lock().unwrap().assets.remove(&asset_id).is_some())
    }

    async fn list_assets(&self, limit: i64, offset: i64) -> Result<Vec<Asset>, sqlx::Error> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .assets
            .values()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_job_assets(
        &self,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Asset>, i64), sqlx::Error> {
        self.check_available()?;
        let state = self.state.lock().unwrap();
        let all: Vec<_> = state
            .assets
            .values()
            .rev()
            .filter(|a| a.import_job_id == job_id)
            .cloned()
            .collect();
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        self.check_available()
    }
}

/// Folder listing double keyed by folder id.
#[derive(Default)]
pub struct FakeSource {
    folders: Mutex<HashMap<String, Vec<DriveFile>>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
    failing_downloads: Mutex<HashSet<String>>,
    listing_failures: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl FakeSource {
    /// Register a folder whose files all download as valid PNGs.
    pub fn add_folder(&self, folder_id: &str, file_ids: &[&str]) {
        let files: Vec<_> = file_ids.iter().map(|id| drive_file(id)).collect();
        let mut contents = self.contents.lock().unwrap();
        for file in &files {
            contents.insert(file.id.clone(), png_bytes(4, 3));
        }
        self.folders
            .lock()
            .unwrap()
            .insert(folder_id.to_string(), files);
    }

    pub fn fail_download(&self, file_id: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(file_id.to_string());
    }

    /// Make the next `count` listings fail with HTTP 503.
    pub fn fail_listings(&self, count: usize) {
        self.listing_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl FolderSource for FakeSource {
    async fn list_images(
        &self,
        folder_id: &str,
        max_images: usize,
    ) -> Result<Vec<DriveFile>, DriveError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.listing_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.listing_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DriveError::Status {
                status: 503,
                message: "Drive unavailable".to_string(),
            });
        }

        let folders = self.folders.lock().unwrap();
        let mut files = folders.get(folder_id).cloned().unwrap_or_default();
        files.truncate(max_images);
        Ok(files)
    }

    async fn download(&self, file: &DriveFile) -> Result<Vec<u8>, DriveError> {
        if self.failing_downloads.lock().unwrap().contains(&file.id) {
            return Err(DriveError::Status {
                status: 500,
                message: format!("cannot download {}", file.id),
            });
        }
        self.contents
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or_else(|| DriveError::Status {
                status: 404,
                message: "File not found".to_string(),
            })
    }
}

/// Object storage double that keeps uploads in memory.
#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing_uploads: Mutex<HashSet<String>>,
    destroy_fails: Mutex<bool>,
    destroyed: Mutex<Vec<String>>,
    uploads: AtomicUsize,
}

impl FakeStorage {
    pub fn fail_upload_for(&self, file_name: &str) {
        self.failing_uploads
            .lock()
            .unwrap()
            .insert(file_name.to_string());
    }

    pub fn set_destroy_fails(&self, fails: bool) {
        *self.destroy_fails.lock().unwrap() = fails;
    }

    pub fn put(&self, storage_key: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(storage_key.to_string(), vec![1, 2, 3]);
    }

    pub fn contains(&self, storage_key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(storage_key)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStorage for FakeStorage {
    async fn upload(&self, request: UploadRequest<'_>) -> Result<StoredObject, StorageError> {
        if self
            .failing_uploads
            .lock()
            .unwrap()
            .contains(request.file_name)
        {
            return Err(StorageError::Status(500));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        let storage_key = format!("test/{}/{n}-{}", request.job_id, request.file_name);
        self.objects
            .lock()
            .unwrap()
            .insert(storage_key.clone(), request.bytes.to_vec());

        Ok(StoredObject {
            url: format!("https://cdn.test/{storage_key}"),
            storage_key,
            byte_size: request.bytes.len() as i64,
        })
    }

    async fn destroy(&self, storage_key: &str) -> Result<DestroyOutcome, StorageError> {
        if *self.destroy_fails.lock().unwrap() {
            return Err(StorageError::Status(503));
        }
        self.destroyed.lock().unwrap().push(storage_key.to_string());
        match self.objects.lock().unwrap().remove(storage_key) {
            Some(_) => Ok(DestroyOutcome::Deleted),
            None => Ok(DestroyOutcome::AlreadyAbsent),
        }
    }
}

/// Fully wired state over the doubles and an in-process queue.
pub struct Harness {
    pub store: Arc<FakeStore>,
    pub queue: Arc<MemoryTaskQueue>,
    pub source: Arc<FakeSource>,
    pub storage: Arc<FakeStorage>,
    pub state: AppState,
}

pub const TEST_BACKOFF: Duration = Duration::from_millis(100);

impl Harness {
    pub fn new() -> Self {
        Self::with_attempts(3)
    }

    pub fn with_attempts(attempts: u32) -> Self {
        let store = Arc::new(FakeStore::default());
        let queue = Arc::new(MemoryTaskQueue::new());
        let source = Arc::new(FakeSource::default());
        let storage = Arc::new(FakeStorage::default());

        let options = OrchestratorOptions {
            default_max_images: 1000,
            enqueue_options: EnqueueOptions {
                attempts,
                backoff: Backoff::exponential(TEST_BACKOFF),
            },
        };

        let state = AppState::new(
            store.clone(),
            queue.clone(),
            source.clone(),
            storage.clone(),
            options,
        );

        Self {
            store,
            queue,
            source,
            storage,
            state,
        }
    }

    /// Reserve and settle one task the way a worker would.
    /// Returns `None` when nothing is ready.
    pub async fn run_next(&self) -> Option<(TaskId, Result<(), AppError>)> {
        let task = self.queue.reserve().await.unwrap()?;
        let reporter = ProgressReporter::new(self.queue.clone(), task.id);
        let result = self.state.orchestrator.handle(&task, &reporter).await;

        match &result {
            Ok(()) => self.queue.complete(task.id).await.unwrap(),
            Err(e) => {
                self.queue.fail(task.id, &e.to_string()).await.unwrap();
            }
        }
        Some((task.id, result))
    }

    /// Run every ready task until the queue has nothing ready.
    pub async fn drain(&self) {
        while self.run_next().await.is_some() {}
    }
}
