use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::asset::{Asset, NewAsset};
use crate::models::job::{ImportJob, NewImportJob};

/// Persistence for import jobs and their assets.
///
/// Status-changing methods return `false` when the job was not in a state
/// that allows the transition; callers treat that as a no-op.
#[async_trait]
pub trait ImportStore: Send + Sync {
    async fn create_job(&self, job: &NewImportJob) -> Result<ImportJob, sqlx::Error>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, sqlx::Error>;

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, sqlx::Error>;

    async fn set_total_files(&self, job_id: Uuid, total: i32) -> Result<(), sqlx::Error>;

    async fn record_file_outcome(&self, job_id: Uuid, imported: bool) -> Result<(), sqlx::Error>;

    async fn complete_job(
        &self,
        job_id: Uuid,
        imported_count: i32,
        failed_count: i32,
    ) -> Result<bool, sqlx::Error>;

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error>;

    async fn record_job_error(&self, job_id: Uuid, error: &str) -> Result<(), sqlx::Error>;

    async fn insert_asset(&self, asset: &NewAsset) -> Result<Asset, sqlx::Error>;

    async fn get_asset(&self, asset_id: i64) -> Result<Option<Asset>, sqlx::Error>;

    async fn delete_asset(&self, asset_id: i64) -> Result<bool, sqlx::Error>;

    async fn list_assets(&self, limit: i64, offset: i64) -> Result<Vec<Asset>, sqlx::Error>;

    async fn list_job_assets(
        &self,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Asset>, i64), sqlx::Error>;

    async fn health_check(&self) -> Result<(), sqlx::Error>;
}

/// [`ImportStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ImportStore for PgStore {
    async fn create_job(&self, job: &NewImportJob) -> Result<ImportJob, sqlx::Error> {
        queries::create_job(&self.pool, job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, sqlx::Error> {
        queries::get_job(&self.pool, job_id).await
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<bool, sqlx::Error> {
        queries::mark_processing(&self.pool, job_id).await
    }

    async fn set_total_files(&self, job_id: Uuid, total: i32) -> Result<(), sqlx::Error> {
        queries::set_total_files(&self.pool, job_id, total).await
    }

    async fn record_file_outcome(&self, job_id: Uuid, imported: bool) -> Result<(), sqlx::Error> {
        queries::record_file_outcome(&self.pool, job_id, imported).await
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        imported_count: i32,
        failed_count: i32,
    ) -> Result<bool, sqlx::Error> {
        queries::complete_job(&self.pool, job_id, imported_count, failed_count).await
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        queries::fail_job(&self.pool, job_id, error).await
    }

    async fn record_job_error(&self, job_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        queries::record_job_error(&self.pool, job_id, error).await
    }

    async fn insert_asset(&self, asset: &NewAsset) -> Result<Asset, sqlx::Error> {
        queries::insert_asset(&self.pool, asset).await
    }

    async fn get_asset(&self, asset_id: i64) -> Result<Option<Asset>, sqlx::Error> {
        queries::get_asset(&self.pool, asset_id).await
    }

    async fn delete_asset(&self, asset_id: i64) -> Result<bool, sqlx::Error> {
        queries::delete_asset(&self.pool, asset_id).await
    }

    async fn list_assets(&self, limit: i64, offset: i64) -> Result<Vec<Asset>, sqlx::Error> {
        queries::list_assets(&self.pool, limit, offset).await
    }

    async fn list_job_assets(
        &self,
        job_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Asset>, i64), sqlx::Error> {
        queries::list_job_assets(&self.pool, job_id, limit, offset).await
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}
