use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::asset::{Asset, NewAsset};
use crate::models::job::{ImportJob, JobStatus, NewImportJob};

fn job_from_row(row: &PgRow) -> Result<ImportJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let tags: Json<Vec<String>> = row.try_get("tags")?;

    Ok(ImportJob {
        id: row.try_get("id")?,
        folder_id: row.try_get("folder_id")?,
        import_name: row.try_get("import_name")?,
        max_images: row.try_get("max_images")?,
        tags: tags.0,
        status,
        total_files: row.try_get("total_files")?,
        imported_count: row.try_get("imported_count")?,
        failed_count: row.try_get("failed_count")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        processing_started_at: row.try_get("processing_started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn asset_from_row(row: &PgRow) -> Result<Asset, sqlx::Error> {
    let tags: Json<Vec<String>> = row.try_get("tags")?;

    Ok(Asset {
        id: row.try_get("id")?,
        import_job_id: row.try_get("import_job_id")?,
        file_name: row.try_get("file_name")?,
        source_file_id: row.try_get("source_file_id")?,
        storage_key: row.try_get("storage_key")?,
        url: row.try_get("url")?,
        size: row.try_get("size")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        format: row.try_get("format")?,
        uploaded_at: row.try_get("uploaded_at")?,
        tags: tags.0,
    })
}

/// Insert a new import job in the QUEUED state
pub async fn create_job(pool: &PgPool, job: &NewImportJob) -> Result<ImportJob, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO import_jobs (folder_id, import_name, max_images, tags, status)
        VALUES ($1, $2, $3, $4, 'QUEUED')
        RETURNING id, folder_id, import_name, max_images, tags, status, total_files,
                  imported_count, failed_count, error_message, created_at,
                  processing_started_at, completed_at
        "#,
    )
    .bind(&job.folder_id)
    .bind(&job.import_name)
    .bind(job.max_images)
    .bind(Json(&job.tags))
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ImportJob>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, folder_id, import_name, max_images, tags, status, total_files,
               imported_count, failed_count, error_message, created_at,
               processing_started_at, completed_at
        FROM import_jobs
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Move a QUEUED (or retried PROCESSING) job into PROCESSING.
/// Returns false if the job is missing or already terminal.
pub async fn mark_processing(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'PROCESSING',
            processing_started_at = COALESCE(processing_started_at, NOW()),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('QUEUED', 'PROCESSING')
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record how many files the listing produced and reset per-attempt counters
pub async fn set_total_files(pool: &PgPool, job_id: Uuid, total: i32) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET total_files = $2,
            imported_count = 0,
            failed_count = 0,
            updated_at = NOW()
        WHERE id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(job_id)
    .bind(total)
    .execute(pool)
    .await?;

    Ok(())
}

/// Count one file attempt against the running job
pub async fn record_file_outcome(
    pool: &PgPool,
    job_id: Uuid,
    imported: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET imported_count = imported_count + CASE WHEN $2 THEN 1 ELSE 0 END,
            failed_count = failed_count + CASE WHEN $2 THEN 0 ELSE 1 END,
            updated_at = NOW()
        WHERE id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(job_id)
    .bind(imported)
    .execute(pool)
    .await?;

    Ok(())
}

/// PROCESSING -> COMPLETED with final counts
pub async fn complete_job(
    pool: &PgPool,
    job_id: Uuid,
    imported_count: i32,
    failed_count: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'COMPLETED',
            imported_count = $2,
            failed_count = $3,
            error_message = NULL,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(job_id)
    .bind(imported_count)
    .bind(failed_count)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// PROCESSING -> FAILED with a human-readable reason
pub async fn fail_job(pool: &PgPool, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET status = 'FAILED',
            error_message = $2,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'PROCESSING'
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Store the latest error without changing status (attempt will be retried)
pub async fn record_job_error(pool: &PgPool, job_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE import_jobs
        SET error_message = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert an imported image
pub async fn insert_asset(pool: &PgPool, asset: &NewAsset) -> Result<Asset, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO images (import_job_id, file_name, source_file_id, storage_key, url,
                            size, width, height, format, tags)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, import_job_id, file_name, source_file_id, storage_key, url,
                  size, width, height, format, uploaded_at, tags
        "#,
    )
    .bind(asset.import_job_id)
    .bind(&asset.file_name)
    .bind(&asset.source_file_id)
    .bind(&asset.storage_key)
    .bind(&asset.url)
    .bind(asset.size)
    .bind(asset.width)
    .bind(asset.height)
    .bind(&asset.format)
    .bind(Json(&asset.tags))
    .fetch_one(pool)
    .await?;

    asset_from_row(&row)
}

/// Get an image by ID
pub async fn get_asset(pool: &PgPool, asset_id: i64) -> Result<Option<Asset>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, import_job_id, file_name, source_file_id, storage_key, url,
               size, width, height, format, uploaded_at, tags
        FROM images
        WHERE id = $1
        "#,
    )
    .bind(asset_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(asset_from_row).transpose()
}

/// Delete an image row. Returns false if it did not exist.
pub async fn delete_asset(pool: &PgPool, asset_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM images WHERE id = $1")
        .bind(asset_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Latest images across all jobs, newest first
pub async fn list_assets(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Asset>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, import_job_id, file_name, source_file_id, storage_key, url,
               size, width, height, format, uploaded_at, tags
        FROM images
        ORDER BY uploaded_at DESC, id DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(asset_from_row).collect()
}

/// One page of a job's images plus the job's total image count
pub async fn list_job_assets(
    pool: &PgPool,
    job_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Asset>, i64), sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, import_job_id, file_name, source_file_id, storage_key, url,
               size, width, height, format, uploaded_at, tags
        FROM images
        WHERE import_job_id = $1
        ORDER BY uploaded_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(job_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE import_job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await?;

    let assets = rows.iter().map(asset_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok((assets, total))
}
