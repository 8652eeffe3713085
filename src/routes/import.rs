use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::import::{
    DataResponse, ImportRequest, JobAssetsPage, PageParams, SubmitImportResponse,
    TaskStatusResponse,
};
use crate::models::job::ImportJob;

/// POST /api/import: queue a Drive folder import and return immediately.
pub async fn submit_import(
    State(state): State<AppState>,
    payload: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitImportResponse>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let submitted = state.orchestrator.submit(request).await?;

    Ok((StatusCode::ACCEPTED, Json(submitted.into())))
}

/// GET /api/import/status/{task_id}
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let status = state.status.task_status(&task_id).await?;
    Ok(Json(status.into()))
}

/// GET /api/import/jobs/{job_id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<DataResponse<ImportJob>>, AppError> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.orchestrator.get_job(job_id).await?;
    Ok(Json(DataResponse::new(job)))
}

/// GET /api/import/jobs/{job_id}/images?limit=&offset=
pub async fn list_job_images(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<JobAssetsPage>, AppError> {
    let job_id = parse_job_id(&job_id)?;
    let (images, total) = state.orchestrator.list_job_assets(job_id, page).await?;

    Ok(Json(JobAssetsPage {
        success: true,
        images,
        total,
        limit: page.limit(),
        offset: page.offset(),
    }))
}

fn parse_job_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("Import job {raw}")))
}
