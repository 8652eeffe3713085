use axum::extract::{Path, Query, State};
use axum::Json;

use crate::app_state::AppState;
use crate::error::AppError;
use crate::models::asset::Asset;
use crate::models::import::{DataResponse, MessageResponse, PageParams};

/// GET /api/images?limit=&offset=: newest imported images first.
pub async fn list_images(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> Result<Json<DataResponse<Vec<Asset>>>, AppError> {
    let images = state.orchestrator.list_assets(page).await?;
    Ok(Json(DataResponse::new(images)))
}

/// DELETE /api/images/{id}
///
/// The row is gone when this returns; the stored object is removed by a
/// background task.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, AppError> {
    state.orchestrator.delete_asset(id).await?;

    Ok(Json(MessageResponse {
        success: true,
        message: "Image deleted".to_string(),
    }))
}
