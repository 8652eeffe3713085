use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::drive::DriveError;
use crate::services::queue::QueueError;
use crate::services::storage::StorageError;

/// Failure at an external provider boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error(transparent)]
    Drive(#[from] DriveError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors surfaced by the import services and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl From<DriveError> for AppError {
    fn from(err: DriveError) -> Self {
        AppError::Provider(err.into())
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        AppError::Provider(err.into())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Persistence(_) | AppError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show callers; infrastructure details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidInput(_) | AppError::NotFound(_) => self.to_string(),
            AppError::Provider(_) => "Upstream provider request failed".to_string(),
            AppError::Persistence(_) | AppError::Queue(_) => "Internal Server Error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorBody {
            success: false,
            error: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
