use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use thiserror::Error;

use crate::storage::StorageError;
use crate::validation::ValidationErrors;

pub type Result<T> = std::result::Result<T, GalleryError>;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Image {0} not found")]
    NotFound(String),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<ValidationErrors> for GalleryError {
    fn from(errors: ValidationErrors) -> Self {
        GalleryError::Validation(errors)
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        match self {
            GalleryError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "message": "The given data was invalid.",
                    "errors": errors,
                })),
            )
                .into_response(),
            GalleryError::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            GalleryError::Multipart(e) => (e.status(), e.body_text()).into_response(),
            GalleryError::Storage(_) | GalleryError::Database(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
