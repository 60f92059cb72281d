use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that reach the HTTP boundary. Geo lookup failures never do; the
/// resolver absorbs them.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input (400).
    #[error("{0}")]
    Validation(String),

    /// Unknown link id (404).
    #[error("{0}")]
    NotFound(String),

    /// Persistence failure (500).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            AppError::Store(e) => {
                tracing::error!("Link store failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal storage error".to_owned(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
