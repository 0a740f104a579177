use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Analysis engine is not available")]
    EngineUnavailable,

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine query timed out")]
    EngineTimeout,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Engine and persistence detail stays in the server logs; clients
        // only ever see a generic message for non-4xx failures.
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::EngineUnavailable => {
                tracing::error!("Rejected request: engine unavailable");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Analysis engine is not available".to_string(),
                )
            }
            AppError::Engine(msg) => {
                tracing::error!("Engine error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Analysis failed".to_string())
            }
            AppError::EngineTimeout => {
                tracing::error!("Engine query timed out");
                (StatusCode::INTERNAL_SERVER_ERROR, "Analysis timed out".to_string())
            }
            AppError::Persistence(msg) => {
                tracing::error!("Persistence error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to store analysis".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Unexpected error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
