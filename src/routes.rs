//! HTTP handlers.

use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::analysis::{self, AnalysisRequest};
use crate::error::AppError;
use crate::AppState;

/// GET /health
pub async fn health_check() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// POST /analyze
pub async fn analyze_pgn(
    Extension(state): Extension<AppState>,
    body: String,
) -> Result<Json<JsonValue>, AppError> {
    let value: JsonValue = serde_json::from_str(&body)
        .map_err(|_| AppError::BadRequest("Request body must be valid JSON".to_string()))?;

    let request = validate_request(&value, state.max_depth)?;
    let record = analysis::analyze(&state, request).await?;

    Ok(Json(json!({ "status": "success", "analysis": record })))
}

/// Validate and normalize a raw request body. Runs before any engine
/// interaction so malformed requests never cost an engine query.
fn validate_request(value: &JsonValue, default_depth: u32) -> Result<AnalysisRequest, AppError> {
    let body = value
        .as_object()
        .ok_or_else(|| AppError::BadRequest("Request body must be a JSON object".to_string()))?;

    let pgn = body
        .get("pgn")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| AppError::BadRequest("Missing required field: pgn".to_string()))?;
    if pgn.trim().is_empty() {
        return Err(AppError::BadRequest("Field pgn must be non-empty".to_string()));
    }

    let depth = match body.get("depth") {
        None | Some(JsonValue::Null) => default_depth,
        Some(v) => v
            .as_u64()
            .filter(|&d| d > 0)
            .and_then(|d| u32::try_from(d).ok())
            .ok_or_else(|| {
                AppError::BadRequest("Field depth must be a positive integer".to_string())
            })?,
    };

    Ok(AnalysisRequest {
        pgn: pgn.to_string(),
        depth,
    })
}
