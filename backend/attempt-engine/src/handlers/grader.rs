use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use validator::Validate;

use crate::{extractors::AppJson, models::grading::GraderCallbackRequest, services::AppState};

use super::engine_error;

/// POST /api/v1/grader/callback - Asynchronous result of a dispatched submission
pub async fn grader_callback(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<GraderCallbackRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    tracing::info!(
        "Grader callback: attempt={}, grade_process={}, outcome={:?}",
        req.attempt_id,
        req.grade_process_id,
        req.outcome
    );

    let response = state
        .attempts
        .handle_grader_callback(&req)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::OK, Json(response)))
}
