use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::{
    extractors::AppJson,
    models::{
        attempt::{CreateAttemptRequest, SubmitActionRequest},
        PendingStep,
    },
    services::AppState,
};

use super::engine_error;

/// POST /api/v1/attempts - Start an attempt at a question
pub async fn create_attempt(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateAttemptRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    tracing::info!(
        "Starting attempt: usage={}, slot={}, question={}",
        req.usage_id,
        req.slot,
        req.question_id
    );

    let attempt = state
        .attempts
        .start_attempt(&req)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::CREATED, Json(attempt)))
}

/// GET /api/v1/attempts/{id} - Render-ready view of the attempt
pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let view = state
        .attempts
        .view_attempt(&attempt_id)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::OK, Json(view)))
}

/// POST /api/v1/attempts/{id}/actions - Student or manual-grader action
pub async fn submit_action(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
    AppJson(req): AppJson<SubmitActionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }
    if req.action.grade_process_id().is_some() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Grading results are accepted at /api/v1/grader/callback only".to_string(),
        ));
    }

    tracing::info!(
        "Processing action={} for attempt={}",
        req.action.name(),
        attempt_id
    );

    let pending = PendingStep::new(req.action).with_response(req.response, req.files);
    let response = state
        .attempts
        .process_action(&attempt_id, pending)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::OK, Json(response)))
}

/// POST /api/v1/attempts/{id}/regrade - Replay the history against the grader
pub async fn regrade_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Regrading attempt={}", attempt_id);

    let record = state
        .attempts
        .regrade(&attempt_id)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::OK, Json(record)))
}
