use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

use crate::error::EngineError;
use crate::metrics;
use crate::services::AppState;

pub mod attempts;
pub mod grader;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let (storage, registry) = futures::future::join(
        check_dependency("Attempt store", state.ports.attempts.ping()),
        check_dependency("Grade process registry", state.ports.registry.ping()),
    )
    .await;
    let all_healthy = storage.get("status") == Some(&json!("healthy"))
        && registry.get("status") == Some(&json!("healthy"));

    dependencies.insert("attempt_store".to_string(), json!(storage));
    dependencies.insert("grade_registry".to_string(), json!(registry));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "attempt-engine",
            "version": env!("CARGO_PKG_VERSION"),
            "storage": format!("{:?}", state.config.storage).to_lowercase(),
            "dependencies": dependencies
        })),
    )
}

async fn check_dependency<F>(name: &str, ping: F) -> serde_json::Map<String, serde_json::Value>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(std::time::Duration::from_secs(1), ping).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} error: {:#}", name, e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} timeout after 1s", name)));
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Maps engine failures to the `(StatusCode, String)` error shape of the handlers.
pub(crate) fn engine_error(e: EngineError) -> (StatusCode, String) {
    let status = match &e {
        EngineError::AttemptNotFound(_) | EngineError::QuestionNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        EngineError::Storage(_) | EngineError::Grader(_) => {
            tracing::error!("Engine failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}
