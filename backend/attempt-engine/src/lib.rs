use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod adapters;
pub mod behaviour;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod ports;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, EngineResult};
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1/attempts", attempt_routes())
        .route(
            "/api/v1/grader/callback",
            post(handlers::grader::grader_callback),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn attempt_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::attempts::create_attempt))
        .route("/{id}", get(handlers::attempts::get_attempt))
        .route("/{id}/actions", post(handlers::attempts::submit_action))
        .route("/{id}/regrade", post(handlers::attempts::regrade_attempt))
}
