use axum::{
    extract::{FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// JSON body extractor whose rejections are JSON as well.
///
/// Unknown action kinds and malformed grader callbacks end up here, so the rejection
/// carries serde's message verbatim.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => {
                let status = rejection.status();
                let message = rejection.body_text();
                tracing::warn!("Rejected request body ({}): {}", status, message);
                Err((
                    status,
                    Json(json!({
                        "message": message,
                        "status": status.as_u16()
                    })),
                )
                    .into_response())
            }
        }
    }
}
