use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mandi_core::CoreError;
use serde_json::json;

/// Transport-level wrapper over the engine's failure taxonomy. The engine
/// decides what went wrong; this layer only decides the HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match self {
            ApiError::Core(err) => {
                let status = match &err {
                    CoreError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
                    CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
                    CoreError::AlreadySettled(_) => StatusCode::CONFLICT,
                    CoreError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
                    CoreError::Expired(_) => StatusCode::GONE,
                    CoreError::VerificationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
                };
                let retryable = matches!(err, CoreError::ConcurrencyConflict(_));
                (status, err.to_string(), retryable)
            }
            ApiError::Internal(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), false)
            }
        };

        let body = Json(json!({
            "error": message,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}
