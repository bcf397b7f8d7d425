use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cdp_core::CdpError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Engine error: {0}")]
    Engine(CdpError),
}

impl From<CdpError> for ApiError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::PeerUnavailable(what) => ApiError::NotFound(what),
            other => ApiError::Engine(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, what),
            ApiError::Engine(CdpError::ShuttingDown) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Engine is shutting down".to_string(),
            ),
            ApiError::Engine(e) => {
                tracing::error!(error = %e, "management request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
