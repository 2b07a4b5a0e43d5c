use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::{PipelineError, TtsError};

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Pipeline(e) => match e.kind() {
                Some(TtsError::Auth(_)) => (
                    StatusCode::BAD_GATEWAY,
                    "Synthesis service rejected the configured API key".to_string(),
                ),
                Some(TtsError::Connection(_)) => (StatusCode::BAD_GATEWAY, e.to_string()),
                Some(TtsError::Stall(_)) => (StatusCode::GATEWAY_TIMEOUT, e.to_string()),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            },
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_pipeline_error_status_mapping() {
        assert_eq!(
            status(PipelineError::Open(TtsError::Auth("bad key".into())).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(PipelineError::Open(TtsError::Connection("refused".into())).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(PipelineError::Receive(TtsError::Stall(Duration::from_secs(20))).into()),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(PipelineError::Receive(TtsError::Sink("gone".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(status(PipelineError::Cancelled.into()), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(status(ApiError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status(ApiError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
    }
}
