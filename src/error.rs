use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Media negotiation failed: {0}")]
    MediaNegotiation(String),

    #[error("No active peer connection")]
    NoActiveSession,

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Track error [{eye}]: {reason}")]
    Track { eye: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body for signaling endpoints
///
/// Signaling failures are always reported as HTTP 200 with a structured
/// body so the client can tell a negotiation failure from a transport
/// failure.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };

        tracing::error!(
            error_type = std::any::type_name_of_val(&self),
            error_message = %body.error,
            "Request failed"
        );

        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_active_session_matches_wire_message() {
        assert_eq!(
            AppError::NoActiveSession.to_string(),
            "No active peer connection"
        );
    }
}
