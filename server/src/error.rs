//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use formsync_engine::Error as EngineError;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

/// HTTP status an engine error is reported with.
fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::FormNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::NotMapped(_) => StatusCode::CONFLICT,
        EngineError::Authentication(_)
        | EngineError::DestinationCreate(_)
        | EngineError::DestinationUnavailable(_)
        | EngineError::DestinationMissing(_) => StatusCode::BAD_GATEWAY,
        EngineError::Schema(_) | EngineError::Source(_) | EngineError::Mapping(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Engine(e) => {
                let status = engine_status(e);
                if status.is_server_error() {
                    tracing::error!("Engine error: {:?}", e);
                } else {
                    tracing::warn!("Engine error: {:?}", e);
                }
                (status, "Sync failed".to_string(), Some(e.to_string()))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_statuses() {
        assert_eq!(
            engine_status(&EngineError::FormNotFound("1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            engine_status(&EngineError::NotMapped("1".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            engine_status(&EngineError::DestinationMissing("s".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            engine_status(&EngineError::Mapping("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn responses_carry_status() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AppError::Engine(EngineError::NotMapped("7".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
