//! Authentication middleware.
//!
//! API calls carry a Bearer token. When `AUTH_SECRET` is configured the token
//! must equal it; without a secret the API is open.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The bearer token, or "anonymous" when no secret is configured
    #[allow(dead_code)]
    pub token: String,
}

/// Check an `Authorization` header value against the configured secret.
fn authorize(header: Option<&str>, secret: Option<&str>) -> Result<AuthUser, &'static str> {
    match (header, secret) {
        (Some(header), secret) => {
            let token = header
                .strip_prefix("Bearer ")
                .ok_or("Invalid authorization header format")?
                .trim();

            if token.is_empty() {
                return Err("Empty bearer token");
            }
            if secret.is_some_and(|secret| secret != token) {
                return Err("Invalid bearer token");
            }

            Ok(AuthUser {
                token: token.to_string(),
            })
        }
        (None, None) => Ok(AuthUser {
            token: "anonymous".to_string(),
        }),
        (None, Some(_)) => Err("Missing authorization header"),
    }
}

/// Authorize a request, logging why a rejected one failed.
fn authenticate(header: Option<&str>, secret: Option<&str>) -> Result<AuthUser, AppError> {
    authorize(header, secret).map_err(|reason| {
        tracing::debug!(reason, "rejected request");
        AppError::Unauthorized
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        authenticate(header, state.config.auth_secret.as_deref())
    }
}
