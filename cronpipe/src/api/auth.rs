//! Shared-secret bearer authentication.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use super::AppState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

impl ErrorResponse {
    /// Wraps a message.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Proof that the request carried `Authorization: Bearer <CRON_SECRET>`.
#[derive(Debug, Clone, Copy)]
pub struct CronAuth;

/// Extracts the Bearer token from the Authorization header.
fn extract_bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new("Unauthorized")))
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer(parts) else {
            warn!(path = %parts.uri.path(), "Missing bearer token");
            return Err(unauthorized());
        };

        if state.cron_secret.is_empty() || token != state.cron_secret {
            warn!(path = %parts.uri.path(), "Invalid bearer token");
            return Err(unauthorized());
        }

        Ok(CronAuth)
    }
}
