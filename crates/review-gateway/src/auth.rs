//! Bearer-token verification for protected routes.
//!
//! Identity issuance and verification live outside this service; the
//! gateway only checks that callers present the configured token.

use crate::http::AppState;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

/// Authentication configuration.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Required bearer token (None = open access)
    pub token: Option<String>,
}

/// Reject requests that do not carry the configured bearer token.
pub async fn verify_user(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.auth.token.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request with invalid token");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request without credentials");
            (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
        }
    }
}
