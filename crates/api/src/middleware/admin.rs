//! Admin authentication for tenant provisioning routes.

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{AppState, error::ApiError};

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Compares tokens without leaking where they differ.
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Admin middleware that checks the static bearer token.
///
/// Provisioning is disabled entirely when no admin token is configured.
pub async fn admin_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return ApiError::new(
            StatusCode::FORBIDDEN,
            "admin_disabled",
            "Tenant provisioning is disabled on this server",
        )
        .into_response();
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token);

    let Some(token) = presented else {
        return ApiError::unauthorized(
            "missing_token",
            "Authorization header with Bearer token is required",
        )
        .into_response();
    };

    if !token_matches(token, expected) {
        warn!(path = %request.uri().path(), "Rejected admin request with invalid token");
        return ApiError::unauthorized("invalid_token", "Invalid admin token").into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("bearer abc"), Some("abc"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_token_matches() {
        assert!(token_matches("secret-token", "secret-token"));
        assert!(!token_matches("secret-tokeN", "secret-token"));
        assert!(!token_matches("secret", "secret-token"));
        assert!(!token_matches("", "secret-token"));
    }
}
