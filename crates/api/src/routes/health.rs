//! Liveness endpoint.

use axum::{Json, Router, routing::get};
use serde::Serialize;

use crate::AppState;

/// Liveness report.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Crate version of the running binary.
    pub version: &'static str,
}

impl HealthResponse {
    const fn current() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::current())
}

/// Creates the health route. It needs no credentials.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_serializes_status_and_version() {
        let json = serde_json::to_value(HealthResponse::current()).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(!json["version"].as_str().unwrap().is_empty());
    }
}
