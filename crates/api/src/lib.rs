//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - The upload relay route
//! - Admin-only tenant provisioning routes
//! - JSON error responses

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    http::{HeaderName, header::AUTHORIZATION},
};
use ferry_core::blob::DestinationUploader;
use ferry_core::relay::RelayService;
use ferry_db::TenantRepository;
use ferry_shared::{AppError, RelayConfig};
use tower::ServiceBuilder;
use tower::timeout::{TimeoutLayer, error::Elapsed};
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

/// Room for multipart boundaries and part headers on top of the payload cap.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Relay service as wired in production.
pub type Relay = RelayService<TenantRepository, DestinationUploader>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Tenant repository for provisioning routes.
    pub tenants: Arc<TenantRepository>,
    /// Upload relay.
    pub relay: Relay,
    /// Relay limits and deadline.
    pub relay_config: Arc<RelayConfig>,
    /// Admin bearer token; provisioning is disabled when `None`.
    pub admin_token: Option<Arc<str>>,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.relay_config.max_payload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let request_timeout = state.relay_config.deadline() + state.relay_config.cleanup_grace();

    let api = Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(DefaultBodyLimit::max(body_limit));

    with_request_timeout(api, request_timeout)
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([
            AUTHORIZATION,
            HeaderName::from_static(routes::upload::API_KEY_HEADER),
            HeaderName::from_static(routes::upload::LEGACY_API_KEY_HEADER),
        ]))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bounds every request by `timeout`, answering late ones with a JSON 504.
fn with_request_timeout<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(request_failed))
            .layer(TimeoutLayer::new(timeout)),
    )
}

async fn request_failed(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::from(AppError::Timeout("Request took too long".to_string()))
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        ApiError::from(AppError::Internal(err.to_string()))
    }
}
