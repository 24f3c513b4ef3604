//! Tenant provisioning routes (admin only).

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use ferry_core::credential::{Destination, DestinationProvider};
use ferry_shared::TenantId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Creates the tenant routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tenants", post(create_tenant))
        .route("/tenants/{tenant_id}/api-key", post(rotate_api_key))
        .route("/tenants/{tenant_id}/destination", put(register_destination))
        .route("/tenants/{tenant_id}/usage", get(get_usage))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for creating a tenant.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    /// Contact email, unique per tenant.
    pub email: String,
}

/// Response carrying a freshly issued API key.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    /// Tenant ID.
    pub tenant_id: TenantId,
    /// Plain API key. Shown once.
    pub api_key: String,
}

/// Request body for registering a destination.
#[derive(Debug, Deserialize)]
pub struct RegisterDestinationRequest {
    /// Destination provider.
    pub provider: DestinationProvider,
    /// Cloudinary cloud name or S3 bucket.
    pub name: String,
    /// Provider access key.
    pub access_key: String,
    /// Provider secret.
    pub secret: String,
    /// Endpoint URL, required for S3.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Region, S3 only.
    #[serde(default)]
    pub region: Option<String>,
}

impl RegisterDestinationRequest {
    /// Validates the request and builds the destination.
    fn into_destination(self) -> Result<Destination, ApiError> {
        for (field, value) in [
            ("name", &self.name),
            ("access_key", &self.access_key),
            ("secret", &self.secret),
        ] {
            if value.trim().is_empty() {
                return Err(ApiError::invalid_input(format!("{field} must not be empty")));
            }
        }

        match self.provider {
            DestinationProvider::Cloudinary => Ok(Destination::cloudinary(
                self.name,
                self.access_key,
                self.secret,
            )),
            DestinationProvider::S3 => {
                let endpoint = self
                    .endpoint
                    .filter(|e| e.starts_with("http://") || e.starts_with("https://"))
                    .ok_or_else(|| {
                        ApiError::invalid_input("s3 destinations require an http(s) endpoint")
                    })?;
                Ok(Destination::s3(
                    endpoint,
                    self.name,
                    self.access_key,
                    self.secret,
                    self.region,
                ))
            }
        }
    }
}

fn validate_email(email: &str) -> Result<&str, ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ApiError::invalid_input("a valid email is required")),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_tenant(
    State(state): State<AppState>,
    Json(body): Json<CreateTenantRequest>,
) -> Response {
    let email = match validate_email(&body.email) {
        Ok(email) => email,
        Err(e) => return e.into_response(),
    };

    match state.tenants.create_tenant(email).await {
        Ok(tenant) => (StatusCode::CREATED, Json(tenant)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn rotate_api_key(State(state): State<AppState>, Path(tenant_id): Path<Uuid>) -> Response {
    let tenant_id = TenantId::from(tenant_id);

    match state.tenants.rotate_api_key(tenant_id).await {
        Ok(api_key) => Json(ApiKeyResponse { tenant_id, api_key }).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn register_destination(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(body): Json<RegisterDestinationRequest>,
) -> Response {
    let destination = match body.into_destination() {
        Ok(destination) => destination,
        Err(e) => return e.into_response(),
    };

    match state
        .tenants
        .register_destination(TenantId::from(tenant_id), &destination)
        .await
    {
        Ok(usage) => (StatusCode::CREATED, Json(usage)).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

async fn get_usage(State(state): State<AppState>, Path(tenant_id): Path<Uuid>) -> Response {
    match state.tenants.usage(TenantId::from(tenant_id)).await {
        Ok(usage) => Json(usage).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
