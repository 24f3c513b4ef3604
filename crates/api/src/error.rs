//! JSON error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ferry_db::TenantError;
use ferry_shared::AppError;
use serde_json::json;
use tracing::error;

/// Error returned by handlers as `{"error": code, "message": text}`.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Create an error response.
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Malformed or missing request input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::from(AppError::Validation(message.into()))
    }

    /// Payload over the configured cap.
    pub fn payload_too_large(max: u64) -> Self {
        Self::from(AppError::PayloadTooLarge { max })
    }

    /// Missing or rejected credentials.
    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::from(AppError::Unauthorized(message.into())).with_code(code)
    }

    /// Replace the error code, keeping status and message.
    #[must_use]
    pub const fn with_code(mut self, code: &'static str) -> Self {
        self.code = code;
        self
    }

    /// HTTP status of this error.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.code, "message": self.message })),
        )
            .into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = match &err {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "invalid_input",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::Conflict(_) => "conflict",
            AppError::ExternalService(_) => "upstream_error",
            AppError::Timeout(_) => "timeout",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        };
        // Store and internal details stay in the logs.
        let message = match err {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            AppError::Unauthorized(m)
            | AppError::NotFound(m)
            | AppError::Validation(m)
            | AppError::Conflict(m)
            | AppError::ExternalService(m)
            | AppError::Timeout(m) => m,
            AppError::PayloadTooLarge { max } => {
                format!("file exceeds the maximum size of {max} bytes")
            }
        };
        Self::new(status, code, message)
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound(id) => {
                Self::from(AppError::NotFound(format!("tenant {id} not found")))
                    .with_code("tenant_not_found")
            }
            TenantError::NoDestination(id) => Self::from(AppError::NotFound(format!(
                "tenant {id} has no upload destination"
            )))
            .with_code("destination_not_found"),
            TenantError::EmailTaken(email) => {
                Self::from(AppError::Conflict(format!("email {email} is already registered")))
                    .with_code("email_taken")
            }
            TenantError::DestinationExists(id) => Self::from(AppError::Conflict(format!(
                "tenant {id} already has an upload destination"
            )))
            .with_code("destination_exists"),
            TenantError::Database(e) => {
                error!(error = %e, "Tenant repository error");
                Self::from(AppError::Database(e.to_string()))
            }
        }
    }
}
