//! Application-wide error types.

use thiserror::Error;

/// Application error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request payload exceeds the configured cap.
    #[error("Payload too large: exceeds maximum {max} bytes")]
    PayloadTooLarge {
        /// Maximum allowed size.
        max: u64,
    },

    /// Conflict (e.g., duplicate entry).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// External service error.
    #[error("External service error: {0}")]
    ExternalService(String),

    /// The request deadline elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized(_) => 401,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::PayloadTooLarge { .. } => 413,
            Self::Conflict(_) => 409,
            Self::ExternalService(_) => 502,
            Self::Timeout(_) => 504,
            Self::Database(_) | Self::Internal(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AppError::Unauthorized(String::new()), 401, "UNAUTHORIZED")]
    #[case(AppError::NotFound(String::new()), 404, "NOT_FOUND")]
    #[case(AppError::Validation(String::new()), 400, "VALIDATION_ERROR")]
    #[case(AppError::PayloadTooLarge { max: 1 }, 413, "PAYLOAD_TOO_LARGE")]
    #[case(AppError::Conflict(String::new()), 409, "CONFLICT")]
    #[case(AppError::Database(String::new()), 500, "DATABASE_ERROR")]
    #[case(AppError::ExternalService(String::new()), 502, "EXTERNAL_SERVICE_ERROR")]
    #[case(AppError::Timeout(String::new()), 504, "TIMEOUT")]
    #[case(AppError::Internal(String::new()), 500, "INTERNAL_ERROR")]
    fn test_error_status_and_code(
        #[case] error: AppError,
        #[case] status: u16,
        #[case] code: &str,
    ) {
        assert_eq!(error.status_code(), status);
        assert_eq!(error.error_code(), code);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::Unauthorized("msg".into()).to_string(),
            "Authentication failed: msg"
        );
        assert_eq!(
            AppError::NotFound("msg".into()).to_string(),
            "Not found: msg"
        );
        assert_eq!(
            AppError::PayloadTooLarge { max: 10 }.to_string(),
            "Payload too large: exceeds maximum 10 bytes"
        );
        assert_eq!(
            AppError::ExternalService("msg".into()).to_string(),
            "External service error: msg"
        );
        assert_eq!(AppError::Timeout("msg".into()).to_string(), "Timed out: msg");
    }
}
