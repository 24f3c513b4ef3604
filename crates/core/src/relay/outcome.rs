//! Terminal outcome of a relay attempt.

use ferry_shared::AppError;

/// The single result of one relay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Upload stored and usage recorded.
    Success {
        /// Public URL of the stored blob.
        url: String,
    },
    /// The destination rejected or failed the upload.
    UploadFailed {
        /// Underlying cause.
        cause: String,
    },
    /// The payload could not be written locally.
    StagingFailed {
        /// Underlying cause.
        cause: String,
    },
    /// The API key does not resolve to a tenant destination.
    CredentialNotFound,
    /// The deadline elapsed before the attempt finished.
    TimedOut,
    /// The upload succeeded but usage could not be recorded.
    AccountingFailed {
        /// Underlying cause.
        cause: String,
    },
}

impl RelayOutcome {
    /// Returns true for `Success`.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::UploadFailed { .. } => "upload_failed",
            Self::StagingFailed { .. } => "staging_failed",
            Self::CredentialNotFound => "credential_not_found",
            Self::TimedOut => "timed_out",
            Self::AccountingFailed { .. } => "accounting_failed",
        }
    }

    /// Converts the outcome into the URL or an application error.
    ///
    /// # Errors
    ///
    /// Returns the `AppError` matching every non-success variant.
    pub fn into_result(self) -> Result<String, AppError> {
        match self {
            Self::Success { url } => Ok(url),
            Self::UploadFailed { cause } => Err(AppError::ExternalService(cause)),
            Self::StagingFailed { cause } => Err(AppError::Internal(cause)),
            Self::CredentialNotFound => Err(AppError::NotFound(
                "no upload destination for this API key".to_string(),
            )),
            Self::TimedOut => Err(AppError::Timeout(
                "upload did not complete before the deadline".to_string(),
            )),
            // The upload URL is intentionally absent here.
            Self::AccountingFailed { cause } => Err(AppError::Database(cause)),
        }
    }
}
