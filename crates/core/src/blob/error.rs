//! Blob upload error types.

use thiserror::Error;

/// Blob upload errors.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The staged file could not be read.
    #[error("failed to read staged file: {0}")]
    ReadStaged(#[from] std::io::Error),

    /// Destination credentials are incomplete or invalid.
    #[error("destination configuration error: {0}")]
    Configuration(String),

    /// The caller's content type is not a valid MIME type.
    #[error("invalid content type: {0}")]
    InvalidContentType(String),

    /// The request never produced a response.
    #[error("upload request failed: {0}")]
    Transport(String),

    /// The destination rejected the upload.
    #[error("destination rejected upload with status {status}: {message}")]
    Rejected {
        /// HTTP status returned by the destination.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// The destination answered with something other than an upload result.
    #[error("invalid upload response: {0}")]
    InvalidResponse(String),

    /// OpenDAL operation error.
    #[error("object storage operation failed: {0}")]
    Storage(String),
}

impl BlobError {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<opendal::Error> for BlobError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::ConfigInvalid | opendal::ErrorKind::PermissionDenied => {
                Self::Configuration(err.to_string())
            }
            _ => Self::Storage(err.to_string()),
        }
    }
}
