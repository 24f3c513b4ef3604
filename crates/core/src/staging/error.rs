//! Staging error types.

use std::path::PathBuf;

use thiserror::Error;

/// Staging operation errors.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The staging directory could not be created.
    #[error("failed to create staging directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The staged file could not be created.
    #[error("failed to create staged file {path}: {source}")]
    CreateFile {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Copying the payload into the staged file failed.
    #[error("failed to write staged file {path}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The staging task ended without reporting a result.
    #[error("staging task ended unexpectedly")]
    Interrupted,
}
