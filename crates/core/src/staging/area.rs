//! Staging area implementation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::StagingError;

/// A payload written to local disk for the duration of one relay attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path of the staged file.
    pub path: PathBuf,
    /// Number of bytes written.
    pub size: u64,
    /// Original filename supplied by the caller.
    pub filename: Option<String>,
    /// Content type supplied by the caller.
    pub content_type: Option<String>,
}

impl StagedFile {
    /// Filename to present to upload destinations.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("upload")
    }
}

/// Directory that holds staged uploads.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Create a staging area rooted at `dir`. The directory is created on first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the staging directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `reader` into a new, uniquely named staged file.
    ///
    /// A partially written file is removed before an error is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created, or the copy fails.
    pub async fn stage<R>(
        &self,
        mut reader: R,
        filename: Option<String>,
        content_type: Option<String>,
    ) -> Result<StagedFile, StagingError>
    where
        R: AsyncRead + Unpin + Send,
    {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StagingError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.dir.join(format!("upload-{}.part", Uuid::new_v4()));
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StagingError::CreateFile {
                path: path.clone(),
                source,
            })?;

        let copied = async {
            let size = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(size)
        }
        .await;

        match copied {
            Ok(size) => {
                debug!(path = %path.display(), size, "Payload staged");
                Ok(StagedFile {
                    path,
                    size,
                    filename,
                    content_type,
                })
            }
            Err(source) => {
                drop(file);
                remove(&path).await;
                Err(StagingError::Write { path, source })
            }
        }
    }

    /// Remove a staged file. Safe to call more than once.
    pub async fn release(&self, file: &StagedFile) {
        remove(&file.path).await;
    }
}

/// Remove a file, treating "already gone" as success.
async fn remove(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Staged file released"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to release staged file"),
    }
}
