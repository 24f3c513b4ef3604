//! S3-compatible destination client using Apache OpenDAL.

use ferry_shared::TenantId;
use opendal::{Operator, services};
use tracing::debug;
use uuid::Uuid;

use super::error::BlobError;
use super::uploader::BlobUploader;
use crate::credential::Destination;
use crate::staging::StagedFile;

/// Region used when the destination does not name one (R2 and MinIO accept it).
const DEFAULT_REGION: &str = "auto";

/// Uploader for S3-compatible buckets.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreUploader;

impl ObjectStoreUploader {
    /// Create a new object store uploader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Create OpenDAL operator from destination credentials.
    fn create_operator(destination: &Destination) -> Result<Operator, BlobError> {
        let endpoint = destination
            .endpoint
            .as_deref()
            .ok_or_else(|| BlobError::configuration("s3 destination requires an endpoint"))?;

        let builder = services::S3::default()
            .endpoint(endpoint)
            .bucket(&destination.name)
            .access_key_id(&destination.access_key)
            .secret_access_key(&destination.secret)
            .region(destination.region.as_deref().unwrap_or(DEFAULT_REGION));

        Operator::new(builder)
            .map_err(|e| BlobError::configuration(e.to_string()))?
            .finish()
            .pipe(Ok)
    }

    /// Generate the object key for an upload.
    ///
    /// Format: `{tenant_id}/{upload_id}-{sanitized_filename}`
    #[must_use]
    pub fn object_key(tenant_id: TenantId, upload_id: Uuid, filename: &str) -> String {
        format!("{tenant_id}/{upload_id}-{}", sanitize_filename(filename))
    }

    /// Public URL of an object in a path-style bucket.
    #[must_use]
    pub fn public_url(endpoint: &str, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/'))
    }
}

impl BlobUploader for ObjectStoreUploader {
    async fn upload(
        &self,
        file: &StagedFile,
        destination: &Destination,
        tenant_id: TenantId,
    ) -> Result<String, BlobError> {
        let operator = Self::create_operator(destination)?;
        let key = Self::object_key(tenant_id, Uuid::new_v4(), file.display_name());

        let bytes = tokio::fs::read(&file.path).await?;
        debug!(tenant_id = %tenant_id, bucket = %destination.name, %key, size = file.size, "Writing object");

        write_object(&operator, &key, bytes, file.content_type.as_deref()).await?;

        let endpoint = destination.endpoint.as_deref().unwrap_or_default();
        Ok(Self::public_url(endpoint, &destination.name, &key))
    }
}

/// Write an object, tagging it with the caller's content type when known.
async fn write_object(
    operator: &Operator,
    key: &str,
    bytes: Vec<u8>,
    content_type: Option<&str>,
) -> Result<(), BlobError> {
    let mut write = operator.write_with(key, bytes);
    if let Some(content_type) = content_type {
        write = write.content_type(content_type);
    }
    write.await?;
    Ok(())
}

/// Sanitize filename for object keys.
///
/// Only allows ASCII alphanumeric characters, dots, hyphens, and underscores.
fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extension trait for pipe operator.
trait Pipe: Sized {
    fn pipe<F, R>(self, f: F) -> R
    where
        F: FnOnce(Self) -> R,
    {
        f(self)
    }
}

impl<T> Pipe for T {}
