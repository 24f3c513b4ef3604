//! Uploader trait and provider dispatch.

use std::future::Future;

use ferry_shared::TenantId;

use super::cloudinary::CloudinaryUploader;
use super::error::BlobError;
use super::object_store::ObjectStoreUploader;
use crate::credential::{Destination, DestinationProvider};
use crate::staging::StagedFile;

/// Sends a staged file to a remote destination.
///
/// One call is one attempt; implementations do not retry.
pub trait BlobUploader: Send + Sync + 'static {
    /// Upload the staged file and return its public URL.
    fn upload(
        &self,
        file: &StagedFile,
        destination: &Destination,
        tenant_id: TenantId,
    ) -> impl Future<Output = Result<String, BlobError>> + Send;
}

/// Uploader that routes each destination to its provider's client.
#[derive(Debug, Clone)]
pub struct DestinationUploader {
    cloudinary: CloudinaryUploader,
    object_store: ObjectStoreUploader,
}

impl DestinationUploader {
    /// Create a dispatching uploader.
    #[must_use]
    pub fn new(cloudinary: CloudinaryUploader, object_store: ObjectStoreUploader) -> Self {
        Self {
            cloudinary,
            object_store,
        }
    }
}

impl BlobUploader for DestinationUploader {
    async fn upload(
        &self,
        file: &StagedFile,
        destination: &Destination,
        tenant_id: TenantId,
    ) -> Result<String, BlobError> {
        match destination.provider {
            DestinationProvider::Cloudinary => {
                self.cloudinary.upload(file, destination, tenant_id).await
            }
            DestinationProvider::S3 => self.object_store.upload(file, destination, tenant_id).await,
        }
    }
}
