//! Cloudinary upload client.
//!
//! Uses the signed upload API:
//! `POST {api_base_url}/{cloud_name}/auto/upload` with a multipart body holding
//! the file, `api_key`, `timestamp`, `signature_algorithm` and `signature`.

use std::time::Duration;

use chrono::Utc;
use ferry_shared::{CloudinaryConfig, TenantId};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::error::BlobError;
use super::uploader::BlobUploader;
use crate::credential::Destination;
use crate::staging::StagedFile;

/// Successful upload response (only the fields we use).
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

/// Error response body.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Cloudinary upload client.
#[derive(Debug, Clone)]
pub struct CloudinaryUploader {
    client: reqwest::Client,
    api_base_url: String,
}

impl CloudinaryUploader {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &CloudinaryConfig) -> Result<Self, BlobError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BlobError::configuration(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload endpoint for a cloud.
    #[must_use]
    pub fn upload_url(&self, cloud_name: &str) -> String {
        format!("{}/{cloud_name}/auto/upload", self.api_base_url)
    }

    /// Sign upload parameters.
    ///
    /// Parameters are sorted by name, joined as `k=v` pairs with `&`, suffixed
    /// with the API secret and hashed with SHA-256.
    #[must_use]
    pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl BlobUploader for CloudinaryUploader {
    async fn upload(
        &self,
        file: &StagedFile,
        destination: &Destination,
        tenant_id: TenantId,
    ) -> Result<String, BlobError> {
        if destination.name.is_empty() || destination.access_key.is_empty() {
            return Err(BlobError::configuration(
                "cloudinary destination requires a cloud name and API key",
            ));
        }

        let bytes = tokio::fs::read(&file.path).await?;
        let timestamp = Utc::now().timestamp().to_string();
        let signature = Self::sign(&[("timestamp", timestamp.as_str())], &destination.secret);

        let form = Form::new()
            .part("file", file_part(bytes, file)?)
            .text("api_key", destination.access_key.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let url = self.upload_url(&destination.name);
        debug!(tenant_id = %tenant_id, %url, size = file.size, "Uploading to Cloudinary");

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map_or_else(|_| "Unknown error".to_string(), |body| body.error.message);
            warn!(tenant_id = %tenant_id, status = %status, %message, "Cloudinary rejected upload");
            return Err(BlobError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| BlobError::InvalidResponse(e.to_string()))?;

        if body.secure_url.is_empty() {
            return Err(BlobError::InvalidResponse("empty secure_url".to_string()));
        }

        Ok(body.secure_url)
    }
}

/// Multipart `file` part carrying the caller's filename and content type.
fn file_part(bytes: Vec<u8>, file: &StagedFile) -> Result<Part, BlobError> {
    let part = Part::bytes(bytes).file_name(file.display_name().to_string());
    match file.content_type.as_deref() {
        Some(content_type) => part
            .mime_str(content_type)
            .map_err(|e| BlobError::InvalidContentType(e.to_string())),
        None => Ok(part),
    }
}
