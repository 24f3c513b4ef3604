//! Credential types and data structures.

use chrono::{DateTime, Utc};
use ferry_shared::TenantId;
use serde::{Deserialize, Serialize};

/// Remote provider behind an upload destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationProvider {
    /// Cloudinary media CDN.
    Cloudinary,
    /// S3-compatible object storage: Cloudflare R2, AWS S3, MinIO.
    S3,
}

impl DestinationProvider {
    /// Convert to database string value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloudinary => "cloudinary",
            Self::S3 => "s3",
        }
    }

    /// Parse from database string value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cloudinary" => Some(Self::Cloudinary),
            "s3" => Some(Self::S3),
            _ => None,
        }
    }
}

/// Credentials for a tenant's upload destination.
#[derive(Clone, PartialEq, Eq)]
pub struct Destination {
    /// Provider type.
    pub provider: DestinationProvider,
    /// Cloudinary cloud name or S3 bucket.
    pub name: String,
    /// Provider access key.
    pub access_key: String,
    /// Provider secret.
    pub secret: String,
    /// Service endpoint (S3 only).
    pub endpoint: Option<String>,
    /// Region (S3 only).
    pub region: Option<String>,
}

impl Destination {
    /// Create a Cloudinary destination.
    #[must_use]
    pub fn cloudinary(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider: DestinationProvider::Cloudinary,
            name: cloud_name.into(),
            access_key: api_key.into(),
            secret: api_secret.into(),
            endpoint: None,
            region: None,
        }
    }

    /// Create an S3-compatible destination.
    #[must_use]
    pub fn s3(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: Option<String>,
    ) -> Self {
        Self {
            provider: DestinationProvider::S3,
            name: bucket.into(),
            access_key: access_key_id.into(),
            secret: secret_access_key.into(),
            endpoint: Some(endpoint.into()),
            region,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Destination")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("access_key", &self.access_key)
            .field("secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

/// A tenant's credential record, resolved from an API key.
#[derive(Debug, Clone)]
pub struct TenantCredential {
    /// Tenant the API key belongs to.
    pub tenant_id: TenantId,
    /// Where the tenant's uploads go.
    pub destination: Destination,
    /// Number of successfully relayed uploads.
    pub request_count: i64,
    /// Last time the record changed.
    pub updated_at: DateTime<Utc>,
}
