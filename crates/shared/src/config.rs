//! Application configuration management.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Upload relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Cloudinary client configuration.
    #[serde(default)]
    pub cloudinary: CloudinaryConfig,
    /// Administrative access configuration.
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    100
}

fn default_min_connections() -> u32 {
    1
}

/// Upload relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Per-request deadline in seconds, starting when the request is accepted.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Extra time granted to cleanup after the deadline, in seconds.
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: u64,
    /// Maximum accepted payload size in bytes.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Directory for staged uploads.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl RelayConfig {
    /// Request deadline as a `Duration`.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Cleanup grace period as a `Duration`.
    #[must_use]
    pub const fn cleanup_grace(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            cleanup_grace_secs: default_cleanup_grace_secs(),
            max_payload_bytes: default_max_payload_bytes(),
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_deadline_secs() -> u64 {
    10
}

fn default_cleanup_grace_secs() -> u64 {
    5
}

fn default_max_payload_bytes() -> u64 {
    10 * 1024 * 1024 // 10 MiB
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("temp-uploads")
}

/// Cloudinary client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudinaryConfig {
    /// Base URL of the upload API, without the cloud name.
    #[serde(default = "default_cloudinary_api_base_url")]
    pub api_base_url: String,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_cloudinary_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_cloudinary_api_base_url(),
            request_timeout_secs: default_cloudinary_request_timeout(),
        }
    }
}

fn default_cloudinary_api_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_cloudinary_request_timeout() -> u64 {
    30
}

/// Administrative access configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for tenant provisioning routes. Provisioning is disabled when unset.
    #[serde(default)]
    pub token: Option<String>,
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(
                config::Environment::with_prefix("FERRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
