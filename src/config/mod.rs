//! Configuration module for the GCS file API
//!
//! Settings come from process environment variables (optionally seeded from a
//! `.env` file by the binary). They are read once at startup, validated, and
//! then shared read-only with every request.

use crate::validation::UploadPolicy;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Default upload limit: 10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// Public Google Cloud Storage endpoint
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Host of the GCE / Cloud Run metadata server
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    /// Bucket every object lives in (`GCP_BUCKET_NAME`)
    pub bucket_name: String,
    /// Upload size limit in bytes (`MAX_FILE_SIZE`)
    pub max_file_size: u64,
    /// Lower-cased extensions accepted on upload; `None` accepts everything
    pub allowed_file_types: Option<Vec<String>>,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigLoader::from_env()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_name.trim().is_empty() {
            return Err(ConfigError::MissingVar("GCP_BUCKET_NAME"));
        }

        if self.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_FILE_SIZE must be a positive number of bytes".into(),
            ));
        }

        if !is_valid_http_url(&self.storage.endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid GCS_ENDPOINT '{}': must start with http:// or https://",
                self.storage.endpoint
            )));
        }

        if self.metrics.enabled && self.metrics.port == self.server.port {
            return Err(ConfigError::ValidationError(format!(
                "METRICS_PORT ({}) must differ from PORT",
                self.metrics.port
            )));
        }

        Ok(())
    }

    /// Build the upload policy enforced on every upload
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_file_size, self.allowed_file_types.clone())
    }

    /// Address the API server listens on
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.socket_addr()
    }
}

/// Split a comma-separated extension list into trimmed, lower-cased entries.
///
/// Returns `None` when nothing usable is left, meaning "no restriction".
pub fn parse_allowed_file_types(raw: &str) -> Option<Vec<String>> {
    let mut extensions: Vec<String> = Vec::new();
    for ext in raw.split(',') {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() && !extensions.contains(&ext) {
            extensions.push(ext);
        }
    }

    if extensions.is_empty() {
        None
    } else {
        Some(extensions)
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("Invalid HOST '{}': {}", self.host, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Storage backend configuration
#[derive(Clone)]
pub struct StorageConfig {
    /// Base URL of the GCS JSON API
    pub endpoint: String,
    /// Fixed OAuth2 bearer token; skips the metadata server when set
    pub access_token: Option<String>,
    /// Send requests without credentials (emulators)
    pub anonymous: bool,
    /// Metadata server host used to mint tokens
    pub metadata_host: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GCS_ENDPOINT.into(),
            access_token: None,
            anonymous: false,
            metadata_host: DEFAULT_METADATA_HOST.into(),
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("anonymous", &self.anonymous)
            .field("metadata_host", &self.metadata_host)
            .finish()
    }
}

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}
