//! OAuth2 bearer tokens for the GCS JSON API
//!
//! # Design
//!
//! A [`TokenProvider`] hands out the token attached to each backend request:
//! - [`StaticToken`] - fixed token from configuration (`GCP_ACCESS_TOKEN`)
//! - [`MetadataServerToken`] - token minted by the GCE / Cloud Run metadata
//!   server for the attached service account, cached until shortly before it
//!   expires
//! - [`AnonymousCredentials`] - no token, for emulators and public buckets
//!
//! # Example
//!
//! ```
//! use gcs_file_api::storage::credentials::{StaticToken, TokenProvider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = StaticToken::new("ya29.example");
//! assert_eq!(provider.token().await?.as_deref(), Some("ya29.example"));
//! # Ok(())
//! # }
//! ```

use crate::config::StorageConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Tokens are refreshed this long before the metadata server says they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Credential errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Metadata server request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Metadata server returned {status}: {body}")]
    ResponseError { status: u16, body: String },
}

/// Source of bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Token to send, or `None` to send the request unauthenticated
    async fn token(&self) -> Result<Option<String>, CredentialsError>;
}

/// Fixed token
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>, CredentialsError> {
        Ok(Some(self.token.clone()))
    }
}

/// Unauthenticated access
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousCredentials;

#[async_trait]
impl TokenProvider for AnonymousCredentials {
    async fn token(&self) -> Result<Option<String>, CredentialsError> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Token minted by the instance metadata server
pub struct MetadataServerToken {
    http: reqwest::Client,
    url: String,
    cache: Mutex<Option<CachedToken>>,
}

impl MetadataServerToken {
    /// Create a provider for a metadata server base URL, e.g.
    /// `http://metadata.google.internal`
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            url: format!("{}{}", base_url.trim_end_matches('/'), TOKEN_PATH),
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<TokenResponse, CredentialsError> {
        let response = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::ResponseError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl TokenProvider for MetadataServerToken {
    async fn token(&self) -> Result<Option<String>, CredentialsError> {
        // Held across the refresh so concurrent requests share one fetch
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(Some(cached.value.clone()));
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!(expires_in = fresh.expires_in, "Fetched access token from metadata server");

        let value = fresh.access_token;
        *cache = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(Some(value))
    }
}

/// Pick the token provider described by the storage configuration.
///
/// Anonymous access wins over a static token, which wins over the metadata
/// server.
pub fn provider_from_config(config: &StorageConfig, http: reqwest::Client) -> Arc<dyn TokenProvider> {
    if config.anonymous {
        Arc::new(AnonymousCredentials)
    } else if let Some(token) = &config.access_token {
        Arc::new(StaticToken::new(token.clone()))
    } else {
        let host = &config.metadata_host;
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.clone()
        } else {
            format!("http://{}", host)
        };
        Arc::new(MetadataServerToken::new(http, &base_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken::new("static-token");
        assert_eq!(provider.token().await.unwrap(), Some("static-token".into()));
    }

    #[tokio::test]
    async fn test_anonymous_has_no_token() {
        assert_eq!(AnonymousCredentials.token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_anonymous_takes_precedence() {
        let config = StorageConfig {
            anonymous: true,
            access_token: Some("ignored".into()),
            ..StorageConfig::default()
        };
        let provider = provider_from_config(&config, reqwest::Client::new());
        assert_eq!(provider.token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_token_from_config() {
        let config = StorageConfig {
            access_token: Some("configured".into()),
            ..StorageConfig::default()
        };
        let provider = provider_from_config(&config, reqwest::Client::new());
        assert_eq!(provider.token().await.unwrap(), Some("configured".into()));
    }
}
