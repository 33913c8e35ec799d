//! Google Cloud Storage backend
//!
//! Talks to the GCS JSON API over `reqwest`:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | put | `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}` |
//! | get | `GET /storage/v1/b/{bucket}/o/{key}?alt=media` |
//! | head | `GET /storage/v1/b/{bucket}/o/{key}` |
//! | delete | `DELETE /storage/v1/b/{bucket}/o/{key}` |
//!
//! Request bodies and download bodies are streamed; neither direction
//! buffers a whole object. An HTTP 404 from GCS is the only response reported
//! as [`BackendError::NotFound`].

use super::credentials::{provider_from_config, TokenProvider};
use super::{
    BackendError, ByteStream, ObjectDownload, ObjectMetadata, StorageBackend, DEFAULT_CONTENT_TYPE,
};
use crate::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

/// Characters escaped in a path segment: everything except RFC 3986 unreserved
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// GCS backend configuration
#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub bucket: String,
    /// Base URL of the JSON API, e.g. `https://storage.googleapis.com`
    pub endpoint: String,
}

/// Object resource returned by the JSON API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    #[serde(deserialize_with = "de_size")]
    size: u64,
    content_type: Option<String>,
    time_created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
}

impl From<GcsObject> for ObjectMetadata {
    fn from(obj: GcsObject) -> Self {
        Self {
            name: obj.name,
            size: obj.size,
            content_type: obj.content_type,
            created: obj.time_created,
            updated: obj.updated,
        }
    }
}

/// The JSON API encodes `size` as a decimal string
fn de_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Text(String),
        Number(u64),
    }

    match Size::deserialize(deserializer)? {
        Size::Text(s) => s.parse().map_err(serde::de::Error::custom),
        Size::Number(n) => Ok(n),
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// GCS JSON API client scoped to one bucket
pub struct GcsBackend {
    config: GcsConfig,
    http: reqwest::Client,
    credentials: Arc<dyn TokenProvider>,
}

impl GcsBackend {
    /// Create a backend
    pub fn new(
        config: GcsConfig,
        http: reqwest::Client,
        credentials: Arc<dyn TokenProvider>,
    ) -> Self {
        let config = GcsConfig {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            ..config
        };

        Self {
            config,
            http,
            credentials,
        }
    }

    /// Create a backend, HTTP client and credentials from application configuration
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gcs-file-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::Backend(format!("Failed to build HTTP client: {}", e)))?;

        let credentials = provider_from_config(&config.storage, http.clone());

        Ok(Self::new(
            GcsConfig {
                bucket: config.bucket_name.clone(),
                endpoint: config.storage.endpoint.clone(),
            },
            http,
            credentials,
        ))
    }

    /// Get the endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.config.endpoint,
            utf8_percent_encode(&self.config.bucket, PATH_SEGMENT),
            utf8_percent_encode(key, PATH_SEGMENT)
        )
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o",
            self.config.endpoint,
            utf8_percent_encode(&self.config.bucket, PATH_SEGMENT)
        )
    }

    /// Attach the bearer token, if the credentials provide one
    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, BackendError> {
        let token = self
            .credentials
            .token()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;

        Ok(match token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .map_err(|e| BackendError::Backend(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(status, response).await;
        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(message));
        }
        Err(BackendError::Backend(message))
    }
}

/// Extract the message GCS puts in `{"error": {"message": ...}}`, falling back
/// to the raw body and then to the status line
async fn error_message(status: StatusCode, response: Response) -> String {
    let body = response.text().await.unwrap_or_default();

    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        if !envelope.error.message.is_empty() {
            return envelope.error.message;
        }
    }

    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    }
}

#[async_trait]
impl StorageBackend for GcsBackend {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn put_object(
        &self,
        key: &str,
        body: ByteStream,
        size: u64,
        content_type: &str,
    ) -> Result<ObjectMetadata, BackendError> {
        let request = self
            .http
            .post(self.upload_url())
            .query(&[("uploadType", "media"), ("name", key)])
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(body));

        let response = self.send(request).await?;
        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| BackendError::Backend(format!("Invalid upload response: {}", e)))?;

        tracing::debug!(name = %object.name, size = object.size, "GCS upload acknowledged");
        Ok(object.into())
    }

    async fn get_object(&self, key: &str) -> Result<ObjectDownload, BackendError> {
        let request = self.http.get(self.object_url(key)).query(&[("alt", "media")]);
        let response = self.send(request).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let size = response.content_length();

        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(ObjectDownload {
            content_type,
            size,
            body: Box::pin(body),
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError> {
        let request = self.http.get(self.object_url(key));
        let response = self.send(request).await?;

        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| BackendError::Backend(format!("Invalid metadata response: {}", e)))?;
        Ok(object.into())
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        let request = self.http.delete(self.object_url(key));
        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::credentials::AnonymousCredentials;

    fn backend(endpoint: &str) -> GcsBackend {
        GcsBackend::new(
            GcsConfig {
                bucket: "test-bucket".into(),
                endpoint: endpoint.into(),
            },
            reqwest::Client::new(),
            Arc::new(AnonymousCredentials),
        )
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = backend("http://localhost:4443/");
        assert_eq!(backend.endpoint(), "http://localhost:4443");
    }

    #[test]
    fn test_object_url_escapes_key() {
        let backend = backend("https://storage.googleapis.com");
        assert_eq!(
            backend.object_url("dir/my file.txt"),
            "https://storage.googleapis.com/storage/v1/b/test-bucket/o/dir%2Fmy%20file.txt"
        );
        assert_eq!(
            backend.object_url("a-b_c~d.txt"),
            "https://storage.googleapis.com/storage/v1/b/test-bucket/o/a-b_c~d.txt"
        );
    }

    #[test]
    fn test_upload_url() {
        let backend = backend("https://storage.googleapis.com");
        assert_eq!(
            backend.upload_url(),
            "https://storage.googleapis.com/upload/storage/v1/b/test-bucket/o"
        );
    }

    #[test]
    fn test_object_resource_parsing() {
        let json = r#"{
            "kind": "storage#object",
            "name": "a.txt",
            "bucket": "test-bucket",
            "size": "10",
            "contentType": "text/plain",
            "timeCreated": "2024-05-01T12:00:00.000Z",
            "updated": "2024-05-01T12:00:00.000Z"
        }"#;

        let meta: ObjectMetadata = serde_json::from_str::<GcsObject>(json).unwrap().into();
        assert_eq!(meta.name, "a.txt");
        assert_eq!(meta.size, 10);
        assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
        assert!(meta.created.is_some());
    }

    #[test]
    fn test_numeric_size_accepted() {
        let json = r#"{"name": "a.txt", "size": 42}"#;
        let object: GcsObject = serde_json::from_str(json).unwrap();
        assert_eq!(object.size, 42);
        assert!(object.content_type.is_none());
    }
}
