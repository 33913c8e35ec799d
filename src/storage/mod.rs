//! Object storage gateway
//!
//! [`StorageBackend`] is the seam to a concrete object store scoped to one
//! bucket. Backends report failures as [`BackendError`], which only tells
//! "object does not exist" apart from everything else.
//!
//! [`StorageGateway`] sits in front of a backend and turns its results into the
//! transfer taxonomy consumed by the HTTP layer: a success value or a
//! [`TransferFailure`] tagged with a [`FailureKind`].
//!
//! # Example
//!
//! ```no_run
//! use gcs_file_api::storage::{memory::MemoryBackend, StorageGateway};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let gateway = StorageGateway::new(Arc::new(MemoryBackend::new("my-bucket")));
//! let body = gcs_file_api::storage::stream_from_bytes("hello".into());
//! let stored = gateway.put("hello.txt", body, 5, "text/plain").await.unwrap();
//! assert_eq!(stored.size_bytes, 5);
//! # }
//! ```

pub mod credentials;
pub mod gcs;
pub mod memory;

use crate::metrics;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Content type used when neither the client nor the stored object names one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Single-pass stream of object bytes.
///
/// Exactly one consumer drains it; the stream ends when it yields `None`.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Wrap an in-memory buffer as a [`ByteStream`]
pub fn stream_from_bytes(data: Bytes) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Failure reported by a storage backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Object or bucket is missing; carries the backend's message
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Backend(String),
}

/// Metadata of a stored object as reported by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectMetadata {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Streaming read of a stored object
pub struct ObjectDownload {
    pub content_type: String,
    /// Length in bytes, when the backend announced it
    pub size: Option<u64>,
    pub body: ByteStream,
}

impl fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("content_type", &self.content_type)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Object store scoped to a single bucket
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the bucket this backend writes to
    fn bucket(&self) -> &str;

    /// Store `body` under `key`, replacing any existing object
    async fn put_object(
        &self,
        key: &str,
        body: ByteStream,
        size: u64,
        content_type: &str,
    ) -> Result<ObjectMetadata, BackendError>;

    /// Open a streaming read of `key`
    async fn get_object(&self, key: &str) -> Result<ObjectDownload, BackendError>;

    /// Fetch metadata of `key` without its content
    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError>;

    /// Remove `key`
    async fn delete_object(&self, key: &str) -> Result<(), BackendError>;
}

/// Classification of a failed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rejected by upload policy before reaching the backend
    PolicyViolation,
    /// Requested object does not exist
    NotFound,
    /// Any other backend failure
    BackendError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PolicyViolation => "policy_violation",
            FailureKind::NotFound => "not_found",
            FailureKind::BackendError => "backend_error",
        }
    }
}

/// Failed transfer with a client-facing message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransferFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransferFailure {
    pub fn not_found(object_key: &str) -> Self {
        Self {
            kind: FailureKind::NotFound,
            message: format!("File '{}' not found in bucket", object_key),
        }
    }

    pub fn backend(prefix: &str, detail: impl fmt::Display) -> Self {
        Self {
            kind: FailureKind::BackendError,
            message: format!("{}{}", prefix, detail),
        }
    }
}

impl From<crate::validation::PolicyViolation> for TransferFailure {
    fn from(violation: crate::validation::PolicyViolation) -> Self {
        Self {
            kind: FailureKind::PolicyViolation,
            message: violation.to_string(),
        }
    }
}

/// Successfully stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub object_key: String,
    pub size_bytes: u64,
    pub content_type: String,
}

/// Result of a storage operation
pub type TransferOutcome<T> = Result<T, TransferFailure>;

const UPLOAD_PREFIX: &str = "Failed to upload file: ";
const DOWNLOAD_PREFIX: &str = "Failed to download file: ";
const DELETE_PREFIX: &str = "Failed to delete file: ";
const METADATA_PREFIX: &str = "Failed to get file metadata: ";

/// Translate a backend error for read-side operations, where a missing object
/// is reported to the caller as such.
fn classify(key: &str, prefix: &str, err: BackendError) -> TransferFailure {
    match err {
        BackendError::NotFound(_) => TransferFailure::not_found(key),
        BackendError::Backend(detail) => TransferFailure::backend(prefix, detail),
    }
}

/// Normalizing front for a [`StorageBackend`]
#[derive(Clone)]
pub struct StorageGateway {
    backend: Arc<dyn StorageBackend>,
}

impl StorageGateway {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Bucket the gateway writes to
    pub fn bucket(&self) -> &str {
        self.backend.bucket()
    }

    /// Stream `body` into the bucket under `object_key`.
    ///
    /// Every backend failure, including a missing bucket, is a
    /// [`FailureKind::BackendError`] here.
    #[tracing::instrument(
        name = "storage.put",
        skip_all,
        fields(bucket = %self.bucket(), object_key = %object_key, bytes = size)
    )]
    pub async fn put(
        &self,
        object_key: &str,
        body: ByteStream,
        size: u64,
        content_type: &str,
    ) -> TransferOutcome<StoredObject> {
        let start = Instant::now();
        let result = self
            .backend
            .put_object(object_key, body, size, content_type)
            .await;
        metrics::record_backend_duration("put", start.elapsed().as_secs_f64());

        match result {
            Ok(meta) => {
                metrics::record_transfer("upload", "success");
                metrics::record_bytes("upload", meta.size);
                tracing::info!(size = meta.size, "Object stored");
                Ok(StoredObject {
                    object_key: object_key.to_string(),
                    size_bytes: meta.size,
                    content_type: meta
                        .content_type
                        .unwrap_or_else(|| content_type.to_string()),
                })
            }
            Err(err) => {
                metrics::record_transfer("upload", FailureKind::BackendError.as_str());
                tracing::error!(error = %err, "Backend rejected upload");
                Err(TransferFailure::backend(UPLOAD_PREFIX, err))
            }
        }
    }

    /// Open a streaming read of `object_key`
    #[tracing::instrument(
        name = "storage.get_stream",
        skip_all,
        fields(bucket = %self.bucket(), object_key = %object_key)
    )]
    pub async fn get_stream(&self, object_key: &str) -> TransferOutcome<ObjectDownload> {
        let start = Instant::now();
        let result = self.backend.get_object(object_key).await;
        metrics::record_backend_duration("get", start.elapsed().as_secs_f64());

        let outcome = result.map_err(|e| classify(object_key, DOWNLOAD_PREFIX, e));
        Self::record("download", &outcome);
        outcome
    }

    /// Remove `object_key` from the bucket
    #[tracing::instrument(
        name = "storage.delete",
        skip_all,
        fields(bucket = %self.bucket(), object_key = %object_key)
    )]
    pub async fn delete(&self, object_key: &str) -> TransferOutcome<()> {
        let start = Instant::now();
        let result = self.backend.delete_object(object_key).await;
        metrics::record_backend_duration("delete", start.elapsed().as_secs_f64());

        let outcome = result.map_err(|e| classify(object_key, DELETE_PREFIX, e));
        Self::record("delete", &outcome);
        outcome
    }

    /// Look up metadata of `object_key`
    #[tracing::instrument(
        name = "storage.metadata",
        skip_all,
        fields(bucket = %self.bucket(), object_key = %object_key)
    )]
    pub async fn metadata(&self, object_key: &str) -> TransferOutcome<ObjectMetadata> {
        let start = Instant::now();
        let result = self.backend.head_object(object_key).await;
        metrics::record_backend_duration("metadata", start.elapsed().as_secs_f64());

        let outcome = result.map_err(|e| classify(object_key, METADATA_PREFIX, e));
        Self::record("metadata", &outcome);
        outcome
    }

    fn record<T>(operation: &str, outcome: &TransferOutcome<T>) {
        match outcome {
            Ok(_) => metrics::record_transfer(operation, "success"),
            Err(failure) => {
                metrics::record_transfer(operation, failure.kind.as_str());
                match failure.kind {
                    FailureKind::NotFound => tracing::warn!("{}", failure.message),
                    _ => tracing::error!("{}", failure.message),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::MemoryBackend;

    /// Backend whose every call fails the same way
    struct BrokenBackend {
        not_found: bool,
    }

    impl BrokenBackend {
        fn error(&self, key: &str) -> BackendError {
            if self.not_found {
                BackendError::NotFound(format!("No such object: broken/{}", key))
            } else {
                BackendError::Backend("permission denied".into())
            }
        }
    }

    #[async_trait]
    impl StorageBackend for BrokenBackend {
        fn bucket(&self) -> &str {
            "broken"
        }

        async fn put_object(
            &self,
            key: &str,
            _body: ByteStream,
            _size: u64,
            _content_type: &str,
        ) -> Result<ObjectMetadata, BackendError> {
            Err(self.error(key))
        }

        async fn get_object(&self, key: &str) -> Result<ObjectDownload, BackendError> {
            Err(self.error(key))
        }

        async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError> {
            Err(self.error(key))
        }

        async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
            Err(self.error(key))
        }
    }

    fn gateway(not_found: bool) -> StorageGateway {
        StorageGateway::new(Arc::new(BrokenBackend { not_found }))
    }

    #[tokio::test]
    async fn test_missing_object_maps_to_not_found() {
        let err = gateway(true).get_stream("missing.txt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert_eq!(err.message, "File 'missing.txt' not found in bucket");

        let err = gateway(true).delete("missing.txt").await.unwrap_err();
        assert_eq!(err, TransferFailure::not_found("missing.txt"));
    }

    #[tokio::test]
    async fn test_backend_failures_are_prefixed() {
        let err = gateway(false).get_stream("a.txt").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::BackendError);
        assert_eq!(err.message, "Failed to download file: permission denied");

        let err = gateway(false).delete("a.txt").await.unwrap_err();
        assert_eq!(err.message, "Failed to delete file: permission denied");

        let err = gateway(false).metadata("a.txt").await.unwrap_err();
        assert_eq!(err.message, "Failed to get file metadata: permission denied");
    }

    #[tokio::test]
    async fn test_put_never_reports_not_found() {
        let body = stream_from_bytes(Bytes::from_static(b"data"));
        let err = gateway(true)
            .put("a.txt", body, 4, "text/plain")
            .await
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::BackendError);
        assert_eq!(err.message, "Failed to upload file: No such object: broken/a.txt");
    }

    #[tokio::test]
    async fn test_put_reports_backend_size() {
        let gateway = StorageGateway::new(Arc::new(MemoryBackend::new("bucket")));
        let body = stream_from_bytes(Bytes::from_static(b"0123456789"));

        let stored = gateway.put("a.txt", body, 10, "text/plain").await.unwrap();
        assert_eq!(
            stored,
            StoredObject {
                object_key: "a.txt".into(),
                size_bytes: 10,
                content_type: "text/plain".into(),
            }
        );
        assert_eq!(gateway.bucket(), "bucket");
    }

    #[test]
    fn test_policy_violation_conversion() {
        let violation = crate::validation::PolicyViolation::FileTooLarge { size: 2, max: 1 };
        let failure = TransferFailure::from(violation);
        assert_eq!(failure.kind, FailureKind::PolicyViolation);
        assert_eq!(
            failure.message,
            "File size (2 bytes) exceeds maximum allowed size (1 bytes)"
        );
    }
}
