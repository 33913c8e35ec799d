//! In-process storage backend
//!
//! Keeps objects in a map guarded by a read-write lock. Used by the test
//! suite and for running the API locally without a bucket.

use super::{
    stream_from_bytes, BackendError, ByteStream, ObjectDownload, ObjectMetadata, StorageBackend,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl StoredBlob {
    fn metadata(&self, name: &str) -> ObjectMetadata {
        ObjectMetadata {
            name: name.to_string(),
            size: self.data.len() as u64,
            content_type: Some(self.content_type.clone()),
            created: Some(self.created),
            updated: Some(self.updated),
        }
    }
}

/// Bucket held in memory
pub struct MemoryBackend {
    bucket: String,
    objects: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBackend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn missing(&self, key: &str) -> BackendError {
        BackendError::NotFound(format!("No such object: {}/{}", self.bucket, key))
    }

    /// Raw content of `key`, if stored
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).map(|blob| blob.data.clone())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(
        &self,
        key: &str,
        body: ByteStream,
        size: u64,
        content_type: &str,
    ) -> Result<ObjectMetadata, BackendError> {
        let data = body
            .try_fold(BytesMut::with_capacity(size as usize), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await
            .map_err(|e| BackendError::Backend(format!("Failed to read upload stream: {}", e)))?
            .freeze();

        let now = Utc::now();
        let mut objects = self.objects.write();
        // Overwrites start a new generation, as GCS does
        let blob = StoredBlob {
            data,
            content_type: content_type.to_string(),
            created: now,
            updated: now,
        };
        let metadata = blob.metadata(key);
        objects.insert(key.to_string(), blob);

        Ok(metadata)
    }

    async fn get_object(&self, key: &str) -> Result<ObjectDownload, BackendError> {
        let blob = self
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| self.missing(key))?;

        Ok(ObjectDownload {
            content_type: blob.content_type,
            size: Some(blob.data.len() as u64),
            body: stream_from_bytes(blob.data),
        })
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMetadata, BackendError> {
        self.objects
            .read()
            .get(key)
            .map(|blob| blob.metadata(key))
            .ok_or_else(|| self.missing(key))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BackendError> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| self.missing(key))
    }
}
