//! Temp-file spooling for inbound uploads
//!
//! The file part of an upload is written to an anonymous temp file while it
//! arrives, so memory use stays bounded by the chunk size rather than the file
//! size. Once the running total passes the limit, chunks are still counted
//! but no longer written, which keeps the exact observed size available for
//! the policy decision without storing bytes that will be rejected anyway.
//!
//! # Flow
//!
//! 1. [`UploadSpool::new`] creates the temp file
//! 2. [`UploadSpool::write_chunk`] is called for every received chunk
//! 3. [`UploadSpool::into_stream`] rewinds and re-reads the file as a
//!    [`ByteStream`] for the backend
//!
//! The OS removes the file once the last handle is dropped.

use super::UploadError;
use crate::storage::ByteStream;
use bytes::BytesMut;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Read size when streaming the spooled file back out
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Upload body spooled to disk
pub struct UploadSpool {
    file: File,
    limit: u64,
    len: u64,
}

impl UploadSpool {
    /// Create an empty spool that stores at most `limit` bytes
    pub async fn new(limit: u64) -> Result<Self, UploadError> {
        let file = tokio::task::spawn_blocking(tempfile::tempfile)
            .await
            .map_err(|e| UploadError::IoError(std::io::Error::other(e)))??;

        Ok(Self {
            file: File::from_std(file),
            limit,
            len: 0,
        })
    }

    /// Append a chunk.
    ///
    /// The chunk is always counted; it is only written while the total stays
    /// within the limit.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.len += chunk.len() as u64;
        if self.len <= self.limit {
            self.file.write_all(chunk).await?;
        }
        Ok(())
    }

    /// Total bytes received
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether bytes were dropped because the limit was exceeded
    pub fn is_truncated(&self) -> bool {
        self.len > self.limit
    }

    /// Rewind and stream the spooled bytes
    pub async fn into_stream(mut self) -> Result<ByteStream, UploadError> {
        if self.is_truncated() {
            return Err(UploadError::Truncated {
                received: self.len,
                limit: self.limit,
            });
        }

        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;

        let stream = futures::stream::try_unfold(self.file, |mut file| async move {
            let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
            let read = file.read_buf(&mut buf).await?;
            if read == 0 {
                Ok::<_, std::io::Error>(None)
            } else {
                Ok(Some((buf.freeze(), file)))
            }
        });

        Ok(Box::pin(stream))
    }
}
