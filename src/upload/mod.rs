//! Upload module
//!
//! Receives the `file` part of a `multipart/form-data` upload and spools it to
//! disk so it can be validated and then streamed to the storage backend.

use thiserror::Error;

pub mod multipart;
pub mod temp_file;

pub use multipart::{receive_file, FILE_FIELD};
pub use temp_file::UploadSpool;

/// Upload errors
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Expected multipart/form-data request")]
    NotMultipart,

    #[error("Failed to parse multipart data: {0}")]
    Multipart(#[from] multer::Error),

    #[error("Missing required form field '{0}'")]
    MissingField(&'static str),

    #[error("Uploaded file has no filename")]
    MissingFilename,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Upload of {received} bytes exceeds the {limit} byte spool limit")]
    Truncated { received: u64, limit: u64 },
}

impl UploadError {
    /// Whether the request itself was at fault, as opposed to local I/O
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::IoError(_) | UploadError::Truncated { .. })
    }
}

/// File part received from the client
pub struct ReceivedFile {
    pub filename: String,
    /// Content type declared on the part, if any
    pub content_type: Option<String>,
    pub spool: UploadSpool,
}

impl ReceivedFile {
    /// Bytes received for the part
    pub fn size(&self) -> u64 {
        self.spool.len()
    }
}
