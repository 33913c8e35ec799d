//! Upload validation
//!
//! Pure checks applied to a candidate upload before any byte reaches the
//! storage backend. The size limit is checked first; when it fails, the type
//! check is not evaluated, so the reported violation is deterministic.

use thiserror::Error;

/// Size and type restrictions applied to every upload.
///
/// Built once at startup and shared read-only across requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    max_size_bytes: u64,
    allowed_extensions: Option<Vec<String>>,
}

impl UploadPolicy {
    /// Create a policy.
    ///
    /// Extensions are lower-cased; an empty list is the same as `None`
    /// (no type restriction).
    pub fn new(max_size_bytes: u64, allowed_extensions: Option<Vec<String>>) -> Self {
        let allowed_extensions = allowed_extensions
            .map(|exts| {
                exts.into_iter()
                    .map(|ext| ext.to_lowercase())
                    .collect::<Vec<_>>()
            })
            .filter(|exts| !exts.is_empty());

        Self {
            max_size_bytes,
            allowed_extensions,
        }
    }

    /// Policy with a size limit and no type restriction
    pub fn unrestricted(max_size_bytes: u64) -> Self {
        Self::new(max_size_bytes, None)
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn allowed_extensions(&self) -> Option<&[String]> {
        self.allowed_extensions.as_deref()
    }
}

/// Metadata of an upload awaiting a policy decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub filename: String,
    pub declared_size_bytes: u64,
    pub content_type: String,
}

impl FileCandidate {
    pub fn new(
        filename: impl Into<String>,
        declared_size_bytes: u64,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            declared_size_bytes,
            content_type: content_type.into(),
        }
    }

    /// Lower-cased text after the last `.` of the filename, or `""` when
    /// the filename has no `.` at all
    pub fn extension(&self) -> String {
        match self.filename.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        }
    }
}

/// Reasons an upload is rejected by policy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("File size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("File type '{extension}' not allowed. Allowed types: {}", .allowed.join(", "))]
    TypeNotAllowed {
        extension: String,
        allowed: Vec<String>,
    },
}

impl PolicyViolation {
    /// Short label used in logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            PolicyViolation::FileTooLarge { .. } => "size",
            PolicyViolation::TypeNotAllowed { .. } => "type",
        }
    }
}

/// Check a candidate against the policy
pub fn validate(candidate: &FileCandidate, policy: &UploadPolicy) -> Result<(), PolicyViolation> {
    if candidate.declared_size_bytes > policy.max_size_bytes {
        return Err(PolicyViolation::FileTooLarge {
            size: candidate.declared_size_bytes,
            max: policy.max_size_bytes,
        });
    }

    if let Some(allowed) = policy.allowed_extensions() {
        let extension = candidate.extension();
        if !allowed.iter().any(|ext| *ext == extension) {
            return Err(PolicyViolation::TypeNotAllowed {
                extension,
                allowed: allowed.to_vec(),
            });
        }
    }

    Ok(())
}
