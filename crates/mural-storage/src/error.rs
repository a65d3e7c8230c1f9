//! Error types for mural-storage
//!
//! The taxonomy separates recoverable outcomes (version conflicts, which
//! carry the authoritative latest state) from terminal request failures
//! (validation, authorization, not-found) and infrastructure errors.

use thiserror::Error;
use uuid::Uuid;

use mural_canvas::CanvasProject;

/// Which configured ceiling a payload exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Too many elements in the scene
    MaxElements,
    /// A single inline image is too large
    MaxImageSize,
    /// The serialized payload is too large
    MaxPayloadSize,
}

impl LimitKind {
    /// Machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MaxElements => "MAX_ELEMENTS_EXCEEDED",
            Self::MaxImageSize => "MAX_IMAGE_SIZE_EXCEEDED",
            Self::MaxPayloadSize => "MAX_PAYLOAD_SIZE_EXCEEDED",
        }
    }
}

/// Storage error type
#[derive(Debug, Error)]
pub enum StorageError {
    /// Payload exceeds a configured limit. Rejected before any mutation.
    #[error("{message}")]
    Validation {
        /// Which limit was exceeded
        limit: LimitKind,
        /// Human-readable description
        message: String,
    },

    /// The conditional write matched zero rows: someone else updated the
    /// project first. Carries the authoritative latest state.
    #[error("version conflict: stored version is {}", latest.version)]
    VersionConflict {
        /// Current server state
        latest: Box<CanvasProject>,
    },

    /// Project not found
    #[error("project not found: {0}")]
    NotFound(Uuid),

    /// Caller does not own the project
    #[error("not authorized")]
    Unauthorized,

    /// Inline image materialization failed; completed uploads from the
    /// batch were rolled back best-effort.
    #[error("asset upload failed: {0}")]
    AssetUpload(String),

    /// Inline image payload is not valid base64
    #[error("invalid image data: {0}")]
    InvalidImage(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Build a validation error for an exceeded limit.
    #[must_use]
    pub fn limit(limit: LimitKind, message: impl Into<String>) -> Self {
        Self::Validation {
            limit,
            message: message.into(),
        }
    }

    /// Machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { limit, .. } => limit.code(),
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AssetUpload(_) => "ASSET_UPLOAD_FAILED",
            Self::InvalidImage(_) => "INVALID_IMAGE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the caller can resolve this by choosing a conflict
    /// resolution, as opposed to a terminal failure.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_codes() {
        assert_eq!(
            StorageError::limit(LimitKind::MaxElements, "too many").code(),
            "MAX_ELEMENTS_EXCEEDED"
        );
        assert_eq!(
            StorageError::limit(LimitKind::MaxImageSize, "too big").code(),
            "MAX_IMAGE_SIZE_EXCEEDED"
        );
        assert_eq!(
            StorageError::limit(LimitKind::MaxPayloadSize, "too big").code(),
            "MAX_PAYLOAD_SIZE_EXCEEDED"
        );
    }

    #[test]
    fn test_conflict_carries_latest() {
        let latest = CanvasProject::new("user1", "Theirs");
        let err = StorageError::VersionConflict {
            latest: Box::new(latest),
        };
        assert!(err.is_conflict());
        assert_eq!(err.code(), "VERSION_CONFLICT");
        assert!(err.to_string().contains("stored version is 1"));
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: StorageError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }
}
