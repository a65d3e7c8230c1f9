//! Save Transport
//!
//! The seam between the client-side autosave loop and whatever carries a
//! save request to the storage layer (HTTP in production, an in-process
//! adapter in tests and server-side tooling).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::element::CanvasElement;
use crate::project::{CanvasProject, Viewport};

/// A full-state save request carrying the optimistic-concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// Elements after the last mutation in the quiet window
    pub elements: Vec<CanvasElement>,
    /// Viewport after the last mutation in the quiet window
    pub viewport: Viewport,
    /// Project title
    pub title: String,
    /// Version the client believes the server holds
    pub expected_version: i64,
}

/// Outcome of a save that reached the server.
///
/// A version conflict is a negotiated outcome, not a transport failure;
/// it always carries the authoritative latest project.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// Accepted; the returned project is authoritative (the server may
    /// have rewritten inline images to durable URLs).
    Saved(CanvasProject),
    /// Rejected on version mismatch; the returned project is the current
    /// server state.
    Conflict(CanvasProject),
}

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never completed; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// The server refused the request; retrying the same payload cannot
    /// succeed.
    #[error("request rejected ({code}): {message}")]
    Rejected {
        /// Machine-readable error code
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl TransportError {
    /// Whether the autosave loop should retry this error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Carrier for save requests.
#[async_trait]
pub trait SaveTransport: Send + Sync {
    /// Persist a snapshot of `project_id`, conditioned on
    /// `request.expected_version`.
    async fn save(
        &self,
        project_id: Uuid,
        request: SaveRequest,
    ) -> Result<SaveOutcome, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_transience() {
        assert!(TransportError::Network("timeout".into()).is_transient());
        assert!(!TransportError::Rejected {
            code: "MAX_ELEMENTS_EXCEEDED".into(),
            message: "too many elements".into(),
        }
        .is_transient());
    }

    #[test]
    fn test_save_request_wire_shape() {
        let request = SaveRequest {
            elements: Vec::new(),
            viewport: Viewport::default(),
            title: "Test".into(),
            expected_version: 3,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"expectedVersion\":3"));
    }
}
