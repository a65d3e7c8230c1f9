//! Storage-backed save transport
//!
//! Adapts [`CanvasStorage`] to the client-side [`SaveTransport`] trait so
//! a [`mural_canvas::AutoSaveController`] can save directly through the
//! storage layer without an HTTP hop. Used by the integration tests and
//! by embedded deployments.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use mural_canvas::{SaveOutcome, SaveRequest, SaveTransport, TransportError};

use crate::error::StorageError;
use crate::storage::{CanvasStorage, UpdatePayload};

/// [`SaveTransport`] over a [`CanvasStorage`], acting as one owner.
#[derive(Clone)]
pub struct StorageTransport {
    storage: Arc<CanvasStorage>,
    owner_id: String,
}

impl StorageTransport {
    /// Create a transport that saves on behalf of `owner_id`.
    #[must_use]
    pub fn new(storage: Arc<CanvasStorage>, owner_id: impl Into<String>) -> Self {
        Self {
            storage,
            owner_id: owner_id.into(),
        }
    }
}

#[async_trait]
impl SaveTransport for StorageTransport {
    async fn save(
        &self,
        project_id: Uuid,
        request: SaveRequest,
    ) -> Result<SaveOutcome, TransportError> {
        let payload = UpdatePayload {
            elements: Some(request.elements),
            viewport: Some(request.viewport),
            title: Some(request.title),
        };

        match self
            .storage
            .update(project_id, &self.owner_id, payload, request.expected_version)
            .await
        {
            Ok(project) => Ok(SaveOutcome::Saved(project)),
            Err(StorageError::VersionConflict { latest }) => Ok(SaveOutcome::Conflict(*latest)),
            Err(
                err @ (StorageError::Validation { .. }
                | StorageError::Unauthorized
                | StorageError::NotFound(_)
                | StorageError::InvalidImage(_)),
            ) => Err(TransportError::Rejected {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
            // Infrastructure failures are worth retrying.
            Err(err) => Err(TransportError::Network(err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::config::StorageLimits;
    use mural_canvas::{CanvasElement, Viewport};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> Arc<CanvasStorage> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = CanvasStorage::new(
            pool,
            Arc::new(MemoryBlobStore::default()),
            StorageLimits::default(),
        );
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn request(expected_version: i64) -> SaveRequest {
        SaveRequest {
            elements: vec![CanvasElement::text("hello", 0.0, 0.0)],
            viewport: Viewport::default(),
            title: "Test".to_string(),
            expected_version,
        }
    }

    #[tokio::test]
    async fn test_save_maps_to_saved_outcome() {
        let storage = setup().await;
        let project = storage.get_or_create_default("user1").await.unwrap();
        let transport = StorageTransport::new(storage, "user1");

        let outcome = transport.save(project.id, request(1)).await.unwrap();
        match outcome {
            SaveOutcome::Saved(saved) => {
                assert_eq!(saved.version, 2);
                assert_eq!(saved.title, "Test");
            }
            other => panic!("expected Saved, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stale_save_maps_to_conflict_outcome() {
        let storage = setup().await;
        let project = storage.get_or_create_default("user1").await.unwrap();
        let transport = StorageTransport::new(storage, "user1");

        transport.save(project.id, request(1)).await.unwrap();
        let outcome = transport.save(project.id, request(1)).await.unwrap();

        match outcome {
            SaveOutcome::Conflict(latest) => assert_eq!(latest.version, 2),
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_foreign_owner_is_rejected_not_retried() {
        let storage = setup().await;
        let project = storage.get_or_create_default("user1").await.unwrap();
        let transport = StorageTransport::new(storage, "intruder");

        let err = transport.save(project.id, request(1)).await.unwrap_err();
        match err {
            TransportError::Rejected { ref code, .. } => assert_eq!(code, "UNAUTHORIZED"),
            other => panic!("expected Rejected, got {other:?}"),
        }
        assert!(!err.is_transient());
    }
}
