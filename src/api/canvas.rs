//! Canvas API endpoints
//!
//! All endpoints act on behalf of the identity in the `x-user-id`
//! header. Saves are conditional on `expectedVersion`; a stale version
//! yields `409` with the authoritative latest project so the client can
//! offer a resolution choice.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use mural_canvas::{CanvasElement, Viewport};
use mural_storage::{CanvasStorage, StorageError, UpdatePayload};

use crate::middleware::auth::OwnerId;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    storage: Arc<CanvasStorage>,
}

impl AppState {
    /// Create handler state over initialized storage.
    pub fn new(storage: Arc<CanvasStorage>) -> Self {
        Self { storage }
    }
}

/// Save request body: partial payload plus the concurrency token.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveCanvasRequest {
    pub elements: Option<Vec<CanvasElement>>,
    pub viewport: Option<Viewport>,
    pub title: Option<String>,
    pub expected_version: i64,
}

/// Thumbnail upload body. The image is a `data:*;base64,` URL.
#[derive(Debug, Deserialize)]
pub struct ThumbnailRequest {
    pub image: String,
}

/// Storage error adapted to an HTTP response.
pub struct ApiError(StorageError);

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = match &err {
            StorageError::Validation { .. } | StorageError::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            StorageError::VersionConflict { .. } => StatusCode::CONFLICT,
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::Unauthorized => StatusCode::FORBIDDEN,
            StorageError::AssetUpload(_)
            | StorageError::Database(_)
            | StorageError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &err {
            // The conflict body carries the current server state so the
            // client can resolve without another round trip.
            StorageError::VersionConflict { latest } => json!({
                "error": err.to_string(),
                "code": err.code(),
                "latestProject": latest,
            }),
            _ => json!({
                "error": err.to_string(),
                "code": err.code(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Fetch the caller's canvas, creating an empty one on first access.
async fn get_default_canvas(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let project = state.storage.get_or_create_default(&owner).await?;
    Ok(Json(json!({ "project": project })).into_response())
}

/// List the caller's canvases.
async fn list_canvases(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let projects = state.storage.find_by_owner(&owner).await?;
    Ok(Json(json!({ "projects": projects })).into_response())
}

/// Save a canvas under optimistic concurrency control.
async fn save_canvas(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SaveCanvasRequest>,
) -> Result<Response, ApiError> {
    let payload = UpdatePayload {
        elements: request.elements,
        viewport: request.viewport,
        title: request.title,
    };
    let project = state
        .storage
        .update(id, &owner, payload, request.expected_version)
        .await?;
    Ok(Json(json!({ "project": project })).into_response())
}

/// Upload a rendered thumbnail for a canvas.
async fn upload_thumbnail(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ThumbnailRequest>,
) -> Result<Response, ApiError> {
    let content_type = data_url_content_type(&request.image).unwrap_or("image/png");
    let url = state
        .storage
        .update_thumbnail(id, &owner, &request.image, content_type)
        .await?;
    Ok(Json(json!({ "thumbnailUrl": url })).into_response())
}

/// Delete a canvas and its stored assets.
async fn delete_canvas(
    OwnerId(owner): OwnerId,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.storage.delete(id, &owner).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Content type from a `data:<type>;base64,` prefix, if present.
fn data_url_content_type(data: &str) -> Option<&str> {
    data.strip_prefix("data:")?.split(';').next()
}

/// Create canvas routes
pub fn canvas_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/canvas/default", get(get_default_canvas))
        .route("/api/canvas", get(list_canvases))
        .route("/api/canvas/:id", put(save_canvas).delete(delete_canvas))
        .route("/api/canvas/:id/thumbnail", put(upload_thumbnail))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_content_type() {
        assert_eq!(
            data_url_content_type("data:image/webp;base64,AAAA"),
            Some("image/webp")
        );
        assert_eq!(data_url_content_type("AAAA"), None);
    }

    #[test]
    fn test_save_request_accepts_partial_body() {
        let request: SaveCanvasRequest =
            serde_json::from_str(r#"{"title":"Renamed","expectedVersion":3}"#).unwrap();
        assert!(request.elements.is_none());
        assert!(request.viewport.is_none());
        assert_eq!(request.title.as_deref(), Some("Renamed"));
        assert_eq!(request.expected_version, 3);
    }
}
