//! Canvas Storage
//!
//! SQLite-backed project persistence with optimistic concurrency
//! control. Concurrent edits from different sessions are arbitrated by a
//! single conditional write against the version column; there are no
//! server-held locks. Inline image payloads are materialized into blob
//! storage before the row is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use mural_canvas::{CanvasElement, CanvasProject, ElementKind, ImageSource, ProjectSummary, Viewport};

use crate::assets::{
    base64_payload, decode_inline, extension_for, materialize_inline_images, project_prefix,
};
use crate::blob::BlobStore;
use crate::config::StorageLimits;
use crate::error::{LimitKind, Result, StorageError};

/// Title given to the lazily created default project.
pub const DEFAULT_PROJECT_TITLE: &str = "Untitled canvas";

/// Partial update applied to a project row. Absent fields keep their
/// stored value.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    /// Replacement element list
    pub elements: Option<Vec<CanvasElement>>,
    /// Replacement viewport
    pub viewport: Option<Viewport>,
    /// Replacement title
    pub title: Option<String>,
}

/// SQLite-backed canvas project store.
pub struct CanvasStorage {
    pool: SqlitePool,
    blobs: Arc<dyn BlobStore>,
    limits: StorageLimits,
}

impl CanvasStorage {
    /// Create a storage layer over a database pool and blob store.
    #[must_use]
    pub fn new(pool: SqlitePool, blobs: Arc<dyn BlobStore>, limits: StorageLimits) -> Self {
        Self {
            pool,
            blobs,
            limits,
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS canvas_projects (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL,
                viewport TEXT NOT NULL,
                elements TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                thumbnail_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_projects_owner ON canvas_projects(owner_id);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create a project at version 1, materializing any inline images
    /// first.
    pub async fn create(
        &self,
        owner_id: &str,
        title: &str,
        elements: Vec<CanvasElement>,
        viewport: Viewport,
    ) -> Result<CanvasProject> {
        self.validate(&elements)?;

        let mut project = CanvasProject::new(owner_id, title);
        project.viewport = viewport;
        project.elements =
            materialize_inline_images(self.blobs.as_ref(), project.id, elements).await?;

        sqlx::query(
            r#"
            INSERT INTO canvas_projects
            (id, owner_id, title, viewport, elements, version, thumbnail_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(project.id.to_string())
        .bind(&project.owner_id)
        .bind(&project.title)
        .bind(serde_json::to_string(&project.viewport)?)
        .bind(serde_json::to_string(&project.elements)?)
        .bind(project.version)
        .bind(&project.thumbnail_url)
        .bind(project.created_at.to_rfc3339())
        .bind(project.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(project_id = %project.id, owner_id, "created canvas project");
        Ok(project)
    }

    /// Fetch the caller's project, creating an empty default on first
    /// access.
    pub async fn get_or_create_default(&self, owner_id: &str) -> Result<CanvasProject> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, title, viewport, elements, version, thumbnail_url, created_at, updated_at
            FROM canvas_projects
            WHERE owner_id = ?
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_project(&row),
            None => {
                debug!(owner_id, "no project yet, creating default");
                self.create(owner_id, DEFAULT_PROJECT_TITLE, Vec::new(), Viewport::default())
                    .await
            }
        }
    }

    /// Fetch a project, verifying ownership.
    pub async fn find_by_id(&self, id: Uuid, owner_id: &str) -> Result<CanvasProject> {
        let project = self
            .fetch_project(id)
            .await?
            .ok_or(StorageError::NotFound(id))?;
        if project.owner_id != owner_id {
            return Err(StorageError::Unauthorized);
        }
        Ok(project)
    }

    /// List the caller's projects as lightweight summaries, without the
    /// element payload.
    pub async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<ProjectSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, thumbnail_url, version, created_at, updated_at
            FROM canvas_projects
            WHERE owner_id = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ProjectSummary {
                    id: parse_uuid(&row.get::<String, _>("id"))?,
                    title: row.get("title"),
                    thumbnail_url: row.get("thumbnail_url"),
                    version: row.get("version"),
                    created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
                    updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
                })
            })
            .collect()
    }

    /// Update a project under optimistic concurrency control.
    ///
    /// Validation failures reject the payload before any side effect.
    /// The write itself is a single conditional `UPDATE ... WHERE
    /// version = expected`; if it matches zero rows the current row is
    /// re-fetched and returned inside [`StorageError::VersionConflict`]
    /// as the authoritative latest state.
    pub async fn update(
        &self,
        id: Uuid,
        owner_id: &str,
        payload: UpdatePayload,
        expected_version: i64,
    ) -> Result<CanvasProject> {
        let current = self.find_by_id(id, owner_id).await?;

        let title = payload.title.unwrap_or(current.title);
        let viewport = payload.viewport.unwrap_or(current.viewport);
        let elements = payload.elements.unwrap_or(current.elements);

        self.validate(&elements)?;
        let elements = materialize_inline_images(self.blobs.as_ref(), id, elements).await?;

        // RETURNING ties the read-back to the conditional write itself,
        // so the success result is always this caller's own row.
        let row = sqlx::query(
            r#"
            UPDATE canvas_projects
            SET title = ?, viewport = ?, elements = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            RETURNING id, owner_id, title, viewport, elements, version, thumbnail_url, created_at, updated_at
            "#,
        )
        .bind(&title)
        .bind(serde_json::to_string(&viewport)?)
        .bind(serde_json::to_string(&elements)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                debug!(project_id = %id, new_version = expected_version + 1, "updated canvas project");
                row_to_project(&row)
            }
            None => {
                let latest = self
                    .fetch_project(id)
                    .await?
                    .ok_or(StorageError::NotFound(id))?;
                warn!(
                    project_id = %id,
                    expected_version,
                    stored_version = latest.version,
                    "conditional update matched zero rows"
                );
                Err(StorageError::VersionConflict {
                    latest: Box::new(latest),
                })
            }
        }
    }

    /// Delete a project and, best-effort, its stored assets.
    pub async fn delete(&self, id: Uuid, owner_id: &str) -> Result<()> {
        self.find_by_id(id, owner_id).await?;

        // Blob cleanup must not block the delete itself.
        let prefix = project_prefix(id);
        match self.blobs.list_prefix(&prefix).await {
            Ok(paths) if !paths.is_empty() => {
                if let Err(e) = self.blobs.delete(&paths).await {
                    warn!(project_id = %id, error = %e, "asset cleanup failed on delete");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(project_id = %id, error = %e, "asset listing failed on delete"),
        }

        sqlx::query("DELETE FROM canvas_projects WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        info!(project_id = %id, owner_id, "deleted canvas project");
        Ok(())
    }

    /// Upload a rendered thumbnail and record its URL. Thumbnails are
    /// best-effort and overwritable; this path is independent of the
    /// optimistic lock and does not touch the version column.
    pub async fn update_thumbnail(
        &self,
        id: Uuid,
        owner_id: &str,
        data: &str,
        content_type: &str,
    ) -> Result<String> {
        self.find_by_id(id, owner_id).await?;

        let bytes = decode_inline(data)?;
        if bytes.len() > self.limits.max_image_bytes {
            return Err(StorageError::limit(
                LimitKind::MaxImageSize,
                format!(
                    "thumbnail is {} bytes, limit is {}",
                    bytes.len(),
                    self.limits.max_image_bytes
                ),
            ));
        }

        let path = format!("{}thumbnail.{}", project_prefix(id), extension_for(content_type));
        let stored = self
            .blobs
            .upload(&path, bytes, content_type)
            .await
            .map_err(|e| StorageError::AssetUpload(e.to_string()))?;
        let url = self.blobs.public_url(&stored);

        sqlx::query("UPDATE canvas_projects SET thumbnail_url = ? WHERE id = ?")
            .bind(&url)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(url)
    }

    /// Reject payloads over the configured ceilings before anything is
    /// mutated.
    fn validate(&self, elements: &[CanvasElement]) -> Result<()> {
        if elements.len() > self.limits.max_elements {
            return Err(StorageError::limit(
                LimitKind::MaxElements,
                format!(
                    "{} elements, limit is {}",
                    elements.len(),
                    self.limits.max_elements
                ),
            ));
        }

        for element in elements {
            if let ElementKind::Image {
                source: ImageSource::Inline { data, .. },
            } = &element.kind
            {
                // Base64 expands by 4/3; estimate the decoded size
                // without decoding the whole payload. A `data:` URL
                // prefix is not part of the image.
                let estimated = base64_payload(data).len() / 4 * 3;
                if estimated > self.limits.max_image_bytes {
                    return Err(StorageError::limit(
                        LimitKind::MaxImageSize,
                        format!(
                            "inline image on element {} is ~{estimated} bytes, limit is {}",
                            element.id, self.limits.max_image_bytes
                        ),
                    ));
                }
            }
        }

        let serialized_len = serde_json::to_string(elements)?.len();
        if serialized_len > self.limits.max_payload_bytes {
            return Err(StorageError::limit(
                LimitKind::MaxPayloadSize,
                format!(
                    "payload is {serialized_len} bytes, limit is {}",
                    self.limits.max_payload_bytes
                ),
            ));
        }

        Ok(())
    }

    async fn fetch_project(&self, id: Uuid) -> Result<Option<CanvasProject>> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, title, viewport, elements, version, thumbnail_url, created_at, updated_at
            FROM canvas_projects
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_project).transpose()
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn row_to_project(row: &sqlx::sqlite::SqliteRow) -> Result<CanvasProject> {
    let viewport: Viewport = serde_json::from_str(&row.get::<String, _>("viewport"))?;
    let elements: Vec<CanvasElement> = serde_json::from_str(&row.get::<String, _>("elements"))?;

    Ok(CanvasProject {
        id: parse_uuid(&row.get::<String, _>("id"))?,
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        viewport,
        elements,
        thumbnail_url: row.get("thumbnail_url"),
        version: row.get("version"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}
