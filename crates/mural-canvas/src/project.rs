//! Canvas Project Types
//!
//! A project is the unit of persistence: a scene graph plus viewport,
//! owned by a user and guarded by a monotonically increasing version
//! used as the optimistic-concurrency token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::element::CanvasElement;

/// Minimum viewport zoom.
pub const MIN_ZOOM: f64 = 0.25;

/// Maximum viewport zoom.
pub const MAX_ZOOM: f64 = 4.0;

/// Pan/zoom state of the canvas stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Stage x offset in screen coordinates
    pub x: f64,
    /// Stage y offset in screen coordinates
    pub y: f64,
    /// Zoom factor, clamped to `[MIN_ZOOM, MAX_ZOOM]`
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Clamp a zoom factor to the allowed range.
#[must_use]
pub fn clamp_zoom(zoom: f64) -> f64 {
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

/// Partial viewport update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewportPatch {
    /// New stage x offset
    pub x: Option<f64>,
    /// New stage y offset
    pub y: Option<f64>,
    /// New zoom factor (clamped on apply)
    pub zoom: Option<f64>,
}

impl ViewportPatch {
    /// Apply this patch to a viewport, clamping zoom.
    pub fn apply(&self, viewport: &mut Viewport) {
        if let Some(x) = self.x {
            viewport.x = x;
        }
        if let Some(y) = self.y {
            viewport.y = y;
        }
        if let Some(zoom) = self.zoom {
            viewport.zoom = clamp_zoom(zoom);
        }
    }
}

/// A persisted canvas project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasProject {
    /// Unique identifier
    pub id: Uuid,

    /// Owning user (opaque identity resolved upstream)
    pub owner_id: String,

    /// Project title
    pub title: String,

    /// Stage pan/zoom state
    pub viewport: Viewport,

    /// Scene graph elements in paint order
    pub elements: Vec<CanvasElement>,

    /// Thumbnail URL, if one has been rendered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,

    /// Optimistic-concurrency token. Starts at 1 and increments by exactly
    /// one per successful update; only ever increases.
    pub version: i64,

    /// When the project was created
    pub created_at: DateTime<Utc>,

    /// When the project was last updated
    pub updated_at: DateTime<Utc>,
}

impl CanvasProject {
    /// Create a new empty project at version 1.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            title: title.into(),
            viewport: Viewport::default(),
            elements: Vec::new(),
            thumbnail_url: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with a specific id.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Look up an element by id.
    #[must_use]
    pub fn get_element(&self, element_id: Uuid) -> Option<&CanvasElement> {
        self.elements.iter().find(|e| e.id == element_id)
    }
}

/// Lightweight listing projection, without the element payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    /// Project id
    pub id: Uuid,
    /// Project title
    pub title: String,
    /// Thumbnail URL, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Current version
    pub version: i64,
    /// When the project was created
    pub created_at: DateTime<Utc>,
    /// When the project was last updated
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::CanvasElement;

    #[test]
    fn test_new_project_starts_at_version_one() {
        let project = CanvasProject::new("user1", "My canvas");
        assert_eq!(project.version, 1);
        assert!(project.elements.is_empty());
        assert_eq!(project.viewport, Viewport::default());
    }

    #[test]
    fn test_clamp_zoom() {
        assert_eq!(clamp_zoom(0.01), MIN_ZOOM);
        assert_eq!(clamp_zoom(100.0), MAX_ZOOM);
        assert_eq!(clamp_zoom(1.5), 1.5);
    }

    #[test]
    fn test_viewport_patch_clamps_zoom() {
        let mut viewport = Viewport::default();
        ViewportPatch {
            zoom: Some(99.0),
            ..ViewportPatch::default()
        }
        .apply(&mut viewport);
        assert_eq!(viewport.zoom, MAX_ZOOM);
    }

    #[test]
    fn test_project_serialization_is_camel_case() {
        let mut project = CanvasProject::new("user1", "Test");
        project.elements.push(CanvasElement::text("hi", 0.0, 0.0));

        let json = serde_json::to_string(&project).unwrap();
        assert!(json.contains("\"ownerId\""));
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("\"thumbnailUrl\""));

        let parsed: CanvasProject = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.elements.len(), 1);
    }
}
