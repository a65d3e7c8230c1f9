//! Canvas Element Types
//!
//! This module defines the scene graph elements for a canvas project.
//! An element carries a shared transform (position, size, scale, rotation,
//! opacity, z-order) plus a kind-specific payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Offset applied when pasting a cloned element so it does not sit
/// exactly on top of the original.
pub const PASTE_OFFSET: f64 = 24.0;

/// An axis-aligned rectangle used for bounds and hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width (non-negative)
    pub width: f64,
    /// Height (non-negative)
    pub height: f64,
}

impl Rect {
    /// Create a rectangle from origin and size.
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a normalized rectangle from any two corners, regardless of
    /// drag direction.
    #[must_use]
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        let x = a.0.min(b.0);
        let y = a.1.min(b.1);
        Self {
            x,
            y,
            width: (a.0 - b.0).abs(),
            height: (a.1 - b.1).abs(),
        }
    }

    /// Axis-aligned intersection test. Touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }
}

/// A single element in the canvas scene graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasElement {
    /// Unique within a project
    pub id: Uuid,

    /// X position in world coordinates
    pub x: f64,

    /// Y position in world coordinates
    pub y: f64,

    /// Intrinsic width
    pub width: f64,

    /// Intrinsic height
    pub height: f64,

    /// Rotation in degrees
    #[serde(default)]
    pub rotation: f64,

    /// Horizontal scale factor
    #[serde(default = "default_scale")]
    pub scale_x: f64,

    /// Vertical scale factor
    #[serde(default = "default_scale")]
    pub scale_y: f64,

    /// Opacity in `[0, 1]`
    #[serde(default = "default_opacity")]
    pub opacity: f64,

    /// Paint order; higher paints later. Values need not be contiguous.
    #[serde(default)]
    pub z_index: i32,

    /// Kind-specific payload
    #[serde(flatten)]
    pub kind: ElementKind,
}

fn default_scale() -> f64 {
    1.0
}

fn default_opacity() -> f64 {
    1.0
}

impl CanvasElement {
    /// Create a new element of the given kind at a position.
    #[must_use]
    pub fn new(kind: ElementKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            x,
            y,
            width,
            height,
            rotation: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            opacity: 1.0,
            z_index: 0,
            kind,
        }
    }

    /// Create a text element.
    #[must_use]
    pub fn text(content: impl Into<String>, x: f64, y: f64) -> Self {
        Self::new(
            ElementKind::Text {
                content: content.into(),
                font_family: "sans-serif".to_string(),
                font_size: 16.0,
                color: "#000000".to_string(),
            },
            x,
            y,
            200.0,
            40.0,
        )
    }

    /// Create an image element from a source.
    #[must_use]
    pub fn image(source: ImageSource, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(ElementKind::Image { source }, x, y, width, height)
    }

    /// Create a sticker element.
    #[must_use]
    pub fn sticker(asset: impl Into<String>, x: f64, y: f64) -> Self {
        Self::new(
            ElementKind::Sticker {
                asset: asset.into(),
            },
            x,
            y,
            64.0,
            64.0,
        )
    }

    /// Create a shape element.
    #[must_use]
    pub fn shape(shape: ShapeKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(
            ElementKind::Shape {
                shape,
                fill: "#ffffff".to_string(),
                stroke: "#000000".to_string(),
                stroke_width: 2.0,
            },
            x,
            y,
            width,
            height,
        )
    }

    /// Create a freehand drawing element from a point list.
    #[must_use]
    pub fn drawing(points: Vec<(f64, f64)>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(
            ElementKind::Drawing {
                points,
                stroke: "#000000".to_string(),
                stroke_width: 3.0,
            },
            x,
            y,
            width,
            height,
        )
    }

    /// Get the element kind as a string.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ElementKind::Text { .. } => "text",
            ElementKind::Image { .. } => "image",
            ElementKind::Sticker { .. } => "sticker",
            ElementKind::Shape { .. } => "shape",
            ElementKind::Drawing { .. } => "drawing",
        }
    }

    /// Axis-aligned bounding box in world coordinates. Scale is applied to
    /// the intrinsic size; rotation is ignored for hit testing.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x,
            self.y,
            self.width * self.scale_x,
            self.height * self.scale_y,
        )
    }

    /// Clone this element with a fresh id, offset so the copy does not
    /// overlap the original exactly.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy.x += PASTE_OFFSET;
        copy.y += PASTE_OFFSET;
        copy
    }
}

/// Kind-specific element payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    /// Text with font styling
    Text {
        /// Text content
        content: String,
        /// Font family name
        #[serde(rename = "fontFamily")]
        font_family: String,
        /// Font size in points
        #[serde(rename = "fontSize")]
        font_size: f64,
        /// CSS color
        color: String,
    },

    /// Image referenced by URL or carried inline until materialized
    Image {
        /// Image source
        source: ImageSource,
    },

    /// Sticker from the built-in asset catalog
    Sticker {
        /// Asset identifier
        asset: String,
    },

    /// Geometric shape
    Shape {
        /// Shape geometry
        shape: ShapeKind,
        /// Fill color
        fill: String,
        /// Stroke color
        stroke: String,
        /// Stroke width in pixels
        #[serde(rename = "strokeWidth")]
        stroke_width: f64,
    },

    /// Freehand drawing
    Drawing {
        /// Point list relative to the element origin
        points: Vec<(f64, f64)>,
        /// Stroke color
        stroke: String,
        /// Stroke width in pixels
        #[serde(rename = "strokeWidth")]
        stroke_width: f64,
    },
}

/// Where an image element's pixels live.
///
/// Inline sources exist only transiently on the client; the storage layer
/// rewrites them to durable URLs on save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Durable URL in blob storage (or any external URL)
    Url {
        /// Public URL
        url: String,
    },

    /// Base64-encoded payload not yet uploaded
    Inline {
        /// Base64 data, optionally as a `data:` URL
        data: String,
        /// MIME type, e.g. `image/png`
        #[serde(rename = "contentType")]
        content_type: String,
    },
}

impl ImageSource {
    /// Create a URL source.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    /// Create an inline source.
    #[must_use]
    pub fn inline(data: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self::Inline {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Whether this source still needs to be materialized.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline { .. })
    }
}

/// Supported shape geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Axis-aligned rectangle
    Rectangle,
    /// Ellipse inscribed in the bounds
    Ellipse,
    /// Line across the bounds diagonal
    Line,
}

/// Partial update applied to an element's shared transform fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementPatch {
    /// New x position
    pub x: Option<f64>,
    /// New y position
    pub y: Option<f64>,
    /// New width
    pub width: Option<f64>,
    /// New height
    pub height: Option<f64>,
    /// New rotation
    pub rotation: Option<f64>,
    /// New horizontal scale
    pub scale_x: Option<f64>,
    /// New vertical scale
    pub scale_y: Option<f64>,
    /// New opacity
    pub opacity: Option<f64>,
    /// Replacement payload
    pub kind: Option<ElementKind>,
}

impl ElementPatch {
    /// Patch that moves an element.
    #[must_use]
    pub fn move_to(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Self::default()
        }
    }

    /// Patch that resizes an element.
    #[must_use]
    pub fn resize(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Self::default()
        }
    }

    /// Apply this patch to an element.
    pub fn apply(&self, element: &mut CanvasElement) {
        if let Some(x) = self.x {
            element.x = x;
        }
        if let Some(y) = self.y {
            element.y = y;
        }
        if let Some(width) = self.width {
            element.width = width;
        }
        if let Some(height) = self.height {
            element.height = height;
        }
        if let Some(rotation) = self.rotation {
            element.rotation = rotation;
        }
        if let Some(scale_x) = self.scale_x {
            element.scale_x = scale_x;
        }
        if let Some(scale_y) = self.scale_y {
            element.scale_y = scale_y;
        }
        if let Some(opacity) = self.opacity {
            element.opacity = opacity;
        }
        if let Some(kind) = &self.kind {
            element.kind = kind.clone();
        }
    }
}
