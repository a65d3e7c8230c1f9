//! Mural Canvas - Client-Side Editing Core
//!
//! This crate provides the client-side core of the Mural canvas:
//! - Element: Scene graph element types and bounding boxes
//! - Project: Project, viewport, and summary types
//! - History: Bounded undo/redo snapshot stack
//! - Store: In-memory state machine for one editing session
//! - AutoSave: Debounced, retrying save loop with conflict resolution
//! - Transport: The seam carrying save requests to the storage layer
//!
//! ## Features
//!
//! - Tagged element union (text, image, sticker, shape, drawing)
//! - Marquee, single and multi selection with AABB hit testing
//! - Cursor-anchored zoom with bounded zoom range
//! - Coalescing autosave with optimistic-concurrency conflict prompts
//! - Client-local undo/redo, capped and redo-truncating
//!
//! ## Usage
//!
//! ```ignore
//! use mural_canvas::{
//!     AutoSaveConfig, AutoSaveController, CanvasElement, CanvasStore,
//! };
//! use std::sync::Arc;
//! use tokio::sync::RwLock;
//!
//! let store = Arc::new(RwLock::new(CanvasStore::from_project(project)));
//! let autosave = AutoSaveController::new(store.clone(), transport, AutoSaveConfig::default());
//!
//! store.write().await.add_element(CanvasElement::text("Hello", 100.0, 100.0));
//! autosave.on_mutation();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod autosave;
pub mod element;
pub mod history;
pub mod project;
pub mod store;
pub mod transport;

// Re-export main types
pub use autosave::{AutoSaveConfig, AutoSaveController, AutoSaveError};
pub use element::{
    CanvasElement, ElementKind, ElementPatch, ImageSource, Rect, ShapeKind, PASTE_OFFSET,
};
pub use history::{HistoryEntry, HistoryStack, HISTORY_CAP};
pub use project::{
    clamp_zoom, CanvasProject, ProjectSummary, Viewport, ViewportPatch, MAX_ZOOM, MIN_ZOOM,
};
pub use store::{
    CanvasStore, LayerDirection, ProjectSnapshot, SaveStatus, StoreEvent, ToolMode, ZoomDirection,
};
pub use transport::{SaveOutcome, SaveRequest, SaveTransport, TransportError};
