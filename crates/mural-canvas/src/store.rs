//! Canvas Store
//!
//! In-memory source of truth for one active project session. All element,
//! viewport, selection and tool state flows through here; observers
//! (UI, autosave) subscribe to a broadcast channel for change
//! notifications. Mutations are synchronous and never interleave.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::element::{CanvasElement, ElementPatch, Rect};
use crate::history::{HistoryEntry, HistoryStack};
use crate::project::{clamp_zoom, CanvasProject, Viewport, ViewportPatch};

/// Multiplicative zoom step for discrete zoom operations.
pub const ZOOM_STEP: f64 = 1.2;

/// Minimum window between history entries for continuous edits
/// (drag/resize), so the stack does not record one entry per pixel.
pub const CONTINUOUS_HISTORY_WINDOW: Duration = Duration::from_millis(500);

/// Marquee rectangles smaller than this on either axis are treated as a
/// plain click and clear the selection.
pub const MIN_MARQUEE_SIZE: f64 = 5.0;

/// Save lifecycle as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Unsaved local changes may exist; no save in flight
    Idle,
    /// A save request is in flight
    Saving,
    /// Local state matches the server
    Saved,
    /// Retries exhausted; edits remain in memory
    Error,
    /// Version conflict awaiting an explicit resolution
    Conflict,
}

/// Active editing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Select and transform elements
    #[default]
    Select,
    /// Pan the stage
    Pan,
    /// Place text
    Text,
    /// Freehand drawing
    Draw,
    /// Place shapes
    Shape,
}

/// Direction for z-order moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerDirection {
    /// Swap with the element above
    Up,
    /// Swap with the element below
    Down,
    /// Move to the front
    Top,
    /// Move to the back
    Bottom,
}

/// Direction for discrete zoom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Zoom in
    In,
    /// Zoom out
    Out,
}

/// Change notifications emitted to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// Elements were added, removed, reordered or patched
    ElementsChanged,
    /// Pan or zoom changed
    ViewportChanged,
    /// The selection set changed
    SelectionChanged,
    /// The save status changed
    SaveStatusChanged(SaveStatus),
    /// Undo or redo restored a snapshot
    HistoryRestored,
}

/// The client-side state a save request carries: everything the server
/// persists except identity and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    /// Project title
    pub title: String,
    /// Viewport state
    pub viewport: Viewport,
    /// Scene elements in paint order
    pub elements: Vec<CanvasElement>,
}

/// In-memory state machine for one project session.
pub struct CanvasStore {
    project_id: Uuid,
    title: String,
    elements: Vec<CanvasElement>,
    viewport: Viewport,
    version: i64,
    selection: HashSet<Uuid>,
    tool: ToolMode,
    save_status: SaveStatus,
    dirty: bool,
    clipboard: Option<CanvasElement>,
    history: HistoryStack,
    last_continuous_push: Option<Instant>,
    events: broadcast::Sender<StoreEvent>,
}

impl CanvasStore {
    /// Build a store from a project loaded off the server.
    #[must_use]
    pub fn from_project(project: CanvasProject) -> Self {
        let (events, _) = broadcast::channel(64);
        let history = HistoryStack::new(HistoryEntry {
            elements: project.elements.clone(),
            viewport: project.viewport,
        });
        Self {
            project_id: project.id,
            title: project.title,
            elements: project.elements,
            viewport: project.viewport,
            version: project.version,
            selection: HashSet::new(),
            tool: ToolMode::default(),
            save_status: SaveStatus::Saved,
            dirty: false,
            clipboard: None,
            history,
            last_continuous_push: None,
            events,
        }
    }

    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Project id this store edits.
    #[must_use]
    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    /// Project title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Elements in paint order.
    #[must_use]
    pub fn elements(&self) -> &[CanvasElement] {
        &self.elements
    }

    /// Look up one element.
    #[must_use]
    pub fn element(&self, id: Uuid) -> Option<&CanvasElement> {
        self.elements.iter().find(|e| e.id == id)
    }

    /// Current viewport.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Last known server version.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Current selection set.
    #[must_use]
    pub fn selection(&self) -> &HashSet<Uuid> {
        &self.selection
    }

    /// Active tool.
    #[must_use]
    pub fn tool(&self) -> ToolMode {
        self.tool
    }

    /// Current save status.
    #[must_use]
    pub fn save_status(&self) -> SaveStatus {
        self.save_status
    }

    /// Whether local edits have not been persisted.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether an undo step is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    /// Whether a redo step is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Snapshot of the persistable state, used by autosave.
    #[must_use]
    pub fn snapshot(&self) -> ProjectSnapshot {
        ProjectSnapshot {
            title: self.title.clone(),
            viewport: self.viewport,
            elements: self.elements.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Viewport
    // ------------------------------------------------------------------

    /// Apply a partial viewport update.
    pub fn set_viewport(&mut self, patch: ViewportPatch) {
        patch.apply(&mut self.viewport);
        self.mark_mutated();
        self.emit(StoreEvent::ViewportChanged);
    }

    /// Zoom in one step around the stage origin.
    pub fn zoom_in(&mut self) {
        self.set_zoom(self.viewport.zoom * ZOOM_STEP);
    }

    /// Zoom out one step around the stage origin.
    pub fn zoom_out(&mut self) {
        self.set_zoom(self.viewport.zoom / ZOOM_STEP);
    }

    /// Reset pan and zoom.
    pub fn reset_view(&mut self) {
        self.viewport = Viewport::default();
        self.mark_mutated();
        self.emit(StoreEvent::ViewportChanged);
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.viewport.zoom = clamp_zoom(zoom);
        self.mark_mutated();
        self.emit(StoreEvent::ViewportChanged);
    }

    /// Zoom one step keeping the world point under the pointer fixed.
    ///
    /// The world point is recovered from the current stage transform
    /// (`world = (pointer - stage) / zoom`) and the stage offset is
    /// recomputed so that it maps back to the same pointer position
    /// after the zoom (`stage = pointer - world * zoom`).
    pub fn zoom_to_point(&mut self, pointer_x: f64, pointer_y: f64, direction: ZoomDirection) {
        let old_zoom = self.viewport.zoom;
        let world_x = (pointer_x - self.viewport.x) / old_zoom;
        let world_y = (pointer_y - self.viewport.y) / old_zoom;

        let new_zoom = clamp_zoom(match direction {
            ZoomDirection::In => old_zoom * ZOOM_STEP,
            ZoomDirection::Out => old_zoom / ZOOM_STEP,
        });

        self.viewport.zoom = new_zoom;
        self.viewport.x = pointer_x - world_x * new_zoom;
        self.viewport.y = pointer_y - world_y * new_zoom;
        self.mark_mutated();
        self.emit(StoreEvent::ViewportChanged);
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    /// Add an element on top of the paint order and select it.
    pub fn add_element(&mut self, mut element: CanvasElement) -> Uuid {
        element.z_index = self.elements.len() as i32;
        let id = element.id;
        self.elements.push(element);
        self.selection.clear();
        self.selection.insert(id);
        self.push_history();
        self.mark_mutated();
        self.emit(StoreEvent::ElementsChanged);
        self.emit(StoreEvent::SelectionChanged);
        id
    }

    /// Patch an element's properties. Continuous edits (drag/resize) are
    /// expected here, so the history entry is debounced.
    pub fn update_element(&mut self, id: Uuid, patch: &ElementPatch) -> bool {
        let Some(element) = self.elements.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        patch.apply(element);
        self.push_history_debounced();
        self.mark_mutated();
        self.emit(StoreEvent::ElementsChanged);
        true
    }

    /// Delete an element, dropping it from the selection.
    pub fn delete_element(&mut self, id: Uuid) -> bool {
        let Some(pos) = self.elements.iter().position(|e| e.id == id) else {
            return false;
        };
        self.elements.remove(pos);
        self.selection.remove(&id);
        self.resync_z_indices();
        self.push_history();
        self.mark_mutated();
        self.emit(StoreEvent::ElementsChanged);
        true
    }

    /// Move an element within the paint order.
    pub fn move_layer(&mut self, id: Uuid, direction: LayerDirection) -> bool {
        let Some(pos) = self.elements.iter().position(|e| e.id == id) else {
            return false;
        };
        let last = self.elements.len() - 1;
        match direction {
            LayerDirection::Up if pos < last => self.elements.swap(pos, pos + 1),
            LayerDirection::Down if pos > 0 => self.elements.swap(pos, pos - 1),
            LayerDirection::Top if pos < last => {
                let element = self.elements.remove(pos);
                self.elements.push(element);
            }
            LayerDirection::Bottom if pos > 0 => {
                let element = self.elements.remove(pos);
                self.elements.insert(0, element);
            }
            _ => return false,
        }
        self.resync_z_indices();
        self.push_history();
        self.mark_mutated();
        self.emit(StoreEvent::ElementsChanged);
        true
    }

    /// Rename the project.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.mark_mutated();
    }

    /// Switch the active tool. Not a document mutation; does not dirty
    /// the store.
    pub fn set_tool(&mut self, tool: ToolMode) {
        self.tool = tool;
    }

    fn resync_z_indices(&mut self) {
        for (index, element) in self.elements.iter_mut().enumerate() {
            element.z_index = index as i32;
        }
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Replace the selection with a single element.
    pub fn select(&mut self, id: Uuid) {
        if self.element(id).is_none() {
            return;
        }
        self.selection.clear();
        self.selection.insert(id);
        self.emit(StoreEvent::SelectionChanged);
    }

    /// Toggle one element in or out of the selection.
    pub fn toggle_select(&mut self, id: Uuid) {
        if self.element(id).is_none() {
            return;
        }
        if !self.selection.remove(&id) {
            self.selection.insert(id);
        }
        self.emit(StoreEvent::SelectionChanged);
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        if !self.selection.is_empty() {
            self.selection.clear();
            self.emit(StoreEvent::SelectionChanged);
        }
    }

    /// Finish a marquee drag between two corners (any direction).
    ///
    /// Selects every element whose bounding box intersects the normalized
    /// rectangle. A rectangle under [`MIN_MARQUEE_SIZE`] on either axis is
    /// treated as a plain click: the selection is cleared.
    pub fn select_in_rect(&mut self, from: (f64, f64), to: (f64, f64)) {
        let rect = Rect::from_corners(from, to);
        if rect.width < MIN_MARQUEE_SIZE || rect.height < MIN_MARQUEE_SIZE {
            self.clear_selection();
            return;
        }
        self.selection = self
            .elements
            .iter()
            .filter(|e| e.bounds().intersects(&rect))
            .map(|e| e.id)
            .collect();
        self.emit(StoreEvent::SelectionChanged);
    }

    // ------------------------------------------------------------------
    // Clipboard
    // ------------------------------------------------------------------

    /// Copy one element into the single-slot clipboard.
    pub fn copy_element(&mut self, id: Uuid) -> bool {
        match self.element(id) {
            Some(element) => {
                self.clipboard = Some(element.clone());
                true
            }
            None => false,
        }
    }

    /// Paste the clipboard as a new element with a fresh id, offset from
    /// the original. Returns the new element id.
    pub fn paste_element(&mut self) -> Option<Uuid> {
        let copy = self.clipboard.as_ref()?.duplicate();
        Some(self.add_element(copy))
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Restore the previous snapshot. Returns `false` at the oldest
    /// retained state.
    pub fn undo(&mut self) -> bool {
        let Some(entry) = self.history.undo() else {
            return false;
        };
        let entry = entry.clone();
        self.restore(entry);
        true
    }

    /// Restore the next snapshot. Returns `false` when there is nothing
    /// to redo.
    pub fn redo(&mut self) -> bool {
        let Some(entry) = self.history.redo() else {
            return false;
        };
        let entry = entry.clone();
        self.restore(entry);
        true
    }

    fn restore(&mut self, entry: HistoryEntry) {
        self.elements = entry.elements;
        self.viewport = entry.viewport;
        let live: HashSet<Uuid> = self.elements.iter().map(|e| e.id).collect();
        self.selection.retain(|id| live.contains(id));
        self.mark_mutated();
        self.emit(StoreEvent::HistoryRestored);
        self.emit(StoreEvent::ElementsChanged);
    }

    fn push_history(&mut self) {
        self.history.push(HistoryEntry {
            elements: self.elements.clone(),
            viewport: self.viewport,
        });
        self.last_continuous_push = Some(Instant::now());
    }

    fn push_history_debounced(&mut self) {
        let due = match self.last_continuous_push {
            Some(at) => at.elapsed() >= CONTINUOUS_HISTORY_WINDOW,
            None => true,
        };
        if due {
            self.push_history();
        }
    }

    #[cfg(test)]
    pub(crate) fn rewind_continuous_window(&mut self) {
        self.last_continuous_push = None;
    }

    // ------------------------------------------------------------------
    // Save lifecycle (driven by the autosave controller)
    // ------------------------------------------------------------------

    /// Set the save status, emitting a change event.
    pub fn set_save_status(&mut self, status: SaveStatus) {
        if self.save_status != status {
            self.save_status = status;
            self.emit(StoreEvent::SaveStatusChanged(status));
        }
    }

    /// Adopt server-authoritative state after a successful save or a
    /// "keep server" conflict resolution. Clears the dirty flag.
    pub fn adopt_remote(&mut self, elements: Vec<CanvasElement>, viewport: Viewport, version: i64) {
        self.elements = elements;
        self.viewport = viewport;
        self.version = version;
        let live: HashSet<Uuid> = self.elements.iter().map(|e| e.id).collect();
        self.selection.retain(|id| live.contains(id));
        self.dirty = false;
        self.set_save_status(SaveStatus::Saved);
        self.emit(StoreEvent::ElementsChanged);
    }

    /// Adopt only the server's version number, keeping local state. Used
    /// by the "keep local" conflict resolution before resubmitting.
    pub fn adopt_remote_version(&mut self, version: i64) {
        self.version = version;
    }

    fn mark_mutated(&mut self) {
        self.dirty = true;
        // A conflict must be resolved explicitly; plain edits do not
        // clear it.
        if self.save_status != SaveStatus::Conflict {
            self.set_save_status(SaveStatus::Idle);
        }
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}
