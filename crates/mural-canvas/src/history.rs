//! Undo/Redo History
//!
//! Bounded, redo-truncating snapshot stack. Every logical edit pushes a
//! full snapshot of elements and viewport; undo/redo move a cursor over
//! the stack. History is client-local only and never leaves the process.

use crate::element::CanvasElement;
use crate::project::Viewport;

/// Default maximum number of retained snapshots.
pub const HISTORY_CAP: usize = 50;

/// One restorable snapshot of the scene.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Elements at the time of the edit
    pub elements: Vec<CanvasElement>,
    /// Viewport at the time of the edit
    pub viewport: Viewport,
}

/// Bounded undo/redo stack with a cursor at the current snapshot.
#[derive(Debug)]
pub struct HistoryStack {
    entries: Vec<HistoryEntry>,
    cursor: usize,
    cap: usize,
}

impl HistoryStack {
    /// Create a stack seeded with an initial snapshot.
    #[must_use]
    pub fn new(initial: HistoryEntry) -> Self {
        Self::with_cap(initial, HISTORY_CAP)
    }

    /// Create a stack with a custom capacity (minimum 2 so at least one
    /// undo step survives).
    #[must_use]
    pub fn with_cap(initial: HistoryEntry, cap: usize) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            cap: cap.max(2),
        }
    }

    /// Push a new snapshot. Discards the redo branch, then drops the
    /// oldest entry if over capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(entry);
        if self.entries.len() > self.cap {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step backward and return the snapshot to restore, or `None` at the
    /// oldest retained state.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(&self.entries[self.cursor])
    }

    /// Step forward and return the snapshot to restore, or `None` when
    /// there is nothing to redo.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        Some(&self.entries[self.cursor])
    }

    /// Whether an undo step is available.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Whether a redo step is available.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// Number of retained snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack holds only the initial snapshot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Reset to a single snapshot (project switch or explicit reset).
    pub fn reset(&mut self, initial: HistoryEntry) {
        self.entries.clear();
        self.entries.push(initial);
        self.cursor = 0;
    }
}
