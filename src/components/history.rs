use std::collections::VecDeque;

use crate::canvas::{Layer, LayerStack};

/// Default undo depth.
pub const DEFAULT_HISTORY_SIZE: usize = 20;

// ============================================================================
// CANVAS SNAPSHOT — full-document state for undo/redo
// ============================================================================

/// Complete document state: every layer (metadata and pixels), the active
/// index and the canvas dimensions.
///
/// Pixel buffers are copy-on-write, so capturing is cheap; the snapshot
/// still behaves as a deep copy because any later write to the live stack
/// detaches it.
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasSnapshot {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
    pub active_layer_index: usize,
}

impl CanvasSnapshot {
    pub fn capture(stack: &LayerStack) -> Self {
        Self {
            width: stack.width(),
            height: stack.height(),
            layers: stack.layers().to_vec(),
            active_layer_index: stack.active_layer_index(),
        }
    }

    /// Replace the stack's state wholesale.  The composite is dropped and
    /// rebuilt at the restored dimensions on the next read.
    pub fn restore_into(&self, stack: &mut LayerStack) {
        stack.replace_state(
            self.layers.clone(),
            self.active_layer_index,
            self.width,
            self.height,
        );
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.pixels.memory_bytes() + l.name.len())
            .sum()
    }
}

/// A snapshot plus the label of the action it precedes.
#[derive(Clone, Debug)]
struct HistoryEntry {
    description: String,
    snapshot: CanvasSnapshot,
}

// ============================================================================
// HISTORY MANAGER — bounded undo stack, unbounded redo stack
// ============================================================================

/// Undo/redo of full-state snapshots.
///
/// `push` stores the state *before* a mutation.  Undo swaps the current
/// state onto the redo stack and restores the popped entry; redo is the
/// mirror image.  Pushing discards all redo entries.
#[derive(Debug)]
pub struct HistoryManager {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl HistoryManager {
    /// `max_history_size` is raised to at least 1.
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Record the state captured before an action.
    pub fn push(&mut self, description: impl Into<String>, snapshot: CanvasSnapshot) {
        self.redo_stack.clear();
        self.undo_stack.push_back(HistoryEntry {
            description: description.into(),
            snapshot,
        });
        self.prune();
        log::debug!(
            "history: push {:?} (undo depth {})",
            self.undo_stack.back().map(|e| e.description.as_str()).unwrap_or(""),
            self.undo_stack.len()
        );
    }

    /// Capture `stack` and push it.
    pub fn snapshot(&mut self, description: impl Into<String>, stack: &LayerStack) {
        self.push(description, CanvasSnapshot::capture(stack));
    }

    /// Returns the description of the undone action, or `None` when there
    /// was nothing to undo.
    pub fn undo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let entry = self.undo_stack.pop_back()?;
        self.redo_stack.push(HistoryEntry {
            description: entry.description.clone(),
            snapshot: CanvasSnapshot::capture(stack),
        });
        entry.snapshot.restore_into(stack);
        log::debug!("history: undo {:?}", entry.description);
        Some(entry.description)
    }

    pub fn redo(&mut self, stack: &mut LayerStack) -> Option<String> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push_back(HistoryEntry {
            description: entry.description.clone(),
            snapshot: CanvasSnapshot::capture(stack),
        });
        self.prune();
        entry.snapshot.restore_into(stack);
        log::debug!("history: redo {:?}", entry.description);
        Some(entry.description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.description.as_str())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.description.as_str())
    }

    /// Undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|e| e.description.clone()).collect()
    }

    /// Bytes held by both stacks.  Pixel storage shared with the live
    /// document (or another entry) is counted at pointer cost.
    pub fn memory_usage(&self) -> usize {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .map(|e| e.snapshot.memory_bytes())
            .sum()
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
