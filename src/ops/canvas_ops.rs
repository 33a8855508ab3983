// ============================================================================
// CANVAS-LEVEL OPERATIONS — history-wrapped layer commands
// ============================================================================
//
// Each command captures a snapshot before mutating and pushes it only if the
// stack reports a change, so rejected or no-op calls never leave an undo
// entry behind.
// ============================================================================

use crate::canvas::{BlendMode, CanvasAnchor, LayerStack};
use crate::components::history::{CanvasSnapshot, HistoryManager};
use crate::error::CanvasError;
use crate::ops::adjustments::{self, Levels};

/// Run `op` against `stack`, recording `description` when it returns `true`.
pub fn do_snapshot_op<F>(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    description: &str,
    op: F,
) -> bool
where
    F: FnOnce(&mut LayerStack) -> bool,
{
    let before = CanvasSnapshot::capture(stack);
    let changed = op(stack);
    if changed {
        history.push(description, before);
    }
    changed
}

/// Fallible variant for operations that allocate.  On error nothing is
/// recorded and the stack is left as `op` left it.
pub fn try_snapshot_op<F>(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    description: &str,
    op: F,
) -> Result<bool, CanvasError>
where
    F: FnOnce(&mut LayerStack) -> Result<bool, CanvasError>,
{
    let before = CanvasSnapshot::capture(stack);
    let changed = op(stack)?;
    if changed {
        history.push(description, before);
    }
    Ok(changed)
}

pub fn add_layer(stack: &mut LayerStack, history: &mut HistoryManager) -> Result<bool, CanvasError> {
    try_snapshot_op(stack, history, "Add Layer", |s| s.add_layer().map(|_| true))
}

pub fn duplicate_layer(stack: &mut LayerStack, history: &mut HistoryManager, index: usize) -> bool {
    do_snapshot_op(stack, history, "Duplicate Layer", |s| s.duplicate_layer(index))
}

/// Never removes the last remaining layer.
pub fn delete_layer(stack: &mut LayerStack, history: &mut HistoryManager, index: usize) -> bool {
    do_snapshot_op(stack, history, "Delete Layer", |s| s.delete_layer(index))
}

pub fn set_layer_opacity(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    index: usize,
    opacity: f32,
) -> bool {
    do_snapshot_op(stack, history, "Layer Opacity", |s| s.set_opacity(index, opacity))
}

pub fn set_layer_visible(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    index: usize,
    visible: bool,
) -> bool {
    let label = if visible { "Show Layer" } else { "Hide Layer" };
    do_snapshot_op(stack, history, label, |s| s.set_visible(index, visible))
}

pub fn set_layer_blend_mode(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    index: usize,
    mode: BlendMode,
) -> bool {
    do_snapshot_op(stack, history, "Layer Blend Mode", |s| s.set_blend_mode(index, mode))
}

pub fn rename_layer(stack: &mut LayerStack, history: &mut HistoryManager, index: usize, name: &str) -> bool {
    do_snapshot_op(stack, history, "Rename Layer", |s| s.rename_layer(index, name))
}

pub fn move_layer(stack: &mut LayerStack, history: &mut HistoryManager, from: usize, to: usize) -> bool {
    do_snapshot_op(stack, history, "Move Layer", |s| s.move_layer(from, to))
}

pub fn resize_canvas(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    width: u32,
    height: u32,
    anchor: CanvasAnchor,
) -> Result<bool, CanvasError> {
    try_snapshot_op(stack, history, "Resize Canvas", |s| s.resize_canvas(width, height, anchor))
}

/// Intensity remap of one layer.  A degenerate range or an unknown index
/// is a no-op.
pub fn apply_levels(
    stack: &mut LayerStack,
    history: &mut HistoryManager,
    index: usize,
    min: i64,
    max: i64,
    center: i64,
) -> bool {
    let Some(levels) = Levels::new(min, max, center) else {
        return false;
    };
    if index >= stack.len() {
        return false;
    }
    do_snapshot_op(stack, history, "Levels", |s| adjustments::apply_levels(s, index, levels) > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::gray;

    #[test]
    fn rejected_commands_leave_no_history() {
        let mut stack = LayerStack::new(4, 4).unwrap();
        let mut history = HistoryManager::default();
        assert!(!delete_layer(&mut stack, &mut history, 0));
        assert!(!set_layer_opacity(&mut stack, &mut history, 0, 1.0));
        assert!(!set_layer_visible(&mut stack, &mut history, 3, false));
        assert!(!move_layer(&mut stack, &mut history, 0, 0));
        assert!(!resize_canvas(&mut stack, &mut history, 4, 4, CanvasAnchor::Center).unwrap());
        assert!(!apply_levels(&mut stack, &mut history, 0, 10, 10, 128));
        assert!(!history.can_undo());
    }

    #[test]
    fn each_change_is_one_undo_step() {
        let mut stack = LayerStack::new(4, 4).unwrap();
        let mut history = HistoryManager::default();
        assert!(add_layer(&mut stack, &mut history).unwrap());
        assert!(set_layer_blend_mode(&mut stack, &mut history, 1, BlendMode::Add));
        assert!(rename_layer(&mut stack, &mut history, 1, "Glow"));
        assert_eq!(history.undo_count(), 3);
        assert_eq!(history.undo_description(), Some("Rename Layer"));

        history.undo(&mut stack);
        history.undo(&mut stack);
        assert_eq!(stack.layer(1).unwrap().blend_mode, BlendMode::Normal);
        history.undo(&mut stack);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn levels_is_undoable() {
        let mut stack = LayerStack::new(2, 2).unwrap();
        let mut history = HistoryManager::default();
        stack.active_pixels_mut().fill(gray(40));
        assert!(apply_levels(&mut stack, &mut history, 0, 0, 80, 128));
        assert_ne!(stack.layer(0).unwrap().pixels.get(0, 0), Some(gray(40)));
        history.undo(&mut stack);
        assert_eq!(stack.layer(0).unwrap().pixels.get(0, 0), Some(gray(40)));
    }
}
