use uuid::Uuid;

use crate::canvas::{BlendMode, CanvasAnchor, LayerStack, PixelBuffer};
use crate::components::history::HistoryManager;
use crate::components::layers::LayerInfo;
use crate::components::tools::{Clock, StrokePoint, ToolEngine, ToolMode, ToolSettings};
use crate::error::CanvasError;
use crate::ops::{adjustments, canvas_ops};
use crate::settings::EngineSettings;

/// What changed after a command; delivered to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Change {
    BrushSize,
    GrayValue,
    ToolMode,
    TempStart,
    TempEnd,
    TempPauseOnIdle,
    FillTolerance,
    FillSampleAllLayers,
    FillContiguous,
    /// Layer list or any layer's metadata.
    Layers,
    ActiveLayer,
    CanvasSize,
    UndoAvailable,
    RedoAvailable,
    /// Pixels changed; the composite must be redrawn.
    Repaint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(Change) + Send>;

/// Observable state compared before and after each command.
struct Marks {
    layers: Vec<LayerInfo>,
    active: usize,
    size: (u32, u32),
    can_undo: bool,
    can_redo: bool,
    generation: u64,
}

/// Single open document: the layer stack, its history and the tool engine,
/// behind the command interface a UI drives.
///
/// Every mutating call returns whether anything changed and notifies the
/// registered observers of each affected property.  Expected misuse (bad
/// indices, unknown mode strings) is a silent no-op; only allocation
/// failure is reported as an error.
pub struct Project {
    pub id: Uuid,
    /// Display name.
    pub name: String,
    stack: LayerStack,
    history: HistoryManager,
    tools: ToolEngine,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: u64,
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stack", &self.stack)
            .field("history", &self.history)
            .field("tools", &self.tools)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Project {
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        Self::build(width, height, HistoryManager::default(), ToolEngine::default())
    }

    pub fn with_settings(settings: &EngineSettings) -> Result<Self, CanvasError> {
        Self::build(
            settings.default_width,
            settings.default_height,
            HistoryManager::new(settings.undo_limit),
            ToolEngine::new(settings.tools.clone()),
        )
    }

    fn build(width: u32, height: u32, history: HistoryManager, tools: ToolEngine) -> Result<Self, CanvasError> {
        let stack = LayerStack::new(width, height)?;
        log::info!("new project {}×{}", width, height);
        Ok(Self {
            id: Uuid::new_v4(),
            name: "Untitled".to_string(),
            stack,
            history,
            tools,
            observers: Vec::new(),
            next_observer: 0,
        })
    }

    /// Replace the time source used by the temporal tool.
    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.tools.set_clock(clock);
    }

    // ========================================================================
    // Observers
    // ========================================================================

    pub fn subscribe(&mut self, observer: impl FnMut(Change) + Send + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    fn emit(&mut self, change: Change) {
        for (_, observer) in self.observers.iter_mut() {
            observer(change);
        }
    }

    fn marks(&self) -> Marks {
        Marks {
            layers: LayerInfo::collect(&self.stack),
            active: self.stack.active_layer_index(),
            size: (self.stack.width(), self.stack.height()),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            generation: self.stack.dirty_generation(),
        }
    }

    /// Run `op` and notify observers of every observable difference.
    fn tracked<R>(&mut self, op: impl FnOnce(&mut Self) -> R) -> R {
        let before = self.marks();
        let result = op(self);
        let after = self.marks();

        if before.layers != after.layers {
            self.emit(Change::Layers);
        }
        if before.active != after.active {
            self.emit(Change::ActiveLayer);
        }
        if before.size != after.size {
            self.emit(Change::CanvasSize);
        }
        if before.can_undo != after.can_undo {
            self.emit(Change::UndoAvailable);
        }
        if before.can_redo != after.can_redo {
            self.emit(Change::RedoAvailable);
        }
        if before.generation != after.generation {
            self.emit(Change::Repaint);
        }
        result
    }

    fn setting(&mut self, change: Change, set: impl FnOnce(&mut ToolSettings) -> bool) -> bool {
        let changed = set(&mut self.tools.settings);
        if changed {
            self.emit(change);
        }
        changed
    }

    // ========================================================================
    // Pointer events (canvas pixel coordinates)
    // ========================================================================

    pub fn press(&mut self, x: f32, y: f32) -> bool {
        self.tracked(|p| p.tools.press(&mut p.stack, &mut p.history, x, y))
    }

    pub fn move_to(&mut self, x: f32, y: f32) -> bool {
        self.tracked(|p| p.tools.move_to(&mut p.stack, x, y))
    }

    pub fn release(&mut self, x: f32, y: f32) -> bool {
        self.tracked(|p| p.tools.release(&mut p.stack, x, y))
    }

    /// `press` with an explicit timestamp in milliseconds.
    pub fn press_at(&mut self, x: f32, y: f32, time_ms: f64) -> bool {
        self.tracked(|p| p.tools.press_at(&mut p.stack, &mut p.history, x, y, Some(time_ms)))
    }

    pub fn move_at(&mut self, x: f32, y: f32, time_ms: f64) -> bool {
        self.tracked(|p| p.tools.move_at(&mut p.stack, x, y, Some(time_ms)))
    }

    pub fn release_at(&mut self, x: f32, y: f32, time_ms: f64) -> bool {
        self.tracked(|p| p.tools.release_at(&mut p.stack, x, y, Some(time_ms)))
    }

    /// The temporal path accumulated so far, for preview drawing.
    pub fn temporal_path(&self) -> &[StrokePoint] {
        self.tools.temporal_path()
    }

    // ========================================================================
    // Tool configuration
    // ========================================================================

    pub fn tool_settings(&self) -> &ToolSettings {
        &self.tools.settings
    }

    pub fn brush_size(&self) -> u32 { self.tools.settings.brush_size }
    pub fn gray_value(&self) -> u8 { self.tools.settings.gray_value }
    pub fn tool_mode(&self) -> ToolMode { self.tools.settings.mode }
    pub fn temp_start(&self) -> f32 { self.tools.settings.temp_start }
    pub fn temp_end(&self) -> f32 { self.tools.settings.temp_end }
    pub fn temp_pause_on_idle(&self) -> bool { self.tools.settings.temp_pause_on_idle }
    pub fn fill_tolerance(&self) -> u8 { self.tools.settings.fill_tolerance }
    pub fn fill_sample_all_layers(&self) -> bool { self.tools.settings.fill_sample_all_layers }
    pub fn fill_contiguous(&self) -> bool { self.tools.settings.fill_contiguous }

    pub fn set_brush_size(&mut self, size: i64) -> bool {
        self.setting(Change::BrushSize, |s| s.set_brush_size(size))
    }

    pub fn set_gray_value(&mut self, value: i64) -> bool {
        self.setting(Change::GrayValue, |s| s.set_gray_value(value))
    }

    pub fn set_tool_mode(&mut self, mode: ToolMode) -> bool {
        self.setting(Change::ToolMode, |s| s.set_mode(mode))
    }

    /// Unknown names select the brush.
    pub fn set_tool_mode_str(&mut self, mode: &str) -> bool {
        self.set_tool_mode(ToolMode::parse(mode))
    }

    pub fn set_temp_start(&mut self, value: f32) -> bool {
        self.setting(Change::TempStart, |s| s.set_temp_start(value))
    }

    pub fn set_temp_end(&mut self, value: f32) -> bool {
        self.setting(Change::TempEnd, |s| s.set_temp_end(value))
    }

    pub fn set_temp_pause_on_idle(&mut self, value: bool) -> bool {
        self.setting(Change::TempPauseOnIdle, |s| s.set_temp_pause_on_idle(value))
    }

    pub fn set_fill_tolerance(&mut self, percent: i64) -> bool {
        self.setting(Change::FillTolerance, |s| s.set_fill_tolerance(percent))
    }

    pub fn set_fill_sample_all_layers(&mut self, value: bool) -> bool {
        self.setting(Change::FillSampleAllLayers, |s| s.set_fill_sample_all_layers(value))
    }

    pub fn set_fill_contiguous(&mut self, value: bool) -> bool {
        self.setting(Change::FillContiguous, |s| s.set_fill_contiguous(value))
    }

    // ========================================================================
    // Layer commands
    // ========================================================================

    pub fn add_layer(&mut self) -> Result<bool, CanvasError> {
        self.tracked(|p| canvas_ops::add_layer(&mut p.stack, &mut p.history))
    }

    pub fn duplicate_layer(&mut self, index: usize) -> bool {
        self.tracked(|p| canvas_ops::duplicate_layer(&mut p.stack, &mut p.history, index))
    }

    pub fn duplicate_active_layer(&mut self) -> bool {
        self.duplicate_layer(self.stack.active_layer_index())
    }

    pub fn delete_layer(&mut self, index: usize) -> bool {
        self.tracked(|p| canvas_ops::delete_layer(&mut p.stack, &mut p.history, index))
    }

    pub fn delete_active_layer(&mut self) -> bool {
        self.delete_layer(self.stack.active_layer_index())
    }

    /// Selection only; not recorded in history.
    pub fn set_active_layer(&mut self, index: usize) -> bool {
        self.tracked(|p| p.stack.set_active_layer(index))
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: f32) -> bool {
        self.tracked(|p| canvas_ops::set_layer_opacity(&mut p.stack, &mut p.history, index, opacity))
    }

    pub fn set_layer_visible(&mut self, index: usize, visible: bool) -> bool {
        self.tracked(|p| canvas_ops::set_layer_visible(&mut p.stack, &mut p.history, index, visible))
    }

    pub fn set_layer_blend_mode(&mut self, index: usize, mode: BlendMode) -> bool {
        self.tracked(|p| canvas_ops::set_layer_blend_mode(&mut p.stack, &mut p.history, index, mode))
    }

    /// Unknown names select `Normal`.
    pub fn set_layer_blend_mode_str(&mut self, index: usize, mode: &str) -> bool {
        self.set_layer_blend_mode(index, BlendMode::parse(mode))
    }

    pub fn rename_layer(&mut self, index: usize, name: &str) -> bool {
        self.tracked(|p| canvas_ops::rename_layer(&mut p.stack, &mut p.history, index, name))
    }

    pub fn move_layer(&mut self, from: usize, to: usize) -> bool {
        self.tracked(|p| canvas_ops::move_layer(&mut p.stack, &mut p.history, from, to))
    }

    pub fn move_layer_up(&mut self, index: usize) -> bool {
        self.move_layer(index, index.saturating_add(1))
    }

    pub fn move_layer_down(&mut self, index: usize) -> bool {
        self.move_layer(index, index.saturating_sub(1))
    }

    pub fn resize_canvas(&mut self, width: u32, height: u32, anchor: CanvasAnchor) -> Result<bool, CanvasError> {
        self.tracked(|p| canvas_ops::resize_canvas(&mut p.stack, &mut p.history, width, height, anchor))
    }

    /// Unknown anchor names select `center`.
    pub fn resize_canvas_str(&mut self, width: u32, height: u32, anchor: &str) -> Result<bool, CanvasError> {
        self.resize_canvas(width, height, CanvasAnchor::parse(anchor))
    }

    /// Levels remap of one layer; a no-op unless `max > min`.
    pub fn apply_levels(&mut self, index: usize, min: i64, max: i64, center: i64) -> bool {
        self.tracked(|p| canvas_ops::apply_levels(&mut p.stack, &mut p.history, index, min, max, center))
    }

    /// Any stroke in progress is abandoned first.
    pub fn undo(&mut self) -> bool {
        self.tools.cancel();
        self.tracked(|p| p.history.undo(&mut p.stack).is_some())
    }

    pub fn redo(&mut self) -> bool {
        self.tools.cancel();
        self.tracked(|p| p.history.redo(&mut p.stack).is_some())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn layers(&self) -> Vec<LayerInfo> {
        LayerInfo::collect(&self.stack)
    }

    pub fn layer_count(&self) -> usize { self.stack.len() }
    pub fn active_layer_index(&self) -> usize { self.stack.active_layer_index() }
    pub fn canvas_width(&self) -> u32 { self.stack.width() }
    pub fn canvas_height(&self) -> u32 { self.stack.height() }
    pub fn can_undo(&self) -> bool { self.history.can_undo() }
    pub fn can_redo(&self) -> bool { self.history.can_redo() }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    /// Flattened visible layers, recomputed only if something changed.
    pub fn composite(&mut self) -> Result<&PixelBuffer, CanvasError> {
        self.stack.composite()
    }

    /// Intensity histogram of layer `index` (all zero for a bad index).
    pub fn histogram(&self, index: usize) -> [u32; 256] {
        adjustments::compute_histogram(&self.stack, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder(project: &mut Project) -> Arc<Mutex<Vec<Change>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        project.subscribe(move |c| sink.lock().unwrap().push(c));
        log
    }

    #[test]
    fn setters_notify_only_on_change() {
        let mut project = Project::new(4, 4).unwrap();
        let log = recorder(&mut project);

        assert!(!project.set_brush_size(20));
        assert!(project.set_brush_size(5));
        assert!(!project.set_tool_mode_str("bogus"));
        assert!(project.set_tool_mode_str("fill"));
        assert_eq!(project.tool_mode(), ToolMode::Fill);

        assert_eq!(*log.lock().unwrap(), vec![Change::BrushSize, Change::ToolMode]);
    }

    #[test]
    fn layer_commands_emit_layer_and_undo_changes() {
        let mut project = Project::new(4, 4).unwrap();
        let log = recorder(&mut project);

        assert!(project.add_layer().unwrap());
        let changes = log.lock().unwrap().clone();
        assert!(changes.contains(&Change::Layers));
        assert!(changes.contains(&Change::ActiveLayer));
        assert!(changes.contains(&Change::UndoAvailable));
        assert!(!changes.contains(&Change::CanvasSize));

        log.lock().unwrap().clear();
        assert!(project.set_active_layer(0));
        let changes = log.lock().unwrap().clone();
        assert!(changes.contains(&Change::ActiveLayer));
        assert!(!changes.contains(&Change::UndoAvailable));
        assert_eq!(project.history().undo_count(), 1);
    }

    #[test]
    fn resize_reports_canvas_size_and_undo_restores_it() {
        let mut project = Project::new(4, 4).unwrap();
        let log = recorder(&mut project);
        assert!(project.resize_canvas_str(8, 2, "nowhere").unwrap());
        assert!(log.lock().unwrap().contains(&Change::CanvasSize));
        assert_eq!((project.canvas_width(), project.canvas_height()), (8, 2));

        log.lock().unwrap().clear();
        assert!(project.undo());
        let changes = log.lock().unwrap().clone();
        assert!(changes.contains(&Change::CanvasSize));
        assert!(changes.contains(&Change::RedoAvailable));
        assert_eq!((project.canvas_width(), project.canvas_height()), (4, 4));
    }

    #[test]
    fn unsubscribed_observers_are_silent() {
        let mut project = Project::new(2, 2).unwrap();
        let log = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&log);
        let id = project.subscribe(move |_| *sink.lock().unwrap() += 1);
        project.set_gray_value(3);
        assert!(project.unsubscribe(id));
        assert!(!project.unsubscribe(id));
        project.set_gray_value(4);
        assert_eq!(*log.lock().unwrap(), 1);
    }

    #[test]
    fn project_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Project>();
    }
}
