use std::time::Instant;

use image::Rgba;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{gray, unpremultiply, LayerStack, PixelBuffer};
use crate::components::history::HistoryManager;
use crate::ops::stroke::{draw_segment, stamp_disc, Pen};

/// Path points closer than this (Manhattan distance) to the previous
/// recorded point are dropped while a temporal stroke accumulates.
pub const TEMPORAL_MIN_STEP: f32 = 1.5;

/// Totals at or below this are treated as a zero-length path.
const DEGENERATE_TOTAL: f64 = 1e-6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolMode {
    #[default]
    Brush,
    Eraser,
    Temporal,
    Fill,
    LinearGradient,
    RadialGradient,
    Picker,
}

impl ToolMode {
    pub fn all() -> &'static [ToolMode] {
        &[
            ToolMode::Brush,
            ToolMode::Eraser,
            ToolMode::Temporal,
            ToolMode::Fill,
            ToolMode::LinearGradient,
            ToolMode::RadialGradient,
            ToolMode::Picker,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolMode::Brush => "brush",
            ToolMode::Eraser => "eraser",
            ToolMode::Temporal => "temporal",
            ToolMode::Fill => "fill",
            ToolMode::LinearGradient => "linearGradient",
            ToolMode::RadialGradient => "radialGradient",
            ToolMode::Picker => "picker",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ToolMode::Brush => "Brush",
            ToolMode::Eraser => "Eraser",
            ToolMode::Temporal => "Temporal",
            ToolMode::Fill => "Fill",
            ToolMode::LinearGradient => "Linear Gradient",
            ToolMode::RadialGradient => "Radial Gradient",
            ToolMode::Picker => "Picker",
        }
    }

    /// Parse an identifier; unknown strings fall back to `Brush`.
    pub fn parse(s: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or_default()
    }

    /// Modes that are modelled but have no pixel behaviour yet.
    pub fn is_inert(&self) -> bool {
        matches!(
            self,
            ToolMode::LinearGradient | ToolMode::RadialGradient | ToolMode::Picker
        )
    }
}

// ============================================================================
// TOOL SETTINGS
// ============================================================================

/// User-facing tool configuration.  Every setter clamps its input and
/// returns `true` only when the stored value changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Pen diameter in pixels, at least 1.
    pub brush_size: u32,
    pub gray_value: u8,
    pub mode: ToolMode,
    /// Temporal gradient endpoints as fractions of full intensity.
    pub temp_start: f32,
    pub temp_end: f32,
    /// When set, the temporal gradient follows arc length instead of time.
    pub temp_pause_on_idle: bool,
    /// Percent of the full intensity range, 0–100.
    pub fill_tolerance: u8,
    pub fill_sample_all_layers: bool,
    pub fill_contiguous: bool,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            brush_size: 20,
            gray_value: 255,
            mode: ToolMode::Brush,
            temp_start: 0.0,
            temp_end: 1.0,
            temp_pause_on_idle: true,
            fill_tolerance: 0,
            fill_sample_all_layers: false,
            fill_contiguous: true,
        }
    }
}

fn set_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn set_unit_if_changed(slot: &mut f32, value: f32) -> bool {
    if value.is_nan() {
        return false;
    }
    let value = value.clamp(0.0, 1.0);
    if (*slot - value).abs() <= 1e-6 {
        return false;
    }
    *slot = value;
    true
}

impl ToolSettings {
    pub fn set_brush_size(&mut self, size: i64) -> bool {
        let size = size.clamp(1, u32::MAX as i64) as u32;
        set_if_changed(&mut self.brush_size, size)
    }

    pub fn set_gray_value(&mut self, value: i64) -> bool {
        set_if_changed(&mut self.gray_value, value.clamp(0, 255) as u8)
    }

    pub fn set_mode(&mut self, mode: ToolMode) -> bool {
        set_if_changed(&mut self.mode, mode)
    }

    pub fn set_temp_start(&mut self, value: f32) -> bool {
        set_unit_if_changed(&mut self.temp_start, value)
    }

    pub fn set_temp_end(&mut self, value: f32) -> bool {
        set_unit_if_changed(&mut self.temp_end, value)
    }

    pub fn set_temp_pause_on_idle(&mut self, value: bool) -> bool {
        set_if_changed(&mut self.temp_pause_on_idle, value)
    }

    pub fn set_fill_tolerance(&mut self, percent: i64) -> bool {
        set_if_changed(&mut self.fill_tolerance, percent.clamp(0, 100) as u8)
    }

    pub fn set_fill_sample_all_layers(&mut self, value: bool) -> bool {
        set_if_changed(&mut self.fill_sample_all_layers, value)
    }

    pub fn set_fill_contiguous(&mut self, value: bool) -> bool {
        set_if_changed(&mut self.fill_contiguous, value)
    }
}

// ============================================================================
// CLOCK
// ============================================================================

/// Millisecond time source for the temporal tool.
pub trait Clock: Send {
    fn now_ms(&self) -> f64;
}

/// Milliseconds since construction, from `Instant`.
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A recorded temporal path vertex.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    pub time_ms: Option<f64>,
}

impl StrokePoint {
    fn pos(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

// ============================================================================
// TOOL ENGINE
// ============================================================================

/// Stroke state machine driving the active layer.
///
/// `idle → strokeActive → idle`; the temporal mode accumulates a path
/// while active and rasterizes it on release.  The mode in effect at press
/// time governs the whole stroke.
pub struct ToolEngine {
    pub settings: ToolSettings,
    clock: Box<dyn Clock>,
    /// Mode of the stroke in progress; `None` while idle.
    stroke_mode: Option<ToolMode>,
    /// A history entry has been pushed for the current stroke.
    stroke_begun: bool,
    last_point: Option<(f32, f32)>,
    temporal_path: Vec<StrokePoint>,
}

impl Default for ToolEngine {
    fn default() -> Self {
        Self::new(ToolSettings::default())
    }
}

impl std::fmt::Debug for ToolEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEngine")
            .field("settings", &self.settings)
            .field("stroke_mode", &self.stroke_mode)
            .field("temporal_path_len", &self.temporal_path.len())
            .finish()
    }
}

impl ToolEngine {
    pub fn new(settings: ToolSettings) -> Self {
        Self::with_clock(settings, Box::new(MonotonicClock::default()))
    }

    pub fn with_clock(settings: ToolSettings, clock: Box<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            stroke_mode: None,
            stroke_begun: false,
            last_point: None,
            temporal_path: Vec::new(),
        }
    }

    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn is_stroke_active(&self) -> bool {
        self.stroke_mode.is_some()
    }

    /// The accumulating temporal path, for preview drawing.  Empty when no
    /// temporal stroke is in progress.
    pub fn temporal_path(&self) -> &[StrokePoint] {
        &self.temporal_path
    }

    /// Abandon any stroke in progress.  Pixels already written stay.
    pub fn cancel(&mut self) {
        self.stroke_mode = None;
        self.stroke_begun = false;
        self.last_point = None;
        self.temporal_path.clear();
    }

    // ------------------------------------------------------------------
    // Pointer events.  Each returns `true` when layer pixels changed.
    // ------------------------------------------------------------------

    pub fn press(&mut self, stack: &mut LayerStack, history: &mut HistoryManager, x: f32, y: f32) -> bool {
        let now = self.clock.now_ms();
        self.press_at(stack, history, x, y, Some(now))
    }

    pub fn move_to(&mut self, stack: &mut LayerStack, x: f32, y: f32) -> bool {
        let now = self.clock.now_ms();
        self.move_at(stack, x, y, Some(now))
    }

    pub fn release(&mut self, stack: &mut LayerStack, x: f32, y: f32) -> bool {
        let now = self.clock.now_ms();
        self.release_at(stack, x, y, Some(now))
    }

    pub fn press_at(
        &mut self,
        stack: &mut LayerStack,
        history: &mut HistoryManager,
        x: f32,
        y: f32,
        time_ms: Option<f64>,
    ) -> bool {
        // A press without a release closes the previous stroke implicitly.
        if self.is_stroke_active() {
            log::debug!("press while a stroke is active; dropping the old stroke");
            self.cancel();
        }

        let mode = self.settings.mode;
        match mode {
            ToolMode::Brush | ToolMode::Eraser => {
                self.begin_stroke(mode, stack, history);
                self.last_point = Some((x, y));
                self.paint_segment(stack, (x, y), (x, y))
            }
            ToolMode::Temporal => {
                self.begin_stroke(mode, stack, history);
                self.temporal_path.push(StrokePoint { x, y, time_ms });
                false
            }
            ToolMode::Fill => self.apply_fill(stack, history, x, y),
            ToolMode::LinearGradient | ToolMode::RadialGradient | ToolMode::Picker => false,
        }
    }

    pub fn move_at(&mut self, stack: &mut LayerStack, x: f32, y: f32, time_ms: Option<f64>) -> bool {
        match self.stroke_mode {
            Some(ToolMode::Brush | ToolMode::Eraser) => {
                let from = self.last_point.unwrap_or((x, y));
                self.last_point = Some((x, y));
                self.paint_segment(stack, from, (x, y))
            }
            Some(ToolMode::Temporal) => {
                let far_enough = self
                    .temporal_path
                    .last()
                    .is_none_or(|p| (x - p.x).abs() + (y - p.y).abs() > TEMPORAL_MIN_STEP);
                if far_enough {
                    self.temporal_path.push(StrokePoint { x, y, time_ms });
                }
                false
            }
            _ => false,
        }
    }

    pub fn release_at(&mut self, stack: &mut LayerStack, x: f32, y: f32, time_ms: Option<f64>) -> bool {
        let changed = match self.stroke_mode {
            Some(ToolMode::Brush | ToolMode::Eraser) => {
                let from = self.last_point.unwrap_or((x, y));
                self.paint_segment(stack, from, (x, y))
            }
            Some(ToolMode::Temporal) => {
                self.temporal_path.push(StrokePoint { x, y, time_ms });
                self.bake_temporal(stack)
            }
            _ => false,
        };
        self.cancel();
        changed
    }

    fn begin_stroke(&mut self, mode: ToolMode, stack: &LayerStack, history: &mut HistoryManager) {
        if !self.stroke_begun {
            let label = match mode {
                ToolMode::Eraser => "Eraser Stroke",
                ToolMode::Temporal => "Temporal Stroke",
                _ => "Brush Stroke",
            };
            history.snapshot(label, stack);
            self.stroke_begun = true;
        }
        self.stroke_mode = Some(mode);
    }

    fn pen(&self) -> Pen {
        match self.stroke_mode {
            Some(ToolMode::Eraser) => Pen::Clear,
            _ => Pen::Paint(self.settings.gray_value),
        }
    }

    fn paint_segment(&self, stack: &mut LayerStack, from: (f32, f32), to: (f32, f32)) -> bool {
        let pen = self.pen();
        let diameter = self.settings.brush_size as f32;
        draw_segment(stack.active_pixels_mut(), from, to, diameter, pen)
    }

    // ------------------------------------------------------------------
    // Temporal bake
    // ------------------------------------------------------------------

    /// Cumulative parameter per path vertex and the total, or `None` for a
    /// degenerate path.  Elapsed time is used when allowed and available,
    /// arc length otherwise.
    fn temporal_parameters(&self) -> Option<(Vec<f64>, f64)> {
        let path = &self.temporal_path;
        let use_time = !self.settings.temp_pause_on_idle && path.iter().all(|p| p.time_ms.is_some());

        if use_time {
            let mut cumulative = Vec::with_capacity(path.len());
            let mut total = 0.0;
            let mut last = path[0].time_ms.unwrap_or(0.0);
            cumulative.push(0.0);
            for p in &path[1..] {
                let t = p.time_ms.unwrap_or(last);
                total += (t - last).max(0.0);
                cumulative.push(total);
                last = t;
            }
            if total > DEGENERATE_TOTAL {
                return Some((cumulative, total));
            }
        }

        let mut cumulative = Vec::with_capacity(path.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for pair in path.windows(2) {
            let dx = (pair[1].x - pair[0].x) as f64;
            let dy = (pair[1].y - pair[0].y) as f64;
            total += dx.hypot(dy);
            cumulative.push(total);
        }
        (total > DEGENERATE_TOTAL).then_some((cumulative, total))
    }

    fn bake_temporal(&self, stack: &mut LayerStack) -> bool {
        let Some(first) = self.temporal_path.first().copied() else {
            return false;
        };
        let diameter = self.settings.brush_size as f32;
        let start_v = self.settings.temp_start as f64 * 255.0;
        let end_v = self.settings.temp_end as f64 * 255.0;

        let params = if self.temporal_path.len() < 2 {
            None
        } else {
            self.temporal_parameters()
        };
        let Some((cumulative, total)) = params else {
            let value = start_v.clamp(0.0, 255.0) as u8;
            return stamp_disc(stack.active_pixels_mut(), first.pos(), diameter, Pen::Paint(value));
        };

        let pixels = stack.active_pixels_mut();
        let mut changed = false;
        for (i, pair) in self.temporal_path.windows(2).enumerate() {
            let t_mid = (cumulative[i] + cumulative[i + 1]) * 0.5 / total;
            let value = (start_v + (end_v - start_v) * t_mid).clamp(0.0, 255.0) as u8;
            changed |= draw_segment(pixels, pair[0].pos(), pair[1].pos(), diameter, Pen::Paint(value));
        }
        log::debug!(
            "temporal bake: {} segments over {:.1} units",
            self.temporal_path.len() - 1,
            total
        );
        changed
    }

    // ------------------------------------------------------------------
    // Fill
    // ------------------------------------------------------------------

    /// Flood or global fill from the pixel under `(x, y)`.  A history entry
    /// is recorded only when at least one pixel changed.
    fn apply_fill(&mut self, stack: &mut LayerStack, history: &mut HistoryManager, x: f32, y: f32) -> bool {
        if !(x.is_finite() && y.is_finite()) {
            return false;
        }
        // Truncation toward zero: a press just left of or above the canvas
        // still lands on the first column or row.
        let (px, py) = (x.trunc() as i64, y.trunc() as i64);
        if !stack.active_layer().pixels.contains(px, py) {
            return false;
        }
        let (px, py) = (px as u32, py as u32);

        let sample_all = self.settings.fill_sample_all_layers;
        let source: PixelBuffer = if sample_all {
            match stack.composite() {
                Ok(buf) => buf.clone(),
                Err(err) => {
                    log::warn!("fill: composite unavailable: {err}");
                    return false;
                }
            }
        } else {
            stack.active_layer().pixels.clone()
        };

        let Some(seed) = source.get_straight(px, py).map(|p| p[0]) else {
            return false;
        };
        let target = self.settings.gray_value;
        if seed == target && !sample_all {
            return false;
        }
        let threshold = (255 * self.settings.fill_tolerance as u32 / 100) as u8;

        // Fill a copy-on-write clone; the layer is only touched (and the
        // composite invalidated) when something actually changed.
        let mut dst = stack.active_layer().pixels.clone();
        let filled = if self.settings.fill_contiguous {
            flood_fill(&source, &mut dst, px, py, seed, target, threshold)
        } else {
            global_fill(&source, &mut dst, seed, target, threshold)
        };
        log::debug!(
            "fill at ({px},{py}): seed {seed} -> {target}, threshold {threshold}, {filled} pixels changed"
        );

        if filled == 0 {
            return false;
        }
        history.snapshot("Fill", stack);
        *stack.active_pixels_mut() = dst;
        true
    }
}

#[inline]
fn within(value: u8, seed: u8, threshold: u8) -> bool {
    value.abs_diff(seed) <= threshold
}

#[inline]
fn sample_red(raw: &[u8], idx: usize) -> u8 {
    let o = idx * 4;
    unpremultiply(Rgba([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]))[0]
}

/// 4-connected fill over `source`, writing `target` into `dst`.  Iterative
/// with a visited mask.  Returns the number of pixels whose value changed.
fn flood_fill(
    source: &PixelBuffer,
    dst: &mut PixelBuffer,
    start_x: u32,
    start_y: u32,
    seed: u8,
    target: u8,
    threshold: u8,
) -> usize {
    let (w, h) = source.dimensions();
    let wu = w as usize;
    let src = source.as_raw();
    let mut visited = vec![false; wu * h as usize];
    let fill = gray(target);
    let mut changed = 0usize;

    let seed_idx = start_y as usize * wu + start_x as usize;
    if !within(sample_red(src, seed_idx), seed, threshold) {
        return 0;
    }

    let mut stack: Vec<usize> = Vec::with_capacity(4096);
    visited[seed_idx] = true;
    stack.push(seed_idx);

    while let Some(idx) = stack.pop() {
        let x = (idx % wu) as u32;
        let y = (idx / wu) as u32;
        if dst.get(x, y) != Some(fill) {
            dst.set(x, y, fill);
            changed += 1;
        }

        let mut visit = |ni: usize| {
            if !visited[ni] && within(sample_red(src, ni), seed, threshold) {
                visited[ni] = true;
                stack.push(ni);
            }
        };
        if x > 0 {
            visit(idx - 1);
        }
        if x + 1 < w {
            visit(idx + 1);
        }
        if y > 0 {
            visit(idx - wu);
        }
        if y + 1 < h {
            visit(idx + wu);
        }
    }
    changed
}

/// Non-contiguous fill: every pixel within tolerance of the seed.
fn global_fill(source: &PixelBuffer, dst: &mut PixelBuffer, seed: u8, target: u8, threshold: u8) -> usize {
    let stride = source.width() as usize * 4;
    let fill = gray(target).0;
    let src = source.as_raw();

    dst.as_raw_mut()
        .par_chunks_mut(stride)
        .zip(src.par_chunks(stride))
        .map(|(row_out, row_in)| {
            let mut n = 0usize;
            for (out, inp) in row_out.chunks_exact_mut(4).zip(row_in.chunks_exact(4)) {
                let v = unpremultiply(Rgba([inp[0], inp[1], inp[2], inp[3]]))[0];
                if within(v, seed, threshold) && out[..] != fill[..] {
                    out.copy_from_slice(&fill);
                    n += 1;
                }
            }
            n
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::TRANSPARENT;

    fn setup(w: u32, h: u32) -> (LayerStack, HistoryManager, ToolEngine) {
        (
            LayerStack::new(w, h).unwrap(),
            HistoryManager::default(),
            ToolEngine::default(),
        )
    }

    #[test]
    fn mode_parse_falls_back_to_brush() {
        assert_eq!(ToolMode::parse("temporal"), ToolMode::Temporal);
        assert_eq!(ToolMode::parse("radialGradient"), ToolMode::RadialGradient);
        assert_eq!(ToolMode::parse("spray"), ToolMode::Brush);
    }

    #[test]
    fn setters_clamp_and_report_changes() {
        let mut s = ToolSettings::default();
        assert!(s.set_brush_size(0));
        assert_eq!(s.brush_size, 1);
        assert!(!s.set_brush_size(-4));
        assert!(!s.set_gray_value(999));
        assert!(s.set_gray_value(-1));
        assert_eq!(s.gray_value, 0);
        assert!(s.set_temp_start(2.0));
        assert_eq!(s.temp_start, 1.0);
        assert!(!s.set_temp_start(1.0));
        assert!(!s.set_temp_end(f32::NAN));
        assert!(s.set_fill_tolerance(400));
        assert_eq!(s.fill_tolerance, 100);
    }

    #[test]
    fn brush_stroke_pushes_one_snapshot() {
        let (mut stack, mut history, mut tools) = setup(20, 20);
        tools.settings.brush_size = 3;
        tools.settings.gray_value = 100;

        assert!(tools.press_at(&mut stack, &mut history, 2.0, 10.0, None));
        tools.move_at(&mut stack, 8.0, 10.0, None);
        tools.move_at(&mut stack, 14.0, 10.0, None);
        tools.release_at(&mut stack, 17.0, 10.0, None);

        assert_eq!(history.undo_count(), 1);
        assert!(!tools.is_stroke_active());
        let px = &stack.active_layer().pixels;
        for x in [2, 8, 12, 16] {
            assert_eq!(px.get(x, 10), Some(gray(100)), "x={x}");
        }
    }

    #[test]
    fn eraser_clears_pixels() {
        let (mut stack, mut history, mut tools) = setup(10, 10);
        stack.active_pixels_mut().fill(gray(200));
        tools.settings.mode = ToolMode::Eraser;
        tools.settings.brush_size = 2;
        tools.press_at(&mut stack, &mut history, 5.0, 5.0, None);
        tools.release_at(&mut stack, 5.0, 5.0, None);
        assert_eq!(stack.active_layer().pixels.get(4, 4), Some(TRANSPARENT));
        assert_eq!(stack.active_layer().pixels.get(0, 0), Some(gray(200)));
    }

    #[test]
    fn moves_while_idle_do_nothing() {
        let (mut stack, mut history, mut tools) = setup(10, 10);
        assert!(!tools.move_at(&mut stack, 3.0, 3.0, None));
        assert!(!tools.release_at(&mut stack, 3.0, 3.0, None));
        assert!(stack.active_layer().pixels.as_raw().iter().all(|&b| b == 0));
        assert!(!history.can_undo());
    }

    #[test]
    fn inert_modes_do_not_touch_history() {
        let (mut stack, mut history, mut tools) = setup(10, 10);
        for mode in [ToolMode::LinearGradient, ToolMode::RadialGradient, ToolMode::Picker] {
            tools.settings.mode = mode;
            assert!(!tools.press_at(&mut stack, &mut history, 1.0, 1.0, None));
            assert!(!tools.release_at(&mut stack, 5.0, 5.0, None));
        }
        assert!(!history.can_undo());
    }

    #[test]
    fn fill_example_fills_whole_canvas() {
        let (mut stack, mut history, mut tools) = setup(4, 4);
        tools.settings.mode = ToolMode::Fill;
        tools.settings.gray_value = 200;
        assert!(tools.press_at(&mut stack, &mut history, 1.0, 1.0, None));
        let px = &stack.active_layer().pixels;
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(px.get(x, y), Some(gray(200)));
            }
        }
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn flood_fill_stops_at_boundary_but_global_does_not() {
        let (mut stack, mut history, mut tools) = setup(5, 3);
        // Vertical wall at x = 2.
        for y in 0..3 {
            stack.active_pixels_mut().set(2, y, gray(255));
        }
        tools.settings.mode = ToolMode::Fill;
        tools.settings.gray_value = 80;
        tools.press_at(&mut stack, &mut history, 0.0, 0.0, None);
        assert_eq!(stack.active_layer().pixels.get(1, 2), Some(gray(80)));
        assert_eq!(stack.active_layer().pixels.get(3, 0), Some(TRANSPARENT));

        history.undo(&mut stack);
        tools.settings.fill_contiguous = false;
        tools.press_at(&mut stack, &mut history, 0.0, 0.0, None);
        assert_eq!(stack.active_layer().pixels.get(3, 0), Some(gray(80)));
        assert_eq!(stack.active_layer().pixels.get(2, 1), Some(gray(255)));
    }

    #[test]
    fn fill_with_same_value_on_active_layer_is_skipped() {
        let (mut stack, mut history, mut tools) = setup(3, 3);
        stack.active_pixels_mut().fill(gray(60));
        tools.settings.mode = ToolMode::Fill;
        tools.settings.gray_value = 60;
        assert!(!tools.press_at(&mut stack, &mut history, 1.0, 1.0, None));
        assert!(!history.can_undo());
        assert!(!tools.press_at(&mut stack, &mut history, -1.0, 1.0, None));
    }

    #[test]
    fn fill_that_changes_nothing_leaves_the_composite_clean() {
        let (mut stack, mut history, mut tools) = setup(3, 3);
        stack.active_pixels_mut().fill(gray(10));
        stack.composite().unwrap();
        let generation = stack.dirty_generation();

        tools.settings.mode = ToolMode::Fill;
        tools.settings.gray_value = 10;
        tools.settings.fill_sample_all_layers = true;
        assert!(!tools.press_at(&mut stack, &mut history, 1.0, 1.0, None));
        assert_eq!(stack.dirty_generation(), generation);
        assert!(!stack.is_composite_dirty());
        assert!(!history.can_undo());
    }

    #[test]
    fn fill_truncates_coordinates_toward_zero() {
        let (mut stack, mut history, mut tools) = setup(3, 3);
        tools.settings.mode = ToolMode::Fill;
        tools.settings.gray_value = 70;
        assert!(tools.press_at(&mut stack, &mut history, -0.4, 1.0, None));
        assert_eq!(stack.active_layer().pixels.get(0, 1), Some(gray(70)));
        assert_eq!(history.undo_description(), Some("Fill"));
    }

    #[test]
    fn fill_can_sample_the_composite() {
        let (mut stack, mut history, mut tools) = setup(4, 1);
        // Bottom layer: left half bright.  Top (active) layer empty.
        stack.layer_pixels_mut(0).unwrap().set(0, 0, gray(255));
        stack.layer_pixels_mut(0).unwrap().set(1, 0, gray(255));
        stack.add_layer().unwrap();

        tools.settings.mode = ToolMode::Fill;
        tools.settings.gray_value = 10;
        tools.settings.fill_sample_all_layers = true;
        assert!(tools.press_at(&mut stack, &mut history, 3.0, 0.0, None));

        let top = &stack.layer(1).unwrap().pixels;
        assert_eq!(top.get(3, 0), Some(gray(10)));
        assert_eq!(top.get(2, 0), Some(gray(10)));
        assert_eq!(top.get(1, 0), Some(TRANSPARENT));
    }

    #[test]
    fn temporal_single_point_stamps_start_value() {
        let (mut stack, mut history, mut tools) = setup(10, 10);
        tools.settings.mode = ToolMode::Temporal;
        tools.settings.brush_size = 4;
        tools.settings.temp_start = 0.5;
        tools.press_at(&mut stack, &mut history, 5.0, 5.0, Some(0.0));
        assert_eq!(tools.temporal_path().len(), 1);
        tools.release_at(&mut stack, 5.0, 5.0, Some(10.0));
        assert_eq!(stack.active_layer().pixels.get(5, 5), Some(gray(127)));
        assert!(tools.temporal_path().is_empty());
        assert_eq!(history.undo_count(), 1);
    }

    #[test]
    fn temporal_decimates_close_points() {
        let (mut stack, mut history, mut tools) = setup(10, 10);
        tools.settings.mode = ToolMode::Temporal;
        tools.press_at(&mut stack, &mut history, 1.0, 1.0, None);
        tools.move_at(&mut stack, 1.5, 1.5, None);
        tools.move_at(&mut stack, 2.5, 1.5, None);
        assert_eq!(tools.temporal_path().len(), 2);
    }

    #[test]
    fn temporal_uses_time_when_not_pausing() {
        let (mut stack, mut history, mut tools) = setup(40, 3);
        tools.settings.mode = ToolMode::Temporal;
        tools.settings.brush_size = 1;
        tools.settings.temp_pause_on_idle = false;

        // First 30 px in 10 ms, last 10 px in 990 ms.
        tools.press_at(&mut stack, &mut history, 0.0, 1.5, Some(0.0));
        tools.move_at(&mut stack, 30.0, 1.5, Some(10.0));
        tools.release_at(&mut stack, 40.0, 1.5, Some(1000.0));

        let px = &stack.active_layer().pixels;
        // Midpoint parameter of the first segment is 0.005.
        assert_eq!(px.get(10, 1), Some(gray(1)));
        // Second segment midpoint is 0.505.
        assert_eq!(px.get(35, 1), Some(gray(128)));
    }
}
