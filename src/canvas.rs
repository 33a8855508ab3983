use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CanvasError;

/// Upper bound on canvas area (width × height).
pub const MAX_CANVAS_PIXELS: u64 = 256_000_000;

/// Fully transparent premultiplied pixel.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// ============================================================================
// PIXEL HELPERS – premultiplied <-> straight alpha
// ============================================================================

/// Opaque gray sample (premultiplied and straight forms coincide).
#[inline]
pub fn gray(value: u8) -> Rgba<u8> {
    Rgba([value, value, value, 255])
}

/// Convert a straight-alpha pixel to the premultiplied storage form.
#[inline]
pub fn premultiply(px: Rgba<u8>) -> Rgba<u8> {
    let a = px[3] as u32;
    if a == 255 {
        return px;
    }
    let mul = |c: u8| ((c as u32 * a + 127) / 255) as u8;
    Rgba([mul(px[0]), mul(px[1]), mul(px[2]), px[3]])
}

/// Convert a stored premultiplied pixel back to straight alpha.
#[inline]
pub fn unpremultiply(px: Rgba<u8>) -> Rgba<u8> {
    let a = px[3] as u32;
    match a {
        0 => TRANSPARENT,
        255 => px,
        _ => {
            let div = |c: u8| ((c as u32 * 255 + a / 2) / a).min(255) as u8;
            Rgba([div(px[0]), div(px[1]), div(px[2]), px[3]])
        }
    }
}

// ============================================================================
// PIXEL BUFFER – fixed-size RGBA8 grid, premultiplied alpha
// ============================================================================

/// Fixed-size grid of premultiplied RGBA samples.
///
/// Storage is an `Arc<RgbaImage>` with copy-on-write semantics: `clone()`
/// only bumps a reference count, and the first write through either copy
/// detaches it.  Observable behaviour is that of a deep copy, which is what
/// history snapshots rely on.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    image: Arc<RgbaImage>,
}

impl PartialEq for PixelBuffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
            || (self.image.dimensions() == other.image.dimensions()
                && self.image.as_raw() == other.image.as_raw())
    }
}

impl Eq for PixelBuffer {}

impl PixelBuffer {
    /// Allocate a fully transparent buffer.
    ///
    /// Zero-sized and oversized requests are rejected, and a failed
    /// allocation is reported instead of aborting the process.
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        if width == 0 || height == 0 {
            return Err(CanvasError::InvalidDimensions { width, height });
        }
        let total = width as u64 * height as u64;
        if total > MAX_CANVAS_PIXELS {
            log::warn!("PixelBuffer::new: {}×{} exceeds {} pixels", width, height, MAX_CANVAS_PIXELS);
            return Err(CanvasError::TooLarge { width, height, limit: MAX_CANVAS_PIXELS });
        }

        let bytes = total as usize * 4;
        let mut raw: Vec<u8> = Vec::new();
        if raw.try_reserve_exact(bytes).is_err() {
            log::warn!("PixelBuffer::new: allocation of {} bytes failed", bytes);
            return Err(CanvasError::OutOfMemory { width, height, bytes });
        }
        raw.resize(bytes, 0);

        let image = RgbaImage::from_raw(width, height, raw)
            .ok_or(CanvasError::InvalidDimensions { width, height })?;
        Ok(Self { image: Arc::new(image) })
    }

    /// Allocate a buffer with every sample set to `color`.
    pub fn new_filled(width: u32, height: u32, color: Rgba<u8>) -> Result<Self, CanvasError> {
        let mut buf = Self::new(width, height)?;
        if color != TRANSPARENT {
            buf.fill(color);
        }
        Ok(buf)
    }

    pub fn width(&self) -> u32 { self.image.width() }

    pub fn height(&self) -> u32 { self.image.height() }

    pub fn dimensions(&self) -> (u32, u32) { self.image.dimensions() }

    /// True when `(x, y)` addresses a pixel inside the grid.
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width() as i64 && y < self.height() as i64
    }

    /// Read the stored (premultiplied) sample.  `None` outside the grid.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(*self.image.get_pixel(x, y))
    }

    /// Read a sample converted to straight alpha.
    #[inline]
    pub fn get_straight(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.get(x, y).map(unpremultiply)
    }

    /// Write a premultiplied sample.  Returns `false` (and writes nothing)
    /// when the coordinate is outside the grid.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, pixel: Rgba<u8>) -> bool {
        if x >= self.width() || y >= self.height() {
            return false;
        }
        Arc::make_mut(&mut self.image).put_pixel(x, y, pixel);
        true
    }

    /// Set every sample to `color`.
    pub fn fill(&mut self, color: Rgba<u8>) {
        for px in Arc::make_mut(&mut self.image).pixels_mut() {
            *px = color;
        }
    }

    /// Make every sample transparent.
    pub fn clear(&mut self) {
        self.fill(TRANSPARENT);
    }

    /// Copy this buffer onto a transparent canvas of `new_w × new_h`, with
    /// the old top-left corner landing at `(offset_x, offset_y)`.  Whatever
    /// falls outside the new bounds is clipped.
    pub fn resize_into(
        &self,
        new_w: u32,
        new_h: u32,
        offset_x: i64,
        offset_y: i64,
    ) -> Result<PixelBuffer, CanvasError> {
        let mut out = PixelBuffer::new(new_w, new_h)?;
        image::imageops::replace(
            Arc::make_mut(&mut out.image),
            &*self.image,
            offset_x,
            offset_y,
        );
        Ok(out)
    }

    /// Borrow the underlying image (premultiplied RGBA8).
    pub fn as_image(&self) -> &RgbaImage {
        &self.image
    }

    /// Raw premultiplied bytes, row-major, 4 bytes per pixel.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Mutable raw bytes (detaches shared storage first).
    pub fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut **Arc::make_mut(&mut self.image)
    }

    /// Approximate owned memory in bytes.  Storage still shared with a
    /// snapshot is counted at pointer cost only.
    pub fn memory_bytes(&self) -> usize {
        if Arc::strong_count(&self.image) == 1 {
            self.image.as_raw().len()
        } else {
            std::mem::size_of::<usize>() * 2
        }
    }
}

// ============================================================================
// BLEND MODE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendMode {
    #[default]
    Normal,
    Add,
    Multiply,
    Xor,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[BlendMode::Normal, BlendMode::Add, BlendMode::Multiply, BlendMode::Xor]
    }

    /// Identifier used on the command interface.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Add => "add",
            BlendMode::Multiply => "multiply",
            BlendMode::Xor => "xor",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "Normal",
            BlendMode::Add => "Add",
            BlendMode::Multiply => "Multiply",
            BlendMode::Xor => "Xor",
        }
    }

    /// Parse an identifier; unknown strings fall back to `Normal`.
    pub fn parse(s: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or_default()
    }
}

// ============================================================================
// CANVAS ANCHOR
// ============================================================================

/// Where existing content is pinned when the canvas is resized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanvasAnchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    #[default]
    Center,
}

impl CanvasAnchor {
    pub fn all() -> &'static [CanvasAnchor] {
        &[
            CanvasAnchor::TopLeft,
            CanvasAnchor::TopRight,
            CanvasAnchor::BottomLeft,
            CanvasAnchor::BottomRight,
            CanvasAnchor::Center,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CanvasAnchor::TopLeft => "topLeft",
            CanvasAnchor::TopRight => "topRight",
            CanvasAnchor::BottomLeft => "bottomLeft",
            CanvasAnchor::BottomRight => "bottomRight",
            CanvasAnchor::Center => "center",
        }
    }

    /// Parse an identifier; unknown strings fall back to `Center`.
    pub fn parse(s: &str) -> Self {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or_default()
    }

    /// Offset of the old content's top-left corner inside the new canvas.
    pub fn offset(&self, old_w: u32, old_h: u32, new_w: u32, new_h: u32) -> (i64, i64) {
        let dw = new_w as i64 - old_w as i64;
        let dh = new_h as i64 - old_h as i64;
        match self {
            CanvasAnchor::TopLeft => (0, 0),
            CanvasAnchor::TopRight => (dw, 0),
            CanvasAnchor::BottomLeft => (0, dh),
            CanvasAnchor::BottomRight => (dw, dh),
            CanvasAnchor::Center => (dw.div_euclid(2), dh.div_euclid(2)),
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct Layer {
    pub id: Uuid,
    pub name: String,
    pub visible: bool,
    /// Always within `[0, 1]`.
    pub opacity: f32,
    pub blend_mode: BlendMode,
    pub pixels: PixelBuffer,
}

impl Layer {
    /// Blank, fully transparent layer.
    pub fn new(name: String, width: u32, height: u32) -> Result<Self, CanvasError> {
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            visible: true,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            pixels: PixelBuffer::new(width, height)?,
        })
    }

    /// Copy of this layer with a fresh id and a " copy" suffix.
    pub fn duplicate(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("{} copy", self.name),
            visible: self.visible,
            opacity: self.opacity,
            blend_mode: self.blend_mode,
            pixels: self.pixels.clone(),
        }
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers (index 0 is the bottom), the active-layer pointer, and
/// the lazily recomputed composite.
///
/// Invariants: at least one layer; `active_layer_index < layers.len()`;
/// every layer's buffer is `width × height`.
#[derive(Debug)]
pub struct LayerStack {
    pub(crate) layers: Vec<Layer>,
    pub(crate) active_layer_index: usize,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) composite_cache: Option<PixelBuffer>,
    pub(crate) composite_dirty: bool,
    /// Bumped on every invalidation.
    pub(crate) dirty_generation: u64,
}

impl LayerStack {
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        let base = Layer::new("Layer 1".to_string(), width, height)?;
        Ok(Self {
            layers: vec![base],
            active_layer_index: 0,
            width,
            height,
            composite_cache: None,
            composite_dirty: true,
            dirty_generation: 0,
        })
    }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    pub fn len(&self) -> usize { self.layers.len() }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool { self.layers.is_empty() }

    pub fn layers(&self) -> &[Layer] { &self.layers }

    pub fn layer(&self, index: usize) -> Option<&Layer> { self.layers.get(index) }

    pub fn active_layer_index(&self) -> usize { self.active_layer_index }

    pub fn active_layer(&self) -> &Layer {
        &self.layers[self.active_layer_index]
    }

    pub fn dirty_generation(&self) -> u64 { self.dirty_generation }

    pub fn is_composite_dirty(&self) -> bool { self.composite_dirty }

    /// Invalidate the composite; it is rebuilt on the next read.
    pub fn mark_dirty(&mut self) {
        self.composite_dirty = true;
        self.dirty_generation = self.dirty_generation.wrapping_add(1);
    }

    /// Mutable pixels of layer `index`.  Handing out the buffer counts as
    /// a mutation, so the composite is invalidated.
    pub fn layer_pixels_mut(&mut self, index: usize) -> Option<&mut PixelBuffer> {
        if index >= self.layers.len() {
            return None;
        }
        self.mark_dirty();
        Some(&mut self.layers[index].pixels)
    }

    pub fn active_pixels_mut(&mut self) -> &mut PixelBuffer {
        self.mark_dirty();
        &mut self.layers[self.active_layer_index].pixels
    }

    /// Append a blank layer on top and make it active.
    pub fn add_layer(&mut self) -> Result<usize, CanvasError> {
        let name = format!("Layer {}", self.layers.len() + 1);
        let layer = Layer::new(name, self.width, self.height)?;
        self.layers.push(layer);
        self.active_layer_index = self.layers.len() - 1;
        self.mark_dirty();
        Ok(self.active_layer_index)
    }

    /// Copy layer `index` directly above itself and make the copy active.
    pub fn duplicate_layer(&mut self, index: usize) -> bool {
        let Some(src) = self.layers.get(index) else { return false };
        let dup = src.duplicate();
        self.layers.insert(index + 1, dup);
        self.active_layer_index = index + 1;
        self.mark_dirty();
        true
    }

    /// Remove layer `index`.  The last remaining layer is never removed.
    pub fn delete_layer(&mut self, index: usize) -> bool {
        if self.layers.len() <= 1 || index >= self.layers.len() {
            return false;
        }
        self.layers.remove(index);
        self.active_layer_index = self.active_layer_index.min(self.layers.len() - 1);
        self.mark_dirty();
        true
    }

    pub fn set_active_layer(&mut self, index: usize) -> bool {
        if index >= self.layers.len() || index == self.active_layer_index {
            return false;
        }
        self.active_layer_index = index;
        true
    }

    /// Set opacity (clamped to `[0, 1]`).  NaN is ignored.
    pub fn set_opacity(&mut self, index: usize, opacity: f32) -> bool {
        if opacity.is_nan() {
            return false;
        }
        let Some(layer) = self.layers.get_mut(index) else { return false };
        let opacity = opacity.clamp(0.0, 1.0);
        if (layer.opacity - opacity).abs() <= f32::EPSILON {
            return false;
        }
        layer.opacity = opacity;
        self.mark_dirty();
        true
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        if layer.visible == visible {
            return false;
        }
        layer.visible = visible;
        self.mark_dirty();
        true
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        if layer.blend_mode == mode {
            return false;
        }
        layer.blend_mode = mode;
        self.mark_dirty();
        true
    }

    pub fn rename_layer(&mut self, index: usize, name: &str) -> bool {
        let Some(layer) = self.layers.get_mut(index) else { return false };
        if layer.name == name {
            return false;
        }
        layer.name = name.to_string();
        true
    }

    /// Move layer `from` to position `to` (clamped into range).  The active
    /// pointer follows the moved layer if it was the active one.
    pub fn move_layer(&mut self, from: usize, to: usize) -> bool {
        if from >= self.layers.len() {
            return false;
        }
        let to = to.min(self.layers.len() - 1);
        if from == to {
            return false;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        if self.active_layer_index == from {
            self.active_layer_index = to;
        }
        self.mark_dirty();
        true
    }

    /// Resize every layer to `width × height` (each clamped to ≥ 1),
    /// placing old content according to `anchor`.  Returns `Ok(false)` when
    /// the size is unchanged.  All new buffers are built before any layer is
    /// replaced, so a failed allocation leaves the stack untouched.
    pub fn resize_canvas(
        &mut self,
        width: u32,
        height: u32,
        anchor: CanvasAnchor,
    ) -> Result<bool, CanvasError> {
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return Ok(false);
        }

        let (dx, dy) = anchor.offset(self.width, self.height, width, height);
        let resized = self
            .layers
            .iter()
            .map(|l| l.pixels.resize_into(width, height, dx, dy))
            .collect::<Result<Vec<_>, _>>()?;

        for (layer, pixels) in self.layers.iter_mut().zip(resized) {
            layer.pixels = pixels;
        }
        log::info!(
            "canvas resized {}×{} -> {}×{} (anchor {}, offset {},{})",
            self.width, self.height, width, height, anchor.as_str(), dx, dy
        );
        self.width = width;
        self.height = height;
        self.composite_cache = None;
        self.mark_dirty();
        Ok(true)
    }

    /// Replace the whole state wholesale (used by undo/redo).  The active
    /// index is clamped and the composite buffer is dropped so it is rebuilt
    /// at the restored dimensions.
    pub(crate) fn replace_state(&mut self, layers: Vec<Layer>, active: usize, width: u32, height: u32) {
        if layers.is_empty() {
            log::warn!("LayerStack::replace_state: refusing empty layer list");
            return;
        }
        self.active_layer_index = active.min(layers.len() - 1);
        self.layers = layers;
        self.width = width;
        self.height = height;
        self.composite_cache = None;
        self.mark_dirty();
    }
}
