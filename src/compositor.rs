// ============================================================================
// COMPOSITOR — flatten visible layers into the cached composite buffer
// ============================================================================
//
// All arithmetic is on premultiplied samples.  Layers are drawn bottom to
// top onto a transparent accumulator; rows are blended in parallel with
// rayon, but the whole pass completes inside the calling command.
// ============================================================================

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{BlendMode, Layer, LayerStack, PixelBuffer};
use crate::error::CanvasError;

/// Blend one premultiplied `top` sample over `base`.
///
/// * `Normal`   – source-over.
/// * `Add`      – per-channel sum, clamped.
/// * `Multiply` – `s·d + s·(1−da) + d·(1−sa)`.
/// * `Xor`      – `s·(1−da) + d·(1−sa)`; symmetric in its operands, and two
///   opaque copies of the same image cancel to transparent.
///
/// `opacity` scales every channel of `top` before blending.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top.0 == [0, 0, 0, 0] {
        return base;
    }
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let s = [
        top[0] as f32 / 255.0 * opacity,
        top[1] as f32 / 255.0 * opacity,
        top[2] as f32 / 255.0 * opacity,
        top[3] as f32 / 255.0 * opacity,
    ];
    let d = [
        base[0] as f32 / 255.0,
        base[1] as f32 / 255.0,
        base[2] as f32 / 255.0,
        base[3] as f32 / 255.0,
    ];
    let (sa, da) = (s[3], d[3]);

    let channel = |i: usize| -> f32 {
        match mode {
            BlendMode::Normal => s[i] + d[i] * (1.0 - sa),
            BlendMode::Add => (s[i] + d[i]).min(1.0),
            BlendMode::Multiply => s[i] * d[i] + s[i] * (1.0 - da) + d[i] * (1.0 - sa),
            BlendMode::Xor => s[i] * (1.0 - da) + d[i] * (1.0 - sa),
        }
    };

    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    let a = to_u8(channel(3));
    // Keep the premultiplied invariant: no colour channel may exceed alpha.
    Rgba([
        to_u8(channel(0)).min(a),
        to_u8(channel(1)).min(a),
        to_u8(channel(2)).min(a),
        a,
    ])
}

/// Flatten `layers` into a freshly allocated `width × height` buffer.
pub fn composite_layers(layers: &[Layer], width: u32, height: u32) -> Result<PixelBuffer, CanvasError> {
    let mut out = PixelBuffer::new(width, height)?;
    let stride = width as usize * 4;

    for layer in layers {
        if !layer.visible {
            continue;
        }
        if layer.pixels.dimensions() != (width, height) {
            log::warn!(
                "composite: skipping layer {:?} with mismatched size {:?}",
                layer.name,
                layer.pixels.dimensions()
            );
            continue;
        }

        let src = layer.pixels.as_raw();
        let mode = layer.blend_mode;
        let opacity = layer.opacity;
        let opaque_overwrite = mode == BlendMode::Normal && opacity >= 1.0;

        out.as_raw_mut()
            .par_chunks_mut(stride)
            .zip(src.par_chunks(stride))
            .for_each(|(row_out, row_in)| {
                for (dst, top) in row_out.chunks_exact_mut(4).zip(row_in.chunks_exact(4)) {
                    if opaque_overwrite && top[3] == 255 {
                        dst.copy_from_slice(top);
                        continue;
                    }
                    let base = Rgba([dst[0], dst[1], dst[2], dst[3]]);
                    let top = Rgba([top[0], top[1], top[2], top[3]]);
                    dst.copy_from_slice(&blend_pixel(base, top, mode, opacity).0);
                }
            });
    }

    Ok(out)
}

impl LayerStack {
    /// The flattened image of all visible layers.
    ///
    /// Served from cache while clean; otherwise recomputed synchronously
    /// and cached.  Allocation failure is the only error.
    pub fn composite(&mut self) -> Result<&PixelBuffer, CanvasError> {
        let cached = match self.composite_cache.take() {
            Some(buf) if !self.composite_dirty => buf,
            _ => {
                let fresh = composite_layers(&self.layers, self.width, self.height)?;
                log::debug!(
                    "composite rebuilt: {} layers, {}×{}, generation {}",
                    self.layers.len(),
                    self.width,
                    self.height,
                    self.dirty_generation
                );
                fresh
            }
        };
        self.composite_dirty = false;
        Ok(self.composite_cache.insert(cached))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{gray, TRANSPARENT};

    #[test]
    fn normal_over_transparent_is_identity() {
        assert_eq!(blend_pixel(TRANSPARENT, gray(80), BlendMode::Normal, 1.0), gray(80));
        let half = Rgba([50, 50, 50, 128]);
        assert_eq!(blend_pixel(TRANSPARENT, half, BlendMode::Normal, 1.0), half);
    }

    #[test]
    fn opacity_scales_source() {
        let out = blend_pixel(TRANSPARENT, gray(200), BlendMode::Normal, 0.5);
        assert_eq!(out, Rgba([100, 100, 100, 128]));
    }

    #[test]
    fn add_clamps() {
        let out = blend_pixel(gray(200), gray(100), BlendMode::Add, 1.0);
        assert_eq!(out, gray(255));
    }

    #[test]
    fn multiply_of_opaque_grays() {
        assert_eq!(blend_pixel(gray(128), gray(255), BlendMode::Multiply, 1.0), gray(128));
        assert_eq!(blend_pixel(gray(255), gray(0), BlendMode::Multiply, 1.0), gray(0));
        // Over nothing, multiply behaves like source-over.
        assert_eq!(blend_pixel(TRANSPARENT, gray(90), BlendMode::Multiply, 1.0), gray(90));
    }

    #[test]
    fn xor_is_symmetric_and_self_cancelling() {
        let a = Rgba([40, 40, 40, 120]);
        let b = Rgba([10, 60, 0, 200]);
        assert_eq!(
            blend_pixel(a, b, BlendMode::Xor, 1.0),
            blend_pixel(b, a, BlendMode::Xor, 1.0)
        );
        assert_eq!(blend_pixel(gray(170), gray(170), BlendMode::Xor, 1.0), TRANSPARENT);
        assert_eq!(blend_pixel(TRANSPARENT, gray(170), BlendMode::Xor, 1.0), gray(170));
    }

    #[test]
    fn composite_skips_hidden_layers_and_caches() {
        let mut stack = LayerStack::new(3, 3).unwrap();
        stack.layer_pixels_mut(0).unwrap().fill(gray(10));
        stack.add_layer().unwrap();
        stack.layer_pixels_mut(1).unwrap().fill(gray(250));
        stack.set_visible(1, false);

        assert_eq!(stack.composite().unwrap().get(1, 1), Some(gray(10)));
        assert!(!stack.is_composite_dirty());

        stack.set_visible(1, true);
        assert!(stack.is_composite_dirty());
        assert_eq!(stack.composite().unwrap().get(1, 1), Some(gray(250)));
    }

    #[test]
    fn xor_layer_over_identical_layer_cancels() {
        let mut stack = LayerStack::new(4, 4).unwrap();
        stack.layer_pixels_mut(0).unwrap().fill(gray(33));
        stack.duplicate_layer(0);
        stack.set_blend_mode(1, BlendMode::Xor);
        let out = stack.composite().unwrap();
        assert!(out.as_raw().iter().all(|&b| b == 0));
    }

    #[test]
    fn composite_tracks_resize() {
        let mut stack = LayerStack::new(2, 2).unwrap();
        stack.composite().unwrap();
        stack.resize_canvas(5, 3, crate::canvas::CanvasAnchor::Center).unwrap();
        assert_eq!(stack.composite().unwrap().dimensions(), (5, 3));
    }
}
