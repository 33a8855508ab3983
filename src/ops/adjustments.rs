// ============================================================================
// ADJUSTMENT OPERATIONS — intensity remap and histogram of a single layer
// ============================================================================
//
// Pixels are un-premultiplied before the red channel is read, remapped, and
// premultiplied again on write.  Alpha is never modified.  Rows run in
// parallel via rayon.
// ============================================================================

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{premultiply, unpremultiply, LayerStack};

/// Levels parameters after clamping into `0..=255`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Levels {
    pub min: u8,
    pub max: u8,
    pub center: u8,
}

impl Levels {
    /// `None` when `max <= min` (after clamping), which makes the remap a no-op.
    pub fn new(min: i64, max: i64, center: i64) -> Option<Self> {
        let clamp = |v: i64| v.clamp(0, 255) as u8;
        let (min, max, center) = (clamp(min), clamp(max), clamp(center));
        (max > min).then_some(Self { min, max, center })
    }

    /// `round(clamp((v − min)/(max − min) + (center/255 − 0.5), 0, 1) · 255)`
    pub fn lookup_table(&self) -> [u8; 256] {
        let min = self.min as f32;
        let inv_range = 1.0 / (self.max as f32 - min);
        let shift = self.center as f32 / 255.0 - 0.5;
        let mut lut = [0u8; 256];
        for (v, out) in lut.iter_mut().enumerate() {
            let norm = ((v as f32 - min) * inv_range + shift).clamp(0.0, 1.0);
            *out = (norm * 255.0).round() as u8;
        }
        lut
    }
}

/// Remap the intensity of layer `index`.  Returns the number of pixels
/// whose stored value changed; 0 for an out-of-range index.
pub fn apply_levels(stack: &mut LayerStack, index: usize, levels: Levels) -> usize {
    let Some(pixels) = stack.layer_pixels_mut(index) else {
        return 0;
    };
    let lut = levels.lookup_table();
    let stride = pixels.width() as usize * 4;

    let changed: usize = pixels
        .as_raw_mut()
        .par_chunks_mut(stride)
        .map(|row| {
            let mut n = 0usize;
            for px in row.chunks_exact_mut(4) {
                let straight = unpremultiply(Rgba([px[0], px[1], px[2], px[3]]));
                let v = lut[straight[0] as usize];
                let out = premultiply(Rgba([v, v, v, px[3]]));
                if out.0[..] != px[..] {
                    px.copy_from_slice(&out.0);
                    n += 1;
                }
            }
            n
        })
        .sum();

    log::debug!(
        "levels on layer {index}: min {} max {} center {}, {changed} pixels changed",
        levels.min,
        levels.max,
        levels.center
    );
    changed
}

/// 256-bin histogram of straight red intensity over non-transparent pixels.
pub fn compute_histogram(stack: &LayerStack, index: usize) -> [u32; 256] {
    let mut hist = [0u32; 256];
    let Some(layer) = stack.layer(index) else {
        return hist;
    };
    for px in layer.pixels.as_raw().chunks_exact(4) {
        if px[3] == 0 {
            continue;
        }
        let v = unpremultiply(Rgba([px[0], px[1], px[2], px[3]]))[0];
        hist[v as usize] += 1;
    }
    hist
}
