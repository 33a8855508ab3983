// ============================================================================
// ROUND PEN RASTERIZATION
// ============================================================================
//
// A stroke segment is a capsule: every pixel whose centre lies strictly
// closer than `diameter / 2` to the segment is written.  Endpoints are
// snapped to the pixel grid first: odd diameters centre on the pixel that
// contains the point, even diameters on the nearest pixel corner.  Either
// way the pixel under every path point is covered.  A zero-length
// segment degenerates to a filled disc, which is also what single-point
// stamps use.  Edges are hard (no coverage antialiasing) so written values
// are exactly the pen's gray value.
// ============================================================================

use image::Rgba;

use crate::canvas::{gray, PixelBuffer, TRANSPARENT};

/// What a pen writes into covered pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pen {
    /// Opaque gray.
    Paint(u8),
    /// Fully transparent (eraser).
    Clear,
}

impl Pen {
    #[inline]
    pub fn pixel(self) -> Rgba<u8> {
        match self {
            Pen::Paint(v) => gray(v),
            Pen::Clear => TRANSPARENT,
        }
    }
}

/// Squared distance from `p` to the segment `a`–`b`.
#[inline]
fn dist_sq_to_segment(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    (p.0 - cx) * (p.0 - cx) + (p.1 - cy) * (p.1 - cy)
}

/// Snap `p` to where a pen of `diameter` is anchored on the pixel grid.
#[inline]
fn snap_to_grid(p: (f32, f32), diameter: f32) -> (f32, f32) {
    if diameter.round() as u64 % 2 == 1 {
        (p.0.floor() + 0.5, p.1.floor() + 0.5)
    } else {
        (p.0.round(), p.1.round())
    }
}

/// Draw a round-capped segment from `start` to `end`.  Returns `true` when
/// at least one pixel changed.
pub fn draw_segment(
    buf: &mut PixelBuffer,
    start: (f32, f32),
    end: (f32, f32),
    diameter: f32,
    pen: Pen,
) -> bool {
    if !(start.0.is_finite() && start.1.is_finite() && end.0.is_finite() && end.1.is_finite()) {
        return false;
    }
    let diameter = diameter.max(1.0);
    let radius = diameter * 0.5;
    let r_sq = radius * radius;
    let start = snap_to_grid(start, diameter);
    let end = snap_to_grid(end, diameter);

    let (w, h) = buf.dimensions();
    let min_x = (start.0.min(end.0) - radius).floor().max(0.0);
    let min_y = (start.1.min(end.1) - radius).floor().max(0.0);
    let max_x = (start.0.max(end.0) + radius).ceil().min(w as f32 - 1.0);
    let max_y = (start.1.max(end.1) + radius).ceil().min(h as f32 - 1.0);
    if max_x < min_x || max_y < min_y {
        return false;
    }

    let color = pen.pixel();
    let mut changed = false;
    for y in min_y as u32..=max_y as u32 {
        for x in min_x as u32..=max_x as u32 {
            let centre = (x as f32 + 0.5, y as f32 + 0.5);
            if dist_sq_to_segment(centre, start, end) >= r_sq {
                continue;
            }
            if buf.get(x, y) != Some(color) {
                buf.set(x, y, color);
                changed = true;
            }
        }
    }
    changed
}

/// Filled disc of `diameter` centred on `centre`.
pub fn stamp_disc(buf: &mut PixelBuffer, centre: (f32, f32), diameter: f32, pen: Pen) -> bool {
    draw_segment(buf, centre, centre, diameter, pen)
}
