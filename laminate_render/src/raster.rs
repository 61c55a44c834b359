// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Convex polygon scan conversion.
//!
//! A pixel is covered when its center lies inside the polygon. Spans are
//! half-open on the right, so polygons sharing an edge never both cover
//! the same pixel.

use kurbo::{Point, Rect};
use laminate_core::device::{BYTES_PER_PIXEL, PixelTarget};

/// Signed area of a closed polygon (shoelace formula).
///
/// Positive when the vertices run counter-clockwise in a y-up coordinate
/// system.
#[must_use]
pub fn signed_area(polygon: &[Point]) -> f64 {
    let Some(&last) = polygon.last() else {
        return 0.0;
    };
    let mut prev = last;
    let mut twice = 0.0;
    for &p in polygon {
        twice += prev.to_vec2().cross(p.to_vec2());
        prev = p;
    }
    twice * 0.5
}

/// Axis-aligned bounds of `polygon`, or `None` if it is empty.
#[must_use]
pub fn bounds(polygon: &[Point]) -> Option<Rect> {
    let (&first, rest) = polygon.split_first()?;
    Some(
        rest.iter()
            .fold(Rect::from_points(first, first), |r, &p| r.union_pt(p)),
    )
}

/// Fills a convex polygon with one color, clipped to the target.
///
/// Non-convex input fills its per-row extent. Non-finite vertices are
/// ignored as a whole.
pub fn fill_convex(target: &mut PixelTarget<'_>, polygon: &[Point], xrgb: u32) {
    if polygon.len() < 3 || polygon.iter().any(|p| !p.is_finite()) {
        return;
    }
    let Some(bounds) = bounds(polygon) else {
        return;
    };
    let clip = Rect::new(
        0.0,
        0.0,
        f64::from(target.width()),
        f64::from(target.height()),
    );
    let visible = bounds.intersect(clip);
    if visible.is_zero_area() {
        return;
    }
    let bytes = xrgb.to_le_bytes();
    let first_row = pixel_index(visible.y0 - 0.5, target.height());
    let end_row = pixel_index(visible.y1 - 0.5, target.height());
    for y in first_row..end_row {
        let Some((left, right)) = span(polygon, f64::from(y) + 0.5) else {
            continue;
        };
        let x0 = pixel_index(left - 0.5, target.width());
        let x1 = pixel_index(right - 0.5, target.width());
        if x0 >= x1 {
            continue;
        }
        if let Some(row) = target.row_mut(y) {
            let px = BYTES_PER_PIXEL as usize;
            for chunk in row[x0 as usize * px..x1 as usize * px].chunks_exact_mut(px) {
                chunk.copy_from_slice(&bytes);
            }
        }
    }
}

/// Horizontal extent of `polygon` along the line at height `y`.
fn span(polygon: &[Point], y: f64) -> Option<(f64, f64)> {
    let mut left = f64::INFINITY;
    let mut right = f64::NEG_INFINITY;
    let mut prev = *polygon.last()?;
    for &p in polygon {
        let (a, b) = if prev.y <= p.y { (prev, p) } else { (p, prev) };
        // Half-open in y so a shared vertex is counted once.
        if a.y <= y && y < b.y {
            let x = a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y);
            left = left.min(x);
            right = right.max(x);
        }
        prev = p;
    }
    (left <= right).then_some((left, right))
}

/// First pixel whose center is at or after `edge`, clamped to `0..=limit`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the value is clamped to 0..=limit before the cast"
)]
fn pixel_index(edge: f64, limit: u32) -> u32 {
    edge.ceil().clamp(0.0, f64::from(limit)) as u32
}
