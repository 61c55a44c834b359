// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integer surface geometry.

use crate::output::Output;

/// Placement of a surface on the output, in pixels.
///
/// `x` and `y` are signed so that requests left of or above the output can be
/// expressed and rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl SurfaceRect {
    /// Creates a rectangle.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, widened so it cannot overflow.
    #[inline]
    #[must_use]
    pub const fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    /// Exclusive bottom edge, widened so it cannot overflow.
    #[inline]
    #[must_use]
    pub const fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// Returns `true` when the rectangle is non-empty and lies entirely
    /// within `output`.
    #[must_use]
    pub const fn fits_within(&self, output: &Output) -> bool {
        self.width > 0
            && self.height > 0
            && self.x >= 0
            && self.y >= 0
            && self.right() <= output.width as i64
            && self.bottom() <= output.height as i64
    }

    /// Source rectangle covering the whole surface in 16.16 fixed point, as
    /// plane source coordinates are expressed.
    #[must_use]
    pub const fn source_fixed(&self) -> (u32, u32, u32, u32) {
        (0, 0, self.width << 16, self.height << 16)
    }
}
