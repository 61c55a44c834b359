// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! YUV 4:2:0 tile pattern.
//!
//! The pattern is produced per 2×2 block: one RGB value is converted to a
//! shared luma/chroma sample (BT.601 coefficients), exactly as a 4:2:0
//! video frame would carry it, then converted back to XRGB for scan-out.

use laminate_core::device::PixelTarget;
use laminate_core::error::RenderError;
use laminate_core::geometry::SurfaceRect;
use laminate_core::worker::ContentProducer;

const KR: f64 = 0.299;
const KG: f64 = 0.587;
const KB: f64 = 0.114;
const U_SCALE: f64 = 0.565;
const V_SCALE: f64 = 0.713;

/// One 4:2:0 sample: full-resolution luma with the block's chroma.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Yuv {
    /// Luma.
    pub y: u8,
    /// Blue-difference chroma, biased by 128.
    pub u: u8,
    /// Red-difference chroma, biased by 128.
    pub v: u8,
}

/// The tile color at block origin `(i, j)` for scroll offset `n` in a
/// surface `width` pixels wide, as `0x00RRGGBB`.
///
/// Returns 0 for a zero width.
#[must_use]
pub fn tile_rgb(n: u32, i: u32, j: u32, width: u32) -> u32 {
    let Some(quot) = n.wrapping_add(i).wrapping_add(j).checked_div(width) else {
        return 0;
    };
    let rem = n.wrapping_add(i).wrapping_add(j) % width;
    0x0013_0502_u32
        .wrapping_mul(quot >> 6)
        .wrapping_add(0x000a_1120_u32.wrapping_mul(rem >> 6))
}

/// Converts `0x??RRGGBB` to a 4:2:0 sample.
#[must_use]
pub fn rgb_to_yuv(rgb: u32) -> Yuv {
    let [b, g, r, _] = rgb.to_le_bytes();
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let y = (KR * r + KG * g + KB * b).trunc();
    Yuv {
        y: to_byte(y),
        u: to_byte((b - y) * U_SCALE + 128.0),
        v: to_byte((r - y) * V_SCALE + 128.0),
    }
}

/// Converts a 4:2:0 sample back to `0x00RRGGBB`.
#[must_use]
pub fn yuv_to_xrgb(yuv: Yuv) -> u32 {
    let y = f64::from(yuv.y);
    let r = y + (f64::from(yuv.v) - 128.0) / V_SCALE;
    let b = y + (f64::from(yuv.u) - 128.0) / U_SCALE;
    let g = (y - KR * r - KB * b) / KG;
    (u32::from(to_byte(r.round())) << 16)
        | (u32::from(to_byte(g.round())) << 8)
        | u32::from(to_byte(b.round()))
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the value is clamped to 0..=255 before the cast"
)]
fn to_byte(v: f64) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

/// Fills a surface with the scrolling tile pattern.
#[derive(Clone, Copy, Debug)]
pub struct YuvTileProducer {
    step: u32,
}

impl YuvTileProducer {
    /// Scroll offset added per frame by [`Default`].
    pub const DEFAULT_STEP: u32 = 4;

    /// Creates a producer that advances the pattern by `step` each frame.
    #[must_use]
    pub const fn new(step: u32) -> Self {
        Self { step }
    }
}

impl Default for YuvTileProducer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STEP)
    }
}

/// Per-surface tile state.
#[derive(Clone, Copy, Debug, Default)]
pub struct YuvTileState {
    offset: u32,
}

impl YuvTileState {
    /// Current scroll offset.
    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }
}

impl ContentProducer for YuvTileProducer {
    type State = YuvTileState;

    fn setup(&self, _geometry: SurfaceRect) -> Result<YuvTileState, RenderError> {
        Ok(YuvTileState::default())
    }

    fn render(
        &self,
        state: &mut YuvTileState,
        target: &mut PixelTarget<'_>,
    ) -> Result<(), RenderError> {
        let width = target.width();
        for j in (0..target.height()).step_by(2) {
            for i in (0..width).step_by(2) {
                let xrgb = yuv_to_xrgb(rgb_to_yuv(tile_rgb(state.offset, i, j, width)));
                target.put_pixel(i, j, xrgb);
                target.put_pixel(i + 1, j, xrgb);
                target.put_pixel(i, j + 1, xrgb);
                target.put_pixel(i + 1, j + 1, xrgb);
            }
        }
        state.offset = state.offset.wrapping_add(self.step);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_pattern_matches_block_formula() {
        assert_eq!(tile_rgb(0, 0, 0, 960), 0);
        assert_eq!(tile_rgb(0, 64, 0, 960), 0x000a_1120, "one remainder step");
        assert_eq!(tile_rgb(0, 0, 960 * 64, 960), 0x0013_0502, "one quotient step");
        assert_eq!(
            tile_rgb(64, 0, 0, 960),
            tile_rgb(0, 64, 0, 960),
            "offset scrolls along the diagonal"
        );
        assert_eq!(tile_rgb(5, 0, 0, 0), 0, "zero width is tolerated");
    }

    fn assert_close(expected: u32, actual: u32, tolerance: i32) {
        for shift in [0, 8, 16] {
            let a = i32::try_from((expected >> shift) & 0xff).unwrap();
            let b = i32::try_from((actual >> shift) & 0xff).unwrap();
            assert!(
                (a - b).abs() <= tolerance,
                "channel at bit {shift}: {a} vs {b} ({expected:06x} vs {actual:06x})"
            );
        }
    }

    #[test]
    fn luma_uses_bt601_weights() {
        assert_eq!(rgb_to_yuv(0), Yuv { y: 0, u: 128, v: 128 });
        assert_eq!(rgb_to_yuv(0x00ff_0000).y, 76, "0.299 * 255 truncated");
        assert_eq!(rgb_to_yuv(0x0000_ff00).y, 149, "0.587 * 255 truncated");
        let white = rgb_to_yuv(0x00ff_ffff);
        assert!(white.y >= 254, "white is full luma: {white:?}");
        assert_eq!((white.u, white.v), (128, 128), "white carries no chroma");
    }

    #[test]
    fn grays_survive_the_round_trip() {
        for level in [0_u32, 17, 128, 200, 255] {
            let gray = level * 0x0001_0101;
            assert_close(gray, yuv_to_xrgb(rgb_to_yuv(gray)), 1);
        }
    }

    #[test]
    fn colors_survive_the_round_trip_approximately() {
        assert_close(0x0040_80c0, yuv_to_xrgb(rgb_to_yuv(0x0040_80c0)), 3);
    }

    #[test]
    fn blocks_are_uniform_and_pattern_scrolls() {
        let producer = YuvTileProducer::new(64);
        let mut state = producer.setup(SurfaceRect::new(0, 0, 256, 4)).unwrap();
        let mut mem = vec![0_u8; 256 * 4 * 4];
        let mut target = PixelTarget::new(&mut mem, 256, 4, 256 * 4).unwrap();
        producer.render(&mut state, &mut target).unwrap();
        assert_eq!(target.pixel(64, 0), target.pixel(65, 1), "2x2 block shares a color");
        let before = target.pixel(0, 0);
        assert_eq!(state.offset(), 64);
        producer.render(&mut state, &mut target).unwrap();
        assert_ne!(target.pixel(0, 0), before, "pattern moved by one tile");
    }
}
