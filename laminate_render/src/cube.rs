// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rotating cube.

use kurbo::Point;
use laminate_core::device::PixelTarget;
use laminate_core::error::RenderError;
use laminate_core::geometry::SurfaceRect;
use laminate_core::worker::ContentProducer;

use crate::raster::{fill_convex, signed_area};
use crate::transform::Transform3d;

/// Distance from the eye to the cube center.
const CUBE_DISTANCE: f64 = 8.0;
/// Half-width of the frustum at the near plane.
const FRUSTUM_HALF_WIDTH: f64 = 2.8;
const NEAR: f64 = 6.0;
const FAR: f64 = 10.0;
/// Point light, in eye space.
const LIGHT: [f64; 3] = [2.0, 2.0, 20.0];

const BLACK: [f64; 3] = [0.0, 0.0, 0.0];
const RED: [f64; 3] = [1.0, 0.0, 0.0];
const GREEN: [f64; 3] = [0.0, 1.0, 0.0];
const BLUE: [f64; 3] = [0.0, 0.0, 1.0];
const YELLOW: [f64; 3] = [1.0, 1.0, 0.0];
const MAGENTA: [f64; 3] = [1.0, 0.0, 1.0];
const CYAN: [f64; 3] = [0.0, 1.0, 1.0];
const WHITE: [f64; 3] = [1.0, 1.0, 1.0];

struct Face {
    /// Corners in triangle-strip order.
    corners: [[f64; 3]; 4],
    colors: [[f64; 3]; 4],
    normal: [f64; 3],
}

const FACES: [Face; 6] = [
    // front
    Face {
        corners: [
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [-1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
        ],
        colors: [BLUE, MAGENTA, CYAN, WHITE],
        normal: [0.0, 0.0, 1.0],
    },
    // back
    Face {
        corners: [
            [1.0, -1.0, -1.0],
            [-1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
        ],
        colors: [RED, BLACK, YELLOW, GREEN],
        normal: [0.0, 0.0, -1.0],
    },
    // right
    Face {
        corners: [
            [1.0, -1.0, 1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, 1.0],
            [1.0, 1.0, -1.0],
        ],
        colors: [MAGENTA, RED, WHITE, YELLOW],
        normal: [1.0, 0.0, 0.0],
    },
    // left
    Face {
        corners: [
            [-1.0, -1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, 1.0, 1.0],
        ],
        colors: [BLACK, BLUE, GREEN, CYAN],
        normal: [-1.0, 0.0, 0.0],
    },
    // top
    Face {
        corners: [
            [-1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, -1.0],
            [1.0, 1.0, -1.0],
        ],
        colors: [CYAN, WHITE, GREEN, YELLOW],
        normal: [0.0, 1.0, 0.0],
    },
    // bottom
    Face {
        corners: [
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
        ],
        colors: [BLACK, RED, BLUE, MAGENTA],
        normal: [0.0, -1.0, 0.0],
    },
];

/// Strip order `0 1 2 3` walked as a quad outline.
const OUTLINE: [usize; 4] = [0, 1, 3, 2];

/// Draws a flat-shaded cube that rotates a little every frame.
///
/// The background walks each color channel up and down (a triangle wave of
/// period 512 frames) starting from the channels of `seed`, so surfaces
/// with different seeds are easy to tell apart.
#[derive(Clone, Copy, Debug)]
pub struct CubeProducer {
    seed: u32,
}

impl CubeProducer {
    /// Creates a producer whose background starts at `seed`'s RGB bytes.
    #[must_use]
    pub const fn new(seed: u32) -> Self {
        Self { seed }
    }
}

/// Per-surface cube state.
#[derive(Clone, Copy, Debug)]
pub struct CubeState {
    seed: u32,
    frame: u32,
    projection: Transform3d,
}

impl CubeState {
    /// Frames rendered so far.
    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }
}

impl ContentProducer for CubeProducer {
    type State = CubeState;

    fn setup(&self, geometry: SurfaceRect) -> Result<CubeState, RenderError> {
        if geometry.width == 0 || geometry.height == 0 {
            return Err(RenderError::Setup(format!(
                "empty surface {}x{}",
                geometry.width, geometry.height
            )));
        }
        let aspect = f64::from(geometry.height) / f64::from(geometry.width);
        let projection = Transform3d::frustum(
            -FRUSTUM_HALF_WIDTH,
            FRUSTUM_HALF_WIDTH,
            -FRUSTUM_HALF_WIDTH * aspect,
            FRUSTUM_HALF_WIDTH * aspect,
            NEAR,
            FAR,
        );
        Ok(CubeState {
            seed: self.seed,
            frame: 0,
            projection,
        })
    }

    fn render(&self, state: &mut CubeState, target: &mut PixelTarget<'_>) -> Result<(), RenderError> {
        target.fill(background(state.seed, state.frame));

        let modelview = modelview(state.frame);
        if !modelview.is_finite() {
            return Err(RenderError::Render(format!(
                "non-finite modelview at frame {}",
                state.frame
            )));
        }
        let mvp = state.projection * modelview;
        let (width, height) = (f64::from(target.width()), f64::from(target.height()));

        for face in &FACES {
            let Some(ndc) = project(&mvp, face) else {
                continue;
            };
            // Counter-clockwise in NDC faces the viewer.
            if signed_area(&ndc) <= 0.0 {
                continue;
            }
            let screen = ndc.map(|p| Point::new((p.x + 1.0) * 0.5 * width, (1.0 - p.y) * 0.5 * height));
            let shade = diffuse(&modelview, face);
            let [r, g, b] = average(&face.colors);
            fill_convex(target, &screen, pack_rgb(r * shade, g * shade, b * shade));
        }

        state.frame = state.frame.wrapping_add(1);
        Ok(())
    }
}

/// The background color for `frame`.
#[must_use]
fn background(seed: u32, frame: u32) -> u32 {
    let walk = |channel: u32| {
        let v = (channel + frame % 512) % 512;
        if v >= 256 { 511 - v } else { v }
    };
    let r = walk((seed >> 16) & 0xff);
    let g = walk((seed >> 8) & 0xff);
    let b = walk(seed & 0xff);
    (r << 16) | (g << 8) | b
}

fn modelview(frame: u32) -> Transform3d {
    let j = f64::from(frame);
    Transform3d::from_translation(0.0, 0.0, -CUBE_DISTANCE)
        * Transform3d::from_axis_angle([1.0, 0.0, 0.0], 45.0 + 0.25 * j)
        * Transform3d::from_axis_angle([0.0, 1.0, 0.0], 45.0 - 0.5 * j)
        * Transform3d::from_axis_angle([0.0, 0.0, 1.0], 10.0 + 0.15 * j)
}

/// Face outline in normalized device coordinates, or `None` if any corner
/// is behind the eye.
fn project(mvp: &Transform3d, face: &Face) -> Option<[Point; 4]> {
    let mut out = [Point::ZERO; 4];
    for (slot, &corner) in out.iter_mut().zip(&OUTLINE) {
        let [x, y, _, w] = mvp.transform_point(face.corners[corner]);
        if w <= 0.0 {
            return None;
        }
        *slot = Point::new(x / w, y / w);
    }
    Some(out)
}

/// Lambert factor for the face center lit by [`LIGHT`].
fn diffuse(modelview: &Transform3d, face: &Face) -> f64 {
    let normal = normalize(modelview.transform_vector(face.normal));
    let [cx, cy, cz] = average(&face.corners);
    let [px, py, pz, _] = modelview.transform_point([cx, cy, cz]);
    let to_light = normalize([LIGHT[0] - px, LIGHT[1] - py, LIGHT[2] - pz]);
    (normal[0] * to_light[0] + normal[1] * to_light[1] + normal[2] * to_light[2]).max(0.0)
}

fn normalize([x, y, z]: [f64; 3]) -> [f64; 3] {
    let len = (x * x + y * y + z * z).sqrt();
    if len == 0.0 {
        [0.0; 3]
    } else {
        [x / len, y / len, z / len]
    }
}

fn average(values: &[[f64; 3]; 4]) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for v in values {
        for (s, c) in sum.iter_mut().zip(v) {
            *s += c;
        }
    }
    sum.map(|s| s / 4.0)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "each channel is clamped to 0..=255 before the cast"
)]
fn pack_rgb(r: f64, g: f64, b: f64) -> u32 {
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (channel(r) << 16) | (channel(g) << 8) | channel(b)
}
