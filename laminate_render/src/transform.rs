// Copyright 2026 the Laminate Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal column-major 4×4 transform.
//!
//! Covers what the cube producer needs (translation, axis-angle rotation,
//! perspective frustum, point and vector transformation) without pulling in
//! a full linear-algebra crate.

use core::ops::Mul;

/// A column-major 4×4 transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix, matching the layout of
/// OpenGL-style projection math. Points are column vectors, so `a * b`
/// applies `b` first.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Creates a pure translation transform.
    #[inline]
    #[must_use]
    pub const fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [x, y, z, 1.0],
            ],
        }
    }

    /// Creates a rotation of `degrees` around `axis`.
    ///
    /// The axis is normalized first; a zero axis yields the identity.
    #[must_use]
    pub fn from_axis_angle(axis: [f64; 3], degrees: f64) -> Self {
        let [x, y, z] = axis;
        let len = (x * x + y * y + z * z).sqrt();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        let (x, y, z) = (x / len, y / len, z / len);
        let (s, c) = degrees.to_radians().sin_cos();
        let t = 1.0 - c;
        Self {
            cols: [
                [t * x * x + c, t * x * y + s * z, t * x * z - s * y, 0.0],
                [t * x * y - s * z, t * y * y + c, t * y * z + s * x, 0.0],
                [t * x * z + s * y, t * y * z - s * x, t * z * z + c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a perspective projection for the view volume bounded by
    /// `left`/`right`, `bottom`/`top` on the near plane, looking down -Z.
    ///
    /// Returns the identity if any extent is degenerate.
    #[must_use]
    pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Self {
        let dx = right - left;
        let dy = top - bottom;
        let dz = far - near;
        if dx == 0.0 || dy == 0.0 || dz == 0.0 || near <= 0.0 {
            return Self::IDENTITY;
        }
        Self {
            cols: [
                [2.0 * near / dx, 0.0, 0.0, 0.0],
                [0.0, 2.0 * near / dy, 0.0, 0.0],
                [
                    (right + left) / dx,
                    (top + bottom) / dy,
                    -(far + near) / dz,
                    -1.0,
                ],
                [0.0, 0.0, -2.0 * far * near / dz, 0.0],
            ],
        }
    }

    /// Transforms the point `p` (implicit `w = 1`) into homogeneous
    /// coordinates.
    #[must_use]
    pub fn transform_point(&self, p: [f64; 3]) -> [f64; 4] {
        let c = &self.cols;
        let mut out = [0.0; 4];
        for (i, v) in out.iter_mut().enumerate() {
            *v = c[0][i] * p[0] + c[1][i] * p[1] + c[2][i] * p[2] + c[3][i];
        }
        out
    }

    /// Transforms the direction `v` (implicit `w = 0`); translation is
    /// ignored.
    #[must_use]
    pub fn transform_vector(&self, v: [f64; 3]) -> [f64; 3] {
        let c = &self.cols;
        let mut out = [0.0; 3];
        for (i, o) in out.iter_mut().enumerate() {
            *o = c[0][i] * v[0] + c[1][i] * v[1] + c[2][i] * v[2];
        }
        out
    }

    /// Is every element [finite]?
    ///
    /// [finite]: f64::is_finite
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.cols.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        let mut j = 0;
        while j < 4 {
            let mut i = 0;
            while i < 4 {
                out[j][i] =
                    a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
                i += 1;
            }
            j += 1;
        }
        Self { cols: out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < EPS)
    }

    #[test]
    fn identity_multiply() {
        let t = Transform3d::from_translation(1.0, 2.0, 3.0);
        assert_eq!(Transform3d::IDENTITY * t, t);
        assert_eq!(t * Transform3d::IDENTITY, t);
        assert_eq!(Transform3d::default(), Transform3d::IDENTITY);
    }

    #[test]
    fn translation_moves_points_not_vectors() {
        let t = Transform3d::from_translation(0.0, 0.0, -8.0);
        assert_eq!(t.transform_point([1.0, 1.0, 1.0]), [1.0, 1.0, -7.0, 1.0]);
        assert_eq!(t.transform_vector([1.0, 1.0, 1.0]), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn rotation_z_ninety_degrees() {
        let r = Transform3d::from_axis_angle([0.0, 0.0, 1.0], 90.0);
        let p = r.transform_point([1.0, 0.0, 0.0]);
        assert!(close(&p, &[0.0, 1.0, 0.0, 1.0]), "x axis should map to y: {p:?}");
    }

    #[test]
    fn rotation_x_ninety_degrees() {
        let r = Transform3d::from_axis_angle([1.0, 0.0, 0.0], 90.0);
        let v = r.transform_vector([0.0, 1.0, 0.0]);
        assert!(close(&v, &[0.0, 0.0, 1.0]), "y axis should map to z: {v:?}");
    }

    #[test]
    fn rotation_axis_is_normalized() {
        let a = Transform3d::from_axis_angle([0.0, 3.0, 0.0], 30.0);
        let b = Transform3d::from_axis_angle([0.0, 1.0, 0.0], 30.0);
        for i in 0..4 {
            assert!(close(&a.col(i), &b.col(i)), "column {i} differs");
        }
        assert_eq!(
            Transform3d::from_axis_angle([0.0; 3], 30.0),
            Transform3d::IDENTITY,
            "zero axis should be the identity"
        );
    }

    #[test]
    fn composition_applies_right_operand_first() {
        let t = Transform3d::from_translation(5.0, 0.0, 0.0);
        let r = Transform3d::from_axis_angle([0.0, 0.0, 1.0], 90.0);
        let p = (t * r).transform_point([1.0, 0.0, 0.0]);
        assert!(close(&p, &[5.0, 1.0, 0.0, 1.0]), "rotate then translate: {p:?}");
    }

    #[test]
    fn frustum_maps_near_and_far_planes_to_ndc_bounds() {
        let p = Transform3d::frustum(-2.8, 2.8, -1.575, 1.575, 6.0, 10.0);
        let near = p.transform_point([2.8, 1.575, -6.0]);
        let ndc: Vec<f64> = near[..3].iter().map(|v| v / near[3]).collect();
        assert!(close(&ndc, &[1.0, 1.0, -1.0]), "near corner: {ndc:?}");
        let far = p.transform_point([0.0, 0.0, -10.0]);
        assert!((far[2] / far[3] - 1.0).abs() < EPS, "far plane maps to +1");
    }

    #[test]
    fn degenerate_frustum_is_identity() {
        assert_eq!(
            Transform3d::frustum(1.0, 1.0, -1.0, 1.0, 6.0, 10.0),
            Transform3d::IDENTITY
        );
    }

    #[test]
    fn non_finite_detected() {
        let mut t = Transform3d::IDENTITY;
        assert!(t.is_finite(), "identity is finite");
        t.cols[2][1] = f64::NAN;
        assert!(!t.is_finite(), "NaN is not finite");
    }
}
