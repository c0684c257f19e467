//! 3x3 transform matrix
//!
//! Row-major affine matrix with an optional perspective row. Element layout:
//!
//! ```text
//! | scale_x  skew_x   trans_x |
//! | skew_y   scale_y  trans_y |
//! | persp_0  persp_1  persp_2 |
//! ```
//!
//! `a.concat(&b)` is the matrix product `a * b`: mapping a point through the
//! result applies `b` first, then `a`.

use crate::geometry::{Point, Rect};
use serde::{Deserialize, Serialize};

const SCALE_X: usize = 0;
const SKEW_X: usize = 1;
const TRANS_X: usize = 2;
const SKEW_Y: usize = 3;
const SCALE_Y: usize = 4;
const TRANS_Y: usize = 5;
const PERSP_0: usize = 6;
const PERSP_1: usize = 7;
const PERSP_2: usize = 8;

const NEARLY_ZERO: f32 = 1.0 / (1 << 12) as f32;

/// 2D transform with a perspective row
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Matrix3 {
    pub elements: [f32; 9],
}

impl Default for Matrix3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix3 {
    pub const IDENTITY: Matrix3 = Matrix3 {
        elements: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    };

    /// Affine matrix from its six significant elements
    pub const fn affine(
        scale_x: f32,
        skew_x: f32,
        trans_x: f32,
        skew_y: f32,
        scale_y: f32,
        trans_y: f32,
    ) -> Self {
        Self {
            elements: [
                scale_x, skew_x, trans_x, skew_y, scale_y, trans_y, 0.0, 0.0, 1.0,
            ],
        }
    }

    pub const fn translate(dx: f32, dy: f32) -> Self {
        Self::affine(1.0, 0.0, dx, 0.0, 1.0, dy)
    }

    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self::affine(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn rotate(radians: f32) -> Self {
        let (sin, cos) = radians.sin_cos();
        Self::affine(cos, -sin, 0.0, sin, cos, 0.0)
    }

    /// Rotation about a pivot point
    pub fn rotate_about(radians: f32, px: f32, py: f32) -> Self {
        Self::translate(px, py)
            .concat(&Self::rotate(radians))
            .concat(&Self::translate(-px, -py))
    }

    pub const fn skew(kx: f32, ky: f32) -> Self {
        Self::affine(1.0, kx, 0.0, ky, 1.0, 0.0)
    }

    pub fn scale_x(&self) -> f32 {
        self.elements[SCALE_X]
    }

    pub fn scale_y(&self) -> f32 {
        self.elements[SCALE_Y]
    }

    pub fn skew_x(&self) -> f32 {
        self.elements[SKEW_X]
    }

    pub fn skew_y(&self) -> f32 {
        self.elements[SKEW_Y]
    }

    pub fn trans_x(&self) -> f32 {
        self.elements[TRANS_X]
    }

    pub fn trans_y(&self) -> f32 {
        self.elements[TRANS_Y]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn has_perspective(&self) -> bool {
        self.elements[PERSP_0] != 0.0 || self.elements[PERSP_1] != 0.0 || self.elements[PERSP_2] != 1.0
    }

    /// Pure translation (or identity)
    pub fn is_translate(&self) -> bool {
        !self.has_perspective()
            && self.elements[SCALE_X] == 1.0
            && self.elements[SCALE_Y] == 1.0
            && self.elements[SKEW_X] == 0.0
            && self.elements[SKEW_Y] == 0.0
    }

    /// Whether axis-aligned rects map to axis-aligned rects
    ///
    /// True for scale/translate and for 90° rotations, provided neither
    /// axis collapses to zero.
    pub fn rect_stays_rect(&self) -> bool {
        if self.has_perspective() {
            return false;
        }
        let [sx, kx, _, ky, sy, _, _, _, _] = self.elements;
        if kx == 0.0 && ky == 0.0 {
            sx != 0.0 && sy != 0.0
        } else {
            sx == 0.0 && sy == 0.0 && kx != 0.0 && ky != 0.0
        }
    }

    /// Matrix product `self * other` (apply `other` first)
    pub fn concat(&self, other: &Matrix3) -> Matrix3 {
        let a = &self.elements;
        let b = &other.elements;
        let mut out = [0.0f32; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a[row * 3] * b[col]
                    + a[row * 3 + 1] * b[3 + col]
                    + a[row * 3 + 2] * b[6 + col];
            }
        }
        Matrix3 { elements: out }
    }

    /// `self = self * other`: `other` applies before the existing transform
    pub fn pre_concat(&mut self, other: &Matrix3) {
        *self = self.concat(other);
    }

    /// `self = other * self`: `other` applies after the existing transform
    pub fn post_concat(&mut self, other: &Matrix3) {
        *self = other.concat(self);
    }

    pub fn pre_translate(&mut self, dx: f32, dy: f32) {
        self.pre_concat(&Matrix3::translate(dx, dy));
    }

    pub fn post_translate(&mut self, dx: f32, dy: f32) {
        self.post_concat(&Matrix3::translate(dx, dy));
    }

    pub fn pre_scale(&mut self, sx: f32, sy: f32) {
        self.pre_concat(&Matrix3::scale(sx, sy));
    }

    pub fn determinant(&self) -> f32 {
        let m = &self.elements;
        m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6])
    }

    /// Inverse, or `None` for a singular matrix
    pub fn invert(&self) -> Option<Matrix3> {
        if self.is_translate() {
            return Some(Matrix3::translate(-self.trans_x(), -self.trans_y()));
        }

        let det = self.determinant();
        if det.abs() <= NEARLY_ZERO * NEARLY_ZERO * NEARLY_ZERO || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let m = &self.elements;
        let mut out = [
            m[4] * m[8] - m[5] * m[7],
            m[2] * m[7] - m[1] * m[8],
            m[1] * m[5] - m[2] * m[4],
            m[5] * m[6] - m[3] * m[8],
            m[0] * m[8] - m[2] * m[6],
            m[2] * m[3] - m[0] * m[5],
            m[3] * m[7] - m[4] * m[6],
            m[1] * m[6] - m[0] * m[7],
            m[0] * m[4] - m[1] * m[3],
        ];
        for value in &mut out {
            *value *= inv_det;
        }
        Some(Matrix3 { elements: out })
    }

    pub fn map_point(&self, p: Point) -> Point {
        let m = &self.elements;
        let x = m[SCALE_X] * p.x + m[SKEW_X] * p.y + m[TRANS_X];
        let y = m[SKEW_Y] * p.x + m[SCALE_Y] * p.y + m[TRANS_Y];
        if !self.has_perspective() {
            return Point::new(x, y);
        }
        let w = m[PERSP_0] * p.x + m[PERSP_1] * p.y + m[PERSP_2];
        let w = if w != 0.0 { 1.0 / w } else { 0.0 };
        Point::new(x * w, y * w)
    }

    /// Bounding box of the mapped rect corners
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        if self.is_translate() {
            return rect.offset(self.trans_x(), self.trans_y());
        }
        let corners = rect.corners().map(|p| self.map_point(p));
        Rect::bounding(&corners).unwrap_or(Rect::ZERO)
    }

    /// Uniform scale factor of the transform
    ///
    /// Axis lengths are measured separately; when one of them is exactly
    /// 1 the other wins, otherwise their geometric mean is returned.
    /// Perspective terms are ignored.
    pub fn scale_factor(&self) -> f32 {
        if self.is_identity() {
            return 1.0;
        }
        let scale_x = if self.skew_y() == 0.0 {
            self.scale_x().abs()
        } else {
            self.scale_x().hypot(self.skew_y())
        };
        let scale_y = if self.skew_x() == 0.0 {
            self.scale_y().abs()
        } else {
            self.skew_x().hypot(self.scale_y())
        };

        if scale_x == 1.0 {
            return scale_y;
        }
        if scale_y == 1.0 {
            return scale_x;
        }
        (scale_x * scale_y).sqrt()
    }

    /// Row-major rows padded to `vec4` for GPU uniform upload
    pub fn to_padded_rows(&self) -> [[f32; 4]; 3] {
        let m = &self.elements;
        [
            [m[0], m[1], m[2], 0.0],
            [m[3], m[4], m[5], 0.0],
            [m[6], m[7], m[8], 0.0],
        ]
    }
}
