// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geometry primitives for quad generation.
//!
//! Vertex data is produced in `f32` and atlas coordinates in `i16`/`u16`, so the
//! text pipeline carries its own point, rectangle and matrix types rather than
//! going through `kurbo`'s `f64` ones. Conversions exist where paths and the
//! canvas are involved.

use core::ops::{Add, Mul, Sub};

use crate::kurbo::{self, Affine, BezPath, PathEl};
use crate::math::{FloatExt, SCALAR_NEARLY_ZERO};

/// A point (or vector) in `f32` space.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate.
    pub y: f32,
}

impl Point {
    /// The origin.
    pub const ZERO: Self = Self::new(0.0, 0.0);

    /// Create a new point.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Whether both coordinates are finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Component-wise floor.
    #[inline]
    pub fn floor(self) -> Self {
        Self::new(self.x.floor(), self.y.floor())
    }

    /// Convert to a `kurbo` point.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::Point {
        kurbo::Point::new(f64::from(self.x), f64::from(self.y))
    }
}

impl Add for Point {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// An `f32` rectangle stored as left, top, right, bottom.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Right edge.
    pub right: f32,
    /// Bottom edge.
    pub bottom: f32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const EMPTY: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Create a rectangle from its edges.
    #[inline]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from an origin and a size.
    #[inline]
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// A rectangle that any union will replace.
    #[inline]
    pub const fn largest_inverted() -> Self {
        Self::new(f32::MAX, f32::MAX, -f32::MAX, -f32::MAX)
    }

    /// Width of the rectangle.
    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    /// Height of the rectangle.
    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// True if the rectangle encloses no area (or contains NaN).
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    /// Center point.
    #[inline]
    pub fn center(&self) -> Point {
        Point::new(
            self.left * 0.5 + self.right * 0.5,
            self.top * 0.5 + self.bottom * 0.5,
        )
    }

    /// Union that also accepts empty rectangles (used to accumulate bounds).
    #[inline]
    pub fn join_possibly_empty(&self, other: &Self) -> Self {
        Self::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Union of two rectangles, ignoring empty ones.
    pub fn union(&self, other: &Self) -> Self {
        if other.is_empty() {
            *self
        } else if self.is_empty() {
            *other
        } else {
            self.join_possibly_empty(other)
        }
    }

    /// Whether the two rectangles overlap.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.left.max(other.left) < self.right.min(other.right)
            && self.top.max(other.top) < self.bottom.min(other.bottom)
    }

    /// Translate the rectangle.
    #[inline]
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Shrink the rectangle by `dx`/`dy` on each side.
    #[inline]
    pub fn inset(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right - dx,
            self.bottom - dy,
        )
    }

    /// Bounds of a set of points, or [`Rect::EMPTY`] if there are none.
    pub fn from_points(points: impl IntoIterator<Item = Point>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::EMPTY;
        };
        iter.fold(Self::new(first.x, first.y, first.x, first.y), |r, p| {
            Self::new(
                r.left.min(p.x),
                r.top.min(p.y),
                r.right.max(p.x),
                r.bottom.max(p.y),
            )
        })
    }

    /// Whether all edges are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    /// Convert to a `kurbo` rectangle.
    #[inline]
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.left),
            f64::from(self.top),
            f64::from(self.right),
            f64::from(self.bottom),
        )
    }
}

/// An integer rectangle, used for device clips and device glyph bounds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct IRect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Right edge.
    pub right: i32,
    /// Bottom edge.
    pub bottom: i32,
}

impl IRect {
    /// Create a rectangle from its edges.
    #[inline]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// True if the rectangle encloses no area.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Width of the rectangle.
    #[inline]
    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    /// Height of the rectangle.
    #[inline]
    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// The overlap of two rectangles, if any.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let r = Self::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Whether `other` lies inside `self`. Neither rectangle is checked for emptiness.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Convert to an `f32` rectangle.
    #[expect(
        clippy::cast_precision_loss,
        reason = "device coordinates are well within f32's exact integer range"
    )]
    #[inline]
    pub fn to_rect(self) -> Rect {
        Rect::new(
            self.left as f32,
            self.top as f32,
            self.right as f32,
            self.bottom as f32,
        )
    }

    /// Smallest integer rectangle containing `rect`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "saturating float to int conversion is intended"
    )]
    pub fn round_out(rect: &Rect) -> Self {
        Self::new(
            rect.left.floor() as i32,
            rect.top.floor() as i32,
            rect.right.ceil() as i32,
            rect.bottom.ceil() as i32,
        )
    }
}

/// Glyph bounds in strike space.
///
/// Bounds are relative to the glyph origin and limited to `i16`, which is all
/// the scaler produces and all the atlas can address.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlyphRect {
    /// Left edge.
    pub left: i16,
    /// Top edge.
    pub top: i16,
    /// Right edge.
    pub right: i16,
    /// Bottom edge.
    pub bottom: i16,
}

impl GlyphRect {
    /// An empty rectangle.
    pub const EMPTY: Self = Self::new(0, 0, 0, 0);

    /// Create glyph bounds from edges.
    #[inline]
    pub const fn new(left: i16, top: i16, right: i16, bottom: i16) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// True when the glyph has no pixels.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Width in pixels.
    #[inline]
    pub fn width(self) -> u16 {
        u16::try_from((i32::from(self.right) - i32::from(self.left)).max(0)).unwrap_or(u16::MAX)
    }

    /// Height in pixels.
    #[inline]
    pub fn height(self) -> u16 {
        u16::try_from((i32::from(self.bottom) - i32::from(self.top)).max(0)).unwrap_or(u16::MAX)
    }

    /// The larger of width and height.
    #[inline]
    pub fn max_dimension(self) -> u16 {
        self.width().max(self.height())
    }

    /// Shrink by `d` on every side.
    #[inline]
    pub fn inset(self, d: i16) -> Self {
        Self::new(
            self.left.saturating_add(d),
            self.top.saturating_add(d),
            self.right.saturating_sub(d),
            self.bottom.saturating_sub(d),
        )
    }

    /// Grow by `d` on every side.
    #[inline]
    pub fn outset(self, d: i16) -> Self {
        self.inset(-d)
    }

    /// The bounds as an `f32` rectangle.
    #[inline]
    pub fn to_rect(self) -> Rect {
        Rect::new(
            f32::from(self.left),
            f32::from(self.top),
            f32::from(self.right),
            f32::from(self.bottom),
        )
    }

    /// Device bounds when the glyph origin sits at the integer position `(x, y)`.
    #[inline]
    pub fn offset_to_irect(self, x: i32, y: i32) -> IRect {
        IRect::new(
            i32::from(self.left) + x,
            i32::from(self.top) + y,
            i32::from(self.right) + x,
            i32::from(self.bottom) + y,
        )
    }
}

/// Matrix element indices, row major.
const SCALE_X: usize = 0;
const SKEW_X: usize = 1;
const TRANS_X: usize = 2;
const SKEW_Y: usize = 3;
const SCALE_Y: usize = 4;
const TRANS_Y: usize = 5;
const PERSP_0: usize = 6;
const PERSP_1: usize = 7;
const PERSP_2: usize = 8;

/// A 3x3 transform with optional perspective.
///
/// Points map as `x' = (sx·x + kx·y + tx) / w`, `y' = (ky·x + sy·y + ty) / w`
/// with `w = p0·x + p1·y + p2`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Matrix {
    m: [f32; 9],
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    /// The identity transform.
    pub const IDENTITY: Self = Self::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Create a matrix from its nine row-major elements.
    #[inline]
    pub const fn from_row_major(m: [f32; 9]) -> Self {
        Self { m }
    }

    /// The nine row-major elements.
    #[inline]
    pub const fn as_row_major(&self) -> [f32; 9] {
        self.m
    }

    /// A translation.
    #[inline]
    pub const fn translate(dx: f32, dy: f32) -> Self {
        Self::from_row_major([1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0])
    }

    /// A scale about the origin.
    #[inline]
    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self::from_row_major([sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0])
    }

    /// Convert from a `kurbo` affine transform.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "vertex data is f32; the narrowing is intended"
    )]
    pub fn from_affine(affine: Affine) -> Self {
        let [a, b, c, d, e, f] = affine.as_coeffs();
        Self::from_row_major([
            a as f32, c as f32, e as f32, b as f32, d as f32, f as f32, 0.0, 0.0, 1.0,
        ])
    }

    /// Convert to a `kurbo` affine transform. Returns `None` for perspective matrices.
    pub fn to_affine(&self) -> Option<Affine> {
        if self.has_perspective() {
            return None;
        }
        let m = self.m.map(f64::from);
        Some(Affine::new([
            m[SCALE_X], m[SKEW_Y], m[SKEW_X], m[SCALE_Y], m[TRANS_X], m[TRANS_Y],
        ]))
    }

    /// Horizontal scale.
    #[inline]
    pub fn scale_x(&self) -> f32 {
        self.m[SCALE_X]
    }

    /// Vertical scale.
    #[inline]
    pub fn scale_y(&self) -> f32 {
        self.m[SCALE_Y]
    }

    /// Horizontal skew.
    #[inline]
    pub fn skew_x(&self) -> f32 {
        self.m[SKEW_X]
    }

    /// Vertical skew.
    #[inline]
    pub fn skew_y(&self) -> f32 {
        self.m[SKEW_Y]
    }

    /// Horizontal translation.
    #[inline]
    pub fn translate_x(&self) -> f32 {
        self.m[TRANS_X]
    }

    /// Vertical translation.
    #[inline]
    pub fn translate_y(&self) -> f32 {
        self.m[TRANS_Y]
    }

    /// Replace the translation.
    #[inline]
    pub fn set_translate(&mut self, dx: f32, dy: f32) {
        self.m[TRANS_X] = dx;
        self.m[TRANS_Y] = dy;
    }

    /// Whether the bottom row differs from `[0, 0, 1]`.
    #[inline]
    pub fn has_perspective(&self) -> bool {
        self.m[PERSP_0] != 0.0 || self.m[PERSP_1] != 0.0 || self.m[PERSP_2] != 1.0
    }

    /// Whether the matrix only scales and translates.
    #[inline]
    pub fn is_scale_translate(&self) -> bool {
        !self.has_perspective() && self.m[SKEW_X] == 0.0 && self.m[SKEW_Y] == 0.0
    }

    /// Whether the matrix preserves angles (uniform scale, rotation, translation).
    pub fn is_similarity(&self) -> bool {
        if self.has_perspective() {
            return false;
        }
        let (mx, sx, sy, my) = (
            self.m[SCALE_X],
            self.m[SKEW_X],
            self.m[SKEW_Y],
            self.m[SCALE_Y],
        );
        if sx == 0.0 && sy == 0.0 {
            return mx.abs().is_nearly_equal(my.abs());
        }
        // Rows must be perpendicular and of equal length.
        let perpendicular = (mx * sx + sy * my).is_nearly_zero();
        let same_length = (mx * mx + sy * sy).is_nearly_equal(sx * sx + my * my);
        perpendicular && same_length
    }

    /// True if the 2x2 linear parts are bit-identical.
    #[inline]
    pub fn linear_eq(&self, other: &Self) -> bool {
        self.m[SCALE_X] == other.m[SCALE_X]
            && self.m[SKEW_X] == other.m[SKEW_X]
            && self.m[SKEW_Y] == other.m[SKEW_Y]
            && self.m[SCALE_Y] == other.m[SCALE_Y]
    }

    /// `a * b`: apply `b` first, then `a`.
    pub fn concat(a: &Self, b: &Self) -> Self {
        if !a.has_perspective() && !b.has_perspective() {
            let (a, b) = (&a.m, &b.m);
            return Self::from_row_major([
                a[0] * b[0] + a[1] * b[3],
                a[0] * b[1] + a[1] * b[4],
                a[0] * b[2] + a[1] * b[5] + a[2],
                a[3] * b[0] + a[4] * b[3],
                a[3] * b[1] + a[4] * b[4],
                a[3] * b[2] + a[4] * b[5] + a[5],
                0.0,
                0.0,
                1.0,
            ]);
        }
        let mut out = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = a.m[row * 3] * b.m[col]
                    + a.m[row * 3 + 1] * b.m[3 + col]
                    + a.m[row * 3 + 2] * b.m[6 + col];
            }
        }
        Self::from_row_major(out)
    }

    /// Translate before applying `self`.
    #[inline]
    pub fn pre_translate(&self, dx: f32, dy: f32) -> Self {
        Self::concat(self, &Self::translate(dx, dy))
    }

    /// Translate after applying `self`.
    pub fn post_translate(&self, dx: f32, dy: f32) -> Self {
        if !self.has_perspective() {
            let mut m = *self;
            m.m[TRANS_X] += dx;
            m.m[TRANS_Y] += dy;
            return m;
        }
        Self::concat(&Self::translate(dx, dy), self)
    }

    /// Scale before applying `self`.
    #[inline]
    pub fn pre_scale(&self, sx: f32, sy: f32) -> Self {
        Self::concat(self, &Self::scale(sx, sy))
    }

    /// Scale after applying `self`.
    #[inline]
    pub fn post_scale(&self, sx: f32, sy: f32) -> Self {
        Self::concat(&Self::scale(sx, sy), self)
    }

    /// Map a point, dividing by `w` for perspective matrices.
    #[inline]
    pub fn map_xy(&self, x: f32, y: f32) -> Point {
        let m = &self.m;
        let px = m[SCALE_X] * x + m[SKEW_X] * y + m[TRANS_X];
        let py = m[SKEW_Y] * x + m[SCALE_Y] * y + m[TRANS_Y];
        if !self.has_perspective() {
            return Point::new(px, py);
        }
        let mut z = m[PERSP_0] * x + m[PERSP_1] * y + m[PERSP_2];
        if z != 0.0 {
            z = 1.0 / z;
        }
        Point::new(px * z, py * z)
    }

    /// Map a point.
    #[inline]
    pub fn map_point(&self, p: Point) -> Point {
        self.map_xy(p.x, p.y)
    }

    /// Map `(x, y, 1)` without the perspective divide.
    #[inline]
    pub fn map_homogeneous(&self, x: f32, y: f32) -> [f32; 3] {
        let m = &self.m;
        [
            m[SCALE_X] * x + m[SKEW_X] * y + m[TRANS_X],
            m[SKEW_Y] * x + m[SCALE_Y] * y + m[TRANS_Y],
            m[PERSP_0] * x + m[PERSP_1] * y + m[PERSP_2],
        ]
    }

    /// Where the origin lands.
    #[inline]
    pub fn map_origin(&self) -> Point {
        self.map_xy(0.0, 0.0)
    }

    /// Bounds of the four mapped corners of `rect`.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        Rect::from_points([
            self.map_xy(rect.left, rect.top),
            self.map_xy(rect.right, rect.top),
            self.map_xy(rect.left, rect.bottom),
            self.map_xy(rect.right, rect.bottom),
        ])
    }

    /// The inverse transform, or `None` if the matrix is (nearly) singular.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the determinant is computed in f64 and narrowed back"
    )]
    pub fn invert(&self) -> Option<Self> {
        let m = &self.m;
        if self.is_scale_translate() {
            if m[SCALE_X] == 0.0 || m[SCALE_Y] == 0.0 {
                return None;
            }
            let inv_x = 1.0 / m[SCALE_X];
            let inv_y = 1.0 / m[SCALE_Y];
            let inverse = Self::from_row_major([
                inv_x,
                0.0,
                -m[TRANS_X] * inv_x,
                0.0,
                inv_y,
                -m[TRANS_Y] * inv_y,
                0.0,
                0.0,
                1.0,
            ]);
            return inverse.m.iter().all(|v| v.is_finite()).then_some(inverse);
        }

        let d = m.map(f64::from);
        let det = d[0] * (d[4] * d[8] - d[5] * d[7]) - d[1] * (d[3] * d[8] - d[5] * d[6])
            + d[2] * (d[3] * d[7] - d[4] * d[6]);
        let tolerance = f64::from(SCALAR_NEARLY_ZERO).powi(3);
        if !det.is_finite() || det.abs() <= tolerance {
            return None;
        }
        let inv_det = 1.0 / det;
        let adjugate = [
            d[4] * d[8] - d[5] * d[7],
            d[2] * d[7] - d[1] * d[8],
            d[1] * d[5] - d[2] * d[4],
            d[5] * d[6] - d[3] * d[8],
            d[0] * d[8] - d[2] * d[6],
            d[2] * d[3] - d[0] * d[5],
            d[3] * d[7] - d[4] * d[6],
            d[1] * d[6] - d[0] * d[7],
            d[0] * d[4] - d[1] * d[3],
        ];
        let mut out = adjugate.map(|v| (v * inv_det) as f32);
        if !self.has_perspective() {
            out[PERSP_0] = 0.0;
            out[PERSP_1] = 0.0;
            out[PERSP_2] = 1.0;
        }
        out.iter()
            .all(|v| v.is_finite())
            .then_some(Self::from_row_major(out))
    }

    /// The largest factor by which the matrix stretches a unit vector.
    ///
    /// Returns `-1.0` for perspective matrices or non-finite results.
    pub fn max_scale(&self) -> f32 {
        if self.has_perspective() {
            return -1.0;
        }
        let m = &self.m;
        if m[SKEW_X] == 0.0 && m[SKEW_Y] == 0.0 {
            return m[SCALE_X].abs().max(m[SCALE_Y].abs());
        }
        // Singular values of the 2x2 part: eigenvalues of [a b; b c] = AᵀA.
        let a = m[SCALE_X] * m[SCALE_X] + m[SKEW_Y] * m[SKEW_Y];
        let b = m[SCALE_X] * m[SKEW_X] + m[SCALE_Y] * m[SKEW_Y];
        let c = m[SKEW_X] * m[SKEW_X] + m[SCALE_Y] * m[SCALE_Y];
        let b_sqd = b * b;
        let largest = if b_sqd <= SCALAR_NEARLY_ZERO * SCALAR_NEARLY_ZERO {
            a.max(c)
        } else {
            let a_minus_c = a - c;
            (a + c) * 0.5 + (a_minus_c * a_minus_c + 4.0 * b_sqd).sqrt() * 0.5
        };
        if !largest.is_finite() {
            return -1.0;
        }
        largest.max(0.0).sqrt()
    }

    /// Transform every control point of `path`.
    pub fn transform_path(&self, path: &BezPath) -> BezPath {
        if let Some(affine) = self.to_affine() {
            return affine * path;
        }
        let map = |p: kurbo::Point| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "path coordinates are mapped in f32 like vertex data"
            )]
            let mapped = self.map_xy(p.x as f32, p.y as f32);
            mapped.to_kurbo()
        };
        path.elements()
            .iter()
            .map(|el| match *el {
                PathEl::MoveTo(p) => PathEl::MoveTo(map(p)),
                PathEl::LineTo(p) => PathEl::LineTo(map(p)),
                PathEl::QuadTo(p1, p2) => PathEl::QuadTo(map(p1), map(p2)),
                PathEl::CurveTo(p1, p2, p3) => PathEl::CurveTo(map(p1), map(p2), map(p3)),
                PathEl::ClosePath => PathEl::ClosePath,
            })
            .collect()
    }

    /// Local area scale factor of the projection at `p`.
    ///
    /// This is `|det J|` for the Jacobian of the projected mapping, which is
    /// `|det J'| / w³` with `J'` built from the mapped point and the first two
    /// columns of the matrix. Returns infinity once `w` approaches zero.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the determinant is computed in f64 and narrowed back"
    )]
    pub fn differential_area_scale(&self, p: Point) -> f32 {
        let [x, y, w] = self.map_homogeneous(p.x, p.y);
        if w < SCALAR_NEARLY_ZERO {
            return f32::INFINITY;
        }
        let m = &self.m;
        let j = [
            x,
            y,
            w,
            m[SCALE_X],
            m[SKEW_Y],
            m[PERSP_0],
            m[SKEW_X],
            m[SCALE_Y],
            m[PERSP_1],
        ]
        .map(f64::from);
        let det = j[0] * (j[4] * j[8] - j[5] * j[7]) - j[1] * (j[3] * j[8] - j[5] * j[6])
            + j[2] * (j[3] * j[7] - j[4] * j[6]);
        let denom = 1.0 / f64::from(w);
        (det * denom * denom * denom).abs() as f32
    }
}

/// Estimate the device size of text drawn with `size` under `matrix` near `location`.
///
/// Perspective matrices use the local area scale. Returns `-size` when that
/// scale is unusable.
pub fn approximate_transformed_text_size(size: f32, matrix: &Matrix, location: Point) -> f32 {
    if !matrix.has_perspective() {
        return size * matrix.max_scale();
    }
    let max_scale_sqd = matrix.differential_area_scale(location);
    if max_scale_sqd.is_finite() && !max_scale_sqd.is_nearly_zero() {
        size * max_scale_sqd.sqrt()
    } else {
        -size
    }
}

impl Mul for Matrix {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self::concat(&self, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translation_maps_points() {
        let m = Matrix::translate(3.0, -2.0);
        assert_eq!(m.map_xy(1.0, 1.0), Point::new(4.0, -1.0));
        assert_eq!(m.map_origin(), Point::new(3.0, -2.0));
    }

    #[test]
    fn concat_applies_right_first() {
        let m = Matrix::translate(10.0, 0.0) * Matrix::scale(2.0, 2.0);
        assert_eq!(m.map_xy(1.0, 1.0), Point::new(12.0, 2.0));
        assert_eq!(
            Matrix::scale(2.0, 2.0).post_translate(10.0, 0.0),
            m,
            "post_translate matches left multiplication"
        );
        assert_eq!(
            Matrix::translate(5.0, 5.0).pre_translate(1.0, 2.0),
            Matrix::translate(6.0, 7.0)
        );
    }

    #[test]
    fn invert_round_trips() {
        let m = Matrix::from_row_major([2.0, 0.5, 3.0, -0.25, 1.5, -7.0, 0.0, 0.0, 1.0]);
        let inv = m.invert().unwrap();
        let p = (m * inv).map_xy(13.0, -4.0);
        assert!((p.x - 13.0).abs() < 1e-4, "x was {}", p.x);
        assert!((p.y + 4.0).abs() < 1e-4, "y was {}", p.y);
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        assert!(Matrix::scale(0.0, 1.0).invert().is_none());
        let m = Matrix::from_row_major([1.0, 2.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 1.0]);
        assert!(m.invert().is_none());
    }

    #[test]
    fn max_scale_of_rotation_is_one() {
        let (s, c) = (0.6_f32, 0.8_f32);
        let rotation = Matrix::from_row_major([c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0]);
        assert!((rotation.max_scale() - 1.0).abs() < 1e-5);
        assert_eq!(Matrix::scale(-3.0, 2.0).max_scale(), 3.0);
        let persp = Matrix::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.001, 0.0, 1.0]);
        assert_eq!(persp.max_scale(), -1.0);
    }

    #[test]
    fn differential_area_scale_of_affine_is_determinant() {
        let m = Matrix::scale(2.0, 3.0);
        assert!((m.differential_area_scale(Point::new(5.0, 5.0)) - 6.0).abs() < 1e-5);
        assert_eq!(
            Matrix::IDENTITY.differential_area_scale(Point::new(100.0, -3.0)),
            1.0
        );
    }

    #[test]
    fn approximate_text_size_follows_max_scale() {
        let size = approximate_transformed_text_size(12.0, &Matrix::scale(2.0, 3.0), Point::ZERO);
        assert_eq!(size, 36.0);
    }

    #[test]
    fn similarity_detection() {
        assert!(Matrix::scale(2.0, 2.0).is_similarity());
        assert!(!Matrix::scale(2.0, 1.0).is_similarity());
        let (s, c) = (0.6_f32, 0.8_f32);
        let rotation = Matrix::from_row_major([2.0 * c, -2.0 * s, 0.0, 2.0 * s, 2.0 * c, 0.0, 0.0, 0.0, 1.0]);
        assert!(rotation.is_similarity());
    }

    #[test]
    fn glyph_rect_dimensions() {
        let r = GlyphRect::new(-2, -10, 8, 3);
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 13);
        assert_eq!(r.max_dimension(), 13);
        assert_eq!(r.inset(2), GlyphRect::new(0, -8, 6, 1));
        assert_eq!(r.offset_to_irect(5, 5), IRect::new(3, -5, 13, 8));
    }

    #[test]
    fn irect_intersection() {
        let a = IRect::new(0, 0, 10, 10);
        assert_eq!(a.intersect(&IRect::new(5, 5, 20, 20)), Some(IRect::new(5, 5, 10, 10)));
        assert_eq!(a.intersect(&IRect::new(10, 0, 20, 10)), None);
        assert!(a.contains(&IRect::new(1, 1, 9, 9)));
    }
}
