// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph identity and the per-strike glyph record.

use crate::atlas::AtlasLocator;
use crate::geom::Point;

/// Number of sub-pixel positions per axis.
pub const SUBPIXEL_BUCKETS: u8 = 4;

const SUBPIXEL_BITS: u32 = 2;
const SUBPIXEL_MASK: u32 = (1 << SUBPIXEL_BITS) - 1;
const SUBPIXEL_X_SHIFT: u32 = 16;
const SUBPIXEL_Y_SHIFT: u32 = SUBPIXEL_X_SHIFT + SUBPIXEL_BITS;

/// Axis along which glyphs get sub-pixel positions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AxisAlignment {
    /// Both axes are sub-pixel positioned.
    #[default]
    None,
    /// Text runs horizontally; only x is sub-pixel positioned.
    X,
    /// Text runs vertically; only y is sub-pixel positioned.
    Y,
}

impl AxisAlignment {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::X => 1,
            Self::Y => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::None,
            1 => Self::X,
            2 => Self::Y,
            _ => return None,
        })
    }
}

/// A glyph index plus its sub-pixel position class.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackedGlyphId(u32);

impl PackedGlyphId {
    /// A glyph at an integral position.
    #[inline]
    pub const fn new(glyph_id: u16) -> Self {
        Self(glyph_id as u32)
    }

    /// A glyph with explicit sub-pixel buckets (each below [`SUBPIXEL_BUCKETS`]).
    #[inline]
    pub fn with_subpixel(glyph_id: u16, x_bucket: u8, y_bucket: u8) -> Self {
        Self(
            u32::from(glyph_id)
                | ((u32::from(x_bucket) & SUBPIXEL_MASK) << SUBPIXEL_X_SHIFT)
                | ((u32::from(y_bucket) & SUBPIXEL_MASK) << SUBPIXEL_Y_SHIFT),
        )
    }

    /// Pack `glyph_id` with the sub-pixel buckets of `position`, keeping only
    /// the axes `alignment` allows.
    pub fn from_position(glyph_id: u16, position: Point, alignment: AxisAlignment) -> Self {
        let x = match alignment {
            AxisAlignment::None | AxisAlignment::X => subpixel_bucket(position.x),
            AxisAlignment::Y => 0,
        };
        let y = match alignment {
            AxisAlignment::None | AxisAlignment::Y => subpixel_bucket(position.y),
            AxisAlignment::X => 0,
        };
        Self::with_subpixel(glyph_id, x, y)
    }

    /// Rebuild from the raw value.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw value.
    #[inline]
    pub const fn to_bits(self) -> u32 {
        self.0
    }

    /// The glyph index.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the glyph index occupies the low 16 bits"
    )]
    #[inline]
    pub const fn glyph_id(self) -> u16 {
        self.0 as u16
    }

    /// Horizontal sub-pixel bucket.
    #[expect(clippy::cast_possible_truncation, reason = "masked to two bits")]
    #[inline]
    pub const fn x_bucket(self) -> u8 {
        ((self.0 >> SUBPIXEL_X_SHIFT) & SUBPIXEL_MASK) as u8
    }

    /// Vertical sub-pixel bucket.
    #[expect(clippy::cast_possible_truncation, reason = "masked to two bits")]
    #[inline]
    pub const fn y_bucket(self) -> u8 {
        ((self.0 >> SUBPIXEL_Y_SHIFT) & SUBPIXEL_MASK) as u8
    }

    /// The sub-pixel offset the glyph is rendered at.
    #[inline]
    pub fn subpixel_offset(self) -> Point {
        Point::new(
            f32::from(self.x_bucket()) / f32::from(SUBPIXEL_BUCKETS),
            f32::from(self.y_bucket()) / f32::from(SUBPIXEL_BUCKETS),
        )
    }
}

/// Quantize the fractional part of `v` into [`SUBPIXEL_BUCKETS`] buckets by
/// truncation. Callers bias `v` by half a bucket first.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the product lies in [0, SUBPIXEL_BUCKETS)"
)]
#[inline]
fn subpixel_bucket(v: f32) -> u8 {
    let frac = v - v.floor();
    if !frac.is_finite() {
        return 0;
    }
    ((frac * f32::from(SUBPIXEL_BUCKETS)) as u8).min(SUBPIXEL_BUCKETS - 1)
}

/// Pixel format of a glyph mask.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaskFormat {
    /// 8-bit coverage. Distance fields use this format too.
    #[default]
    A8,
    /// 16-bit LCD coverage.
    A565,
    /// Premultiplied color.
    Argb,
}

impl MaskFormat {
    /// Number of distinct formats.
    pub const COUNT: usize = 3;

    /// Bytes per pixel.
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::A8 => 1,
            Self::A565 => 2,
            Self::Argb => 4,
        }
    }

    /// Dense index for per-format tables.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::A8 => 0,
            Self::A565 => 1,
            Self::Argb => 2,
        }
    }

    /// Whether the mask carries its own color.
    #[inline]
    pub fn is_color(self) -> bool {
        self == Self::Argb
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::A8 => 0,
            Self::A565 => 1,
            Self::Argb => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::A8,
            1 => Self::A565,
            2 => Self::Argb,
            _ => return None,
        })
    }
}

/// One glyph of one GPU strike, and where it currently lives in the atlas.
#[derive(Clone, Debug)]
pub struct Glyph {
    /// Identity of the glyph within its strike.
    pub packed_id: PackedGlyphId,
    /// Last known atlas placement. Only meaningful while its plot generation
    /// is still live in the atlas.
    pub atlas_locator: AtlasLocator,
}

impl Glyph {
    /// A glyph that has not been placed yet.
    pub fn new(packed_id: PackedGlyphId) -> Self {
        Self {
            packed_id,
            atlas_locator: AtlasLocator::default(),
        }
    }
}

/// Stable reference to a [`Glyph`] inside a [`StrikeCache`](crate::strike::StrikeCache).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlyphHandle {
    pub(crate) strike: u32,
    pub(crate) glyph: u32,
}
