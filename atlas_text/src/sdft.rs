// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! When to draw text with signed distance fields, and at which sizes.

use bitflags::bitflags;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, ErrorKind};
use crate::geom::{Matrix, Point, approximate_transformed_text_size};
use crate::glyph::MaskFormat;
use crate::math::FloatExt;
use crate::paint::{Edging, Font, Paint, PaintStyle};
use crate::scaler::MAX_ATLAS_GLYPH_SIDE;

const SMALL_DF_FONT_SIZE: f32 = 32.0;
const SMALL_DF_FONT_LIMIT: f32 = 32.0;
const MEDIUM_DF_FONT_SIZE: f32 = 72.0;
const MEDIUM_DF_FONT_LIMIT: f32 = 72.0;
const LARGE_DF_FONT_SIZE: f32 = 162.0;

/// The position matrices a distance field strike can serve, expressed as
/// the matrix' maximum scale.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SdftMatrixRange {
    min: f32,
    max: f32,
}

impl SdftMatrixRange {
    /// A range of scales, exclusive at `min` and inclusive at `max`.
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Smallest scale, exclusive.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Largest scale, inclusive.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Whether the distance field strike still looks right under `matrix`.
    pub fn matrix_in_range(&self, matrix: &Matrix) -> bool {
        let max_scale = matrix.max_scale();
        self.min < max_scale && max_scale <= self.max
    }

    /// Serialize the range.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_f32(self.min);
        buffer.write_f32(self.max);
    }

    /// Read a range written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>) -> Result<Self, Error> {
        let min = buffer.read_f32()?;
        let max = buffer.read_f32()?;
        buffer.validate(min.is_finite() && max.is_finite(), ErrorKind::InvalidScale)?;
        Ok(Self { min, max })
    }
}

/// Answers the per-run distance field questions.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SdftControl {
    able_to_use_sdft: bool,
    able_to_use_perspective_sdft: bool,
    min_distance_field_font_size: f32,
    max_distance_field_font_size: f32,
}

impl SdftControl {
    /// Create a control for device text sizes in `min..=max`.
    ///
    /// Unless `small_text` is set, text below the large distance field
    /// size stays with masks and `min` is ignored.
    pub fn new(able: bool, small_text: bool, perspective_able: bool, min: f32, max: f32) -> Self {
        Self {
            able_to_use_sdft: able,
            able_to_use_perspective_sdft: perspective_able,
            min_distance_field_font_size: if small_text { min } else { LARGE_DF_FONT_SIZE },
            max_distance_field_font_size: max,
        }
    }

    /// Largest device text size drawn with distance fields.
    pub fn max_size(&self) -> f32 {
        self.max_distance_field_font_size
    }

    /// Whether text of `approximate_device_text_size` drawn with `paint`
    /// under `matrix` should use distance fields.
    pub fn is_sdft(&self, approximate_device_text_size: f32, paint: &Paint, matrix: &Matrix) -> bool {
        let size = approximate_device_text_size;
        self.able_to_use_sdft
            && paint.mask_filter.is_none()
            && matches!(paint.style, PaintStyle::Fill)
            && 0.0 < size
            && (self.able_to_use_perspective_sdft || !matrix.has_perspective())
            && (self.min_distance_field_font_size <= size || matrix.has_perspective())
            && size <= self.max_distance_field_font_size
    }

    /// Whether the text is small enough, and the matrix plain enough, to be
    /// rasterized at device size.
    pub fn is_direct(&self, approximate_device_text_size: f32, paint: &Paint, matrix: &Matrix) -> bool {
        !self.is_sdft(approximate_device_text_size, paint, matrix)
            && !matrix.has_perspective()
            && 0.0 < approximate_device_text_size
            && approximate_device_text_size < f32::from(MAX_ATLAS_GLYPH_SIDE)
    }

    /// The font to rasterize distance fields with, the scale back to
    /// `font`'s size, and the matrices the result can serve.
    ///
    /// Device sizes are bucketed so that one distance field strike covers a
    /// range of scales.
    pub fn sdf_font(&self, font: &Font, matrix: &Matrix, location: Point) -> (Font, f32, SdftMatrixRange) {
        let text_size = font.size;
        let mut scaled = approximate_transformed_text_size(text_size, matrix, location);
        if scaled <= 0.0 || text_size.is_nearly_equal(scaled) {
            scaled = text_size;
        }

        let (floor, ceil, df_size) = if scaled <= SMALL_DF_FONT_LIMIT {
            (
                self.min_distance_field_font_size,
                SMALL_DF_FONT_LIMIT,
                SMALL_DF_FONT_SIZE,
            )
        } else if scaled <= MEDIUM_DF_FONT_LIMIT {
            (SMALL_DF_FONT_LIMIT, MEDIUM_DF_FONT_LIMIT, MEDIUM_DF_FONT_SIZE)
        } else {
            (
                MEDIUM_DF_FONT_LIMIT,
                self.max_distance_field_font_size,
                LARGE_DF_FONT_SIZE,
            )
        };

        let mut df_font = font.with_size(df_size);
        df_font.edging = Edging::AntiAlias;
        df_font.subpixel = false;
        (
            df_font,
            text_size / df_size,
            SdftMatrixRange::new(floor / text_size, ceil / text_size),
        )
    }
}

bitflags! {
    /// Options the distance field shader samples with.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DistanceFieldFlags: u8 {
        /// The matrix is a similarity transform.
        const SIMILARITY = 1 << 0;
        /// The matrix is a scale and translate.
        const SCALE_ONLY = 1 << 1;
        /// Sample per channel for LCD text.
        const USE_LCD = 1 << 2;
        /// The LCD stripes run blue to red.
        const BGR = 1 << 3;
        /// Use binary coverage.
        const ALIASED = 1 << 4;
    }
}

impl DistanceFieldFlags {
    /// Flags for drawing under `matrix`.
    pub fn for_draw(matrix: &Matrix, use_lcd: bool, bgr: bool, anti_alias: bool) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::SIMILARITY, matrix.is_similarity());
        flags.set(Self::SCALE_ONLY, matrix.is_scale_translate());
        flags.set(Self::USE_LCD, use_lcd);
        flags.set(Self::BGR, use_lcd && bgr);
        flags.set(Self::ALIASED, !anti_alias);
        flags
    }
}

/// Distance field glyphs are always stored as 8-bit fields.
pub const SDFT_FORMAT: MaskFormat = MaskFormat::A8;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kurbo::Stroke;
    use crate::paint::{MaskFilter, TypefaceId};

    fn control() -> SdftControl {
        SdftControl::new(true, true, false, 18.0, 324.0)
    }

    #[test]
    fn sdft_needs_plain_fills_in_range() {
        let c = control();
        let paint = Paint::default();
        let m = Matrix::IDENTITY;
        assert!(!c.is_sdft(12.0, &paint, &m), "too small");
        assert!(c.is_sdft(18.0, &paint, &m));
        assert!(c.is_sdft(324.0, &paint, &m));
        assert!(!c.is_sdft(325.0, &paint, &m), "too large");

        let stroked = Paint {
            style: PaintStyle::Stroke(Stroke::new(2.0)),
            ..Paint::default()
        };
        assert!(!c.is_sdft(40.0, &stroked, &m));

        let blurred = Paint {
            mask_filter: Some(MaskFilter::Custom),
            ..Paint::default()
        };
        assert!(!c.is_sdft(40.0, &blurred, &m));
    }

    #[test]
    fn small_text_stays_with_masks_by_default() {
        let c = SdftControl::new(true, false, false, 18.0, 324.0);
        let paint = Paint::default();
        let m = Matrix::IDENTITY;
        assert!(!c.is_sdft(24.0, &paint, &m));
        assert!(!c.is_sdft(161.0, &paint, &m));
        assert!(c.is_sdft(162.0, &paint, &m));
    }

    #[test]
    fn direct_means_small_and_flat() {
        let c = control();
        let paint = Paint::default();
        assert!(c.is_direct(12.0, &paint, &Matrix::IDENTITY));
        assert!(!c.is_direct(40.0, &paint, &Matrix::IDENTITY), "sdft wins");
        assert!(!c.is_direct(0.0, &paint, &Matrix::IDENTITY));
    }

    #[test]
    fn sdf_font_buckets_sizes() {
        let c = control();
        let font = Font::new(TypefaceId(1), 20.0);

        let (df, strike_to_source, range) = c.sdf_font(&font, &Matrix::IDENTITY, Point::ZERO);
        assert_eq!(df.size, 32.0);
        assert_eq!(strike_to_source, 20.0 / 32.0);
        assert_eq!((range.min(), range.max()), (18.0 / 20.0, 32.0 / 20.0));

        let (df, _, range) = c.sdf_font(&font, &Matrix::scale(3.0, 3.0), Point::ZERO);
        assert_eq!(df.size, 72.0);
        assert!(range.matrix_in_range(&Matrix::scale(3.0, 3.0)));
        assert!(!range.matrix_in_range(&Matrix::scale(1.0, 1.0)));

        let (df, _, range) = c.sdf_font(&font, &Matrix::scale(10.0, 10.0), Point::ZERO);
        assert_eq!(df.size, 162.0);
        assert_eq!(range.max(), 324.0 / 20.0);
    }

    #[test]
    fn range_round_trips() {
        let range = SdftMatrixRange::new(0.5, 2.0);
        let mut buffer = WriteBuffer::new();
        range.flatten(&mut buffer);
        let bytes = buffer.into_bytes();
        assert_eq!(SdftMatrixRange::unflatten(&mut ReadBuffer::new(&bytes)).unwrap(), range);
    }
}
