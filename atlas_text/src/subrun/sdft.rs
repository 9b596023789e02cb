// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Signed distance field glyphs.

use core::ops::Range;
use std::sync::Arc;

use super::AtlasSubRun;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, ErrorKind};
use crate::geom::{IRect, Matrix, Rect};
use crate::glyph::MaskFormat;
use crate::glyph_vector::GlyphVector;
use crate::paint::{Edging, Font, Paint};
use crate::scaler::{DISTANCE_FIELD_INSET, MaskGlyph, ScalerStrike, StrikeResolver};
use crate::sdft::{DistanceFieldFlags, SDFT_FORMAT, SdftMatrixRange};
use crate::strike::StrikeCache;
use crate::vertex::TransformedMaskVertexFiller;

/// Distance field glyphs, reusable for any matrix in their range.
#[derive(Debug)]
pub struct SdftSubRun {
    matrix_range: SdftMatrixRange,
    use_lcd: bool,
    anti_alias: bool,
    filler: TransformedMaskVertexFiller,
    glyphs: GlyphVector,
}

impl SdftSubRun {
    /// Build from glyphs accepted for distance field drawing. `run_font` is
    /// the font of the source run, which decides LCD and antialiasing.
    pub fn new(
        run_font: &Font,
        accepted: &[MaskGlyph],
        strike: Arc<ScalerStrike>,
        strike_to_source: f32,
        matrix_range: SdftMatrixRange,
    ) -> Option<Self> {
        if accepted.is_empty() {
            return None;
        }
        Some(Self {
            matrix_range,
            use_lcd: run_font.edging == Edging::SubpixelAntiAlias,
            anti_alias: run_font.edging != Edging::Alias,
            filler: TransformedMaskVertexFiller::new(
                SDFT_FORMAT,
                DISTANCE_FIELD_INSET,
                strike_to_source,
                accepted,
            ),
            glyphs: GlyphVector::new(strike, accepted.iter().map(|g| g.packed_id)),
        })
    }

    /// The matrices this sub-run can be drawn under.
    pub fn matrix_range(&self) -> SdftMatrixRange {
        self.matrix_range
    }

    /// The quad geometry.
    pub fn filler(&self) -> &TransformedMaskVertexFiller {
        &self.filler
    }

    /// Reusable while the matrix stays in range.
    pub fn can_reuse(&self, _paint: &Paint, position_matrix: &Matrix) -> bool {
        self.matrix_range.matrix_in_range(position_matrix)
    }

    /// Serialize the sub-run, without its tag.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        self.matrix_range.flatten(buffer);
        buffer.write_bool(self.use_lcd);
        buffer.write_bool(self.anti_alias);
        self.filler.flatten(buffer);
        self.glyphs.flatten(buffer);
    }

    /// Read a sub-run written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let matrix_range = SdftMatrixRange::unflatten(buffer)?;
        let use_lcd = buffer.read_bool()?;
        let anti_alias = buffer.read_bool()?;
        let filler = TransformedMaskVertexFiller::unflatten(buffer)?;
        buffer.validate_value(
            filler.format() == SDFT_FORMAT,
            ErrorKind::InvalidMaskFormat,
            u64::from(filler.format().to_u8()),
        )?;
        let glyphs = GlyphVector::unflatten(buffer, resolver)?;
        buffer.validate_value(
            glyphs.len() == filler.glyph_count(),
            ErrorKind::GlyphCountMismatch,
            glyphs.len() as u64,
        )?;
        Ok(Self {
            matrix_range,
            use_lcd,
            anti_alias,
            filler,
            glyphs,
        })
    }
}

impl AtlasSubRun for SdftSubRun {
    fn glyphs(&self) -> &GlyphVector {
        &self.glyphs
    }

    fn glyphs_mut(&mut self) -> &mut GlyphVector {
        &mut self.glyphs
    }

    fn mask_format(&self) -> MaskFormat {
        SDFT_FORMAT
    }

    fn glyph_src_padding(&self) -> u16 {
        // The field carries its own border.
        2
    }

    fn vertex_stride(&self, position_matrix: &Matrix) -> usize {
        self.filler.vertex_stride(position_matrix)
    }

    fn fill_vertex_data(
        &self,
        dst: &mut Vec<u8>,
        glyphs: Range<usize>,
        color: u32,
        position_matrix: &Matrix,
        _clip: Option<&IRect>,
        strikes: &StrikeCache,
    ) {
        let locators: Vec<_> = glyphs
            .clone()
            .map(|i| self.glyphs.atlas_locator(i, strikes))
            .collect();
        self.filler
            .fill_vertex_data(dst, glyphs.start, &locators, color, position_matrix);
    }

    fn device_rect(&self, position_matrix: &Matrix) -> Rect {
        self.filler.device_rect(position_matrix)
    }

    fn distance_field_flags(&self, position_matrix: &Matrix) -> Option<DistanceFieldFlags> {
        Some(DistanceFieldFlags::for_draw(
            position_matrix,
            self.use_lcd,
            self.glyphs.descriptor().pixel_geometry.is_bgr(),
            self.anti_alias,
        ))
    }
}
