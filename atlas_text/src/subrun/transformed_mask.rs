// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Masks rasterized at a strike size and mapped through the position matrix.

use core::ops::Range;
use std::sync::Arc;

use super::AtlasSubRun;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, ErrorKind};
use crate::geom::{IRect, Matrix, Rect};
use crate::glyph::MaskFormat;
use crate::glyph_vector::GlyphVector;
use crate::paint::Paint;
use crate::scaler::{MaskGlyph, ScalerStrike, StrikeResolver};
use crate::strike::StrikeCache;
use crate::vertex::TransformedMaskVertexFiller;

/// Masks drawn as transformed quads, bilinearly sampled.
#[derive(Debug)]
pub struct TransformedMaskSubRun {
    initial_position_matrix: Matrix,
    filler: TransformedMaskVertexFiller,
    glyphs: GlyphVector,
}

impl TransformedMaskSubRun {
    /// Build from glyphs of `format` accepted for mask drawing.
    pub fn new(
        position_matrix: &Matrix,
        accepted: &[MaskGlyph],
        strike: Arc<ScalerStrike>,
        strike_to_source: f32,
        format: MaskFormat,
    ) -> Option<Self> {
        if accepted.is_empty() {
            return None;
        }
        Some(Self {
            initial_position_matrix: *position_matrix,
            filler: TransformedMaskVertexFiller::new(format, 0, strike_to_source, accepted),
            glyphs: GlyphVector::new(strike, accepted.iter().map(|g| g.packed_id)),
        })
    }

    /// The quad geometry.
    pub fn filler(&self) -> &TransformedMaskVertexFiller {
        &self.filler
    }

    /// Refuses matrices that would magnify the masks beyond the size they
    /// were rendered for.
    pub fn can_reuse(&self, _paint: &Paint, position_matrix: &Matrix) -> bool {
        let initial = self.initial_position_matrix.max_scale();
        initial >= 1.0 && position_matrix.max_scale() >= initial
    }

    /// Serialize the sub-run, without its tag.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_matrix(&self.initial_position_matrix);
        self.filler.flatten(buffer);
        self.glyphs.flatten(buffer);
    }

    /// Read a sub-run written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let initial_position_matrix = buffer.read_matrix()?;
        let filler = TransformedMaskVertexFiller::unflatten(buffer)?;
        let glyphs = GlyphVector::unflatten(buffer, resolver)?;
        buffer.validate_value(
            glyphs.len() == filler.glyph_count(),
            ErrorKind::GlyphCountMismatch,
            glyphs.len() as u64,
        )?;
        Ok(Self {
            initial_position_matrix,
            filler,
            glyphs,
        })
    }
}

impl AtlasSubRun for TransformedMaskSubRun {
    fn glyphs(&self) -> &GlyphVector {
        &self.glyphs
    }

    fn glyphs_mut(&mut self) -> &mut GlyphVector {
        &mut self.glyphs
    }

    fn mask_format(&self) -> MaskFormat {
        self.filler.format()
    }

    fn glyph_src_padding(&self) -> u16 {
        1
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
}
