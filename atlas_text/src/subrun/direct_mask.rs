// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Masks rasterized at their final device size and position.

use core::ops::Range;
use std::sync::Arc;

use super::{AtlasSubRun, read_mask_format};
use crate::atlas::AtlasLocator;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, ErrorKind};
use crate::geom::{IRect, Matrix, Point, Rect};
use crate::glyph::MaskFormat;
use crate::glyph_vector::GlyphVector;
use crate::paint::Paint;
use crate::scaler::{MaskGlyph, ScalerStrike, StrikeResolver};
use crate::strike::StrikeCache;
use crate::vertex::{
    Argb2DVertex, Argb3DVertex, Mask2DVertex, Mask3DVertex, Vertex2D, Vertex3D, can_use_direct,
    direct_2d, extend_bytes, generalized_direct_2d, transformed_direct_2d, transformed_direct_3d,
    vertex_stride,
};

/// Glyphs whose masks were rendered under the position matrix itself.
///
/// Drawing under a matrix that differs only by a whole pixel translation
/// offsets the stored quads. Any other matrix maps them through the change
/// from the initial matrix, which is what a reused blob falls back to when
/// it is drawn before being rebuilt.
#[derive(Debug)]
pub struct DirectMaskSubRun {
    format: MaskFormat,
    initial_position_matrix: Matrix,
    glyph_device_bounds: Rect,
    left_top: Vec<Point>,
    glyphs: GlyphVector,
    some_glyphs_excluded: bool,
}

impl DirectMaskSubRun {
    /// Build from glyphs accepted for direct drawing under
    /// `position_matrix`. Returns `None` when `accepted` is empty.
    ///
    /// `some_glyphs_excluded` records that the run lost glyphs to the device
    /// position bound, which pins the sub-run to its initial translation.
    pub fn new(
        position_matrix: &Matrix,
        accepted: &[MaskGlyph],
        strike: Arc<ScalerStrike>,
        format: MaskFormat,
        some_glyphs_excluded: bool,
    ) -> Option<Self> {
        if accepted.is_empty() {
            return None;
        }
        let mut glyph_device_bounds = Rect::largest_inverted();
        let mut left_top = Vec::with_capacity(accepted.len());
        for glyph in accepted {
            let bounds = glyph.bounds.to_rect().offset(glyph.position.x, glyph.position.y);
            glyph_device_bounds = glyph_device_bounds.join_possibly_empty(&bounds);
            left_top.push(Point::new(bounds.left, bounds.top));
        }
        Some(Self {
            format,
            initial_position_matrix: *position_matrix,
            glyph_device_bounds,
            left_top,
            glyphs: GlyphVector::new(strike, accepted.iter().map(|g| g.packed_id)),
            some_glyphs_excluded,
        })
    }

    /// The matrix the masks were rendered under.
    pub fn initial_position_matrix(&self) -> &Matrix {
        &self.initial_position_matrix
    }

    /// Union of the glyph rectangles in initial device space.
    pub fn glyph_device_bounds(&self) -> Rect {
        self.glyph_device_bounds
    }

    /// Whether the run lost glyphs to the device position bound.
    pub fn some_glyphs_excluded(&self) -> bool {
        self.some_glyphs_excluded
    }

    /// Reusable under any whole pixel translation of the initial matrix, or
    /// only under no translation at all when glyphs were excluded.
    pub fn can_reuse(&self, _paint: &Paint, position_matrix: &Matrix) -> bool {
        let (compatible, translation) =
            can_use_direct(&self.initial_position_matrix, position_matrix);
        if self.some_glyphs_excluded {
            compatible && translation == Point::ZERO
        } else {
            compatible
        }
    }

    fn view_difference(&self, position_matrix: &Matrix) -> Option<Matrix> {
        let inverse = self.initial_position_matrix.invert()?;
        Some(*position_matrix * inverse)
    }

    fn fill<V2: Vertex2D, V3: Vertex3D>(
        &self,
        dst: &mut Vec<u8>,
        glyphs: &[(AtlasLocator, Point)],
        color: u32,
        position_matrix: &Matrix,
        clip: Option<&IRect>,
    ) {
        let (compatible, translation) =
            can_use_direct(&self.initial_position_matrix, position_matrix);
        if compatible {
            let mut out = Vec::<V2>::new();
            match clip {
                None => direct_2d(&mut out, glyphs, color, translation),
                Some(_) => generalized_direct_2d(&mut out, glyphs, color, translation, clip),
            }
            extend_bytes(dst, &out);
            return;
        }
        let Some(view_difference) = self.view_difference(position_matrix) else {
            // Degenerate quads keep the vertex count the op reserved.
            let stride = self.vertex_stride(position_matrix);
            dst.resize(dst.len() + glyphs.len() * 4 * stride, 0);
            return;
        };
        if view_difference.has_perspective() {
            let mut out = Vec::<V3>::new();
            transformed_direct_3d(&mut out, glyphs, color, &view_difference);
            extend_bytes(dst, &out);
        } else {
            let mut out = Vec::<V2>::new();
            transformed_direct_2d(&mut out, glyphs, color, &view_difference);
            extend_bytes(dst, &out);
        }
    }

    /// Serialize the sub-run, without its tag.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_u8(self.format.to_u8());
        buffer.write_matrix(&self.initial_position_matrix);
        buffer.write_bool(self.some_glyphs_excluded);
        buffer.write_rect(&self.glyph_device_bounds);
        buffer.write_count(self.left_top.len());
        for point in &self.left_top {
            buffer.write_point(*point);
        }
        self.glyphs.flatten(buffer);
    }

    /// Read a sub-run written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let format = read_mask_format(buffer)?;
        let initial_position_matrix = buffer.read_matrix()?;
        let some_glyphs_excluded = buffer.read_bool()?;
        let glyph_device_bounds = buffer.read_rect()?;
        let count = buffer.check_glyph_count(8)?;
        let mut left_top = Vec::with_capacity(count);
        for _ in 0..count {
            left_top.push(buffer.read_point()?);
        }
        let glyphs = GlyphVector::unflatten(buffer, resolver)?;
        buffer.validate_value(
            glyphs.len() == count,
            ErrorKind::GlyphCountMismatch,
            glyphs.len() as u64,
        )?;
        Ok(Self {
            format,
            initial_position_matrix,
            glyph_device_bounds,
            left_top,
            glyphs,
            some_glyphs_excluded,
        })
    }
}

impl AtlasSubRun for DirectMaskSubRun {
    fn glyphs(&self) -> &GlyphVector {
        &self.glyphs
    }

    fn glyphs_mut(&mut self) -> &mut GlyphVector {
        &mut self.glyphs
    }

    fn mask_format(&self) -> MaskFormat {
        self.format
    }

    fn glyph_src_padding(&self) -> u16 {
        0
    }

    fn vertex_stride(&self, position_matrix: &Matrix) -> usize {
        vertex_stride(self.format, position_matrix.has_perspective())
    }

    fn fill_vertex_data(
        &self,
        dst: &mut Vec<u8>,
        glyphs: Range<usize>,
        color: u32,
        position_matrix: &Matrix,
        clip: Option<&IRect>,
        strikes: &StrikeCache,
    ) {
        let end = glyphs.end.min(self.left_top.len());
        let begin = glyphs.start.min(end);
        let quads: Vec<_> = (begin..end)
            .map(|i| (self.glyphs.atlas_locator(i, strikes), self.left_top[i]))
            .collect();
        if self.format.is_color() {
            self.fill::<Argb2DVertex, Argb3DVertex>(dst, &quads, color, position_matrix, clip);
        } else {
            self.fill::<Mask2DVertex, Mask3DVertex>(dst, &quads, color, position_matrix, clip);
        }
    }

    fn device_rect(&self, position_matrix: &Matrix) -> Rect {
        let (compatible, translation) =
            can_use_direct(&self.initial_position_matrix, position_matrix);
        if compatible {
            return self.glyph_device_bounds.offset(translation.x, translation.y);
        }
        match self.view_difference(position_matrix) {
            Some(view_difference) => view_difference.map_rect(&self.glyph_device_bounds),
            None => {
                log::warn!("position matrix of a direct mask run is not invertible; skipping it");
                Rect::EMPTY
            }
        }
    }
}
