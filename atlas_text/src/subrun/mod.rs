// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sub-runs: batches of glyphs drawn with a single technique.
//!
//! There are exactly five kinds. Three of them keep their glyphs in an atlas
//! and are drawn by generating quads ([`AtlasSubRun`]):
//!
//! - [`DirectMaskSubRun`]: masks rasterized at their final device size and
//!   position, redrawn for free under whole pixel translations.
//! - [`TransformedMaskSubRun`]: masks rasterized at some strike size and
//!   mapped through the full position matrix.
//! - [`SdftSubRun`]: signed distance fields, valid over a range of scales.
//!
//! The other two draw through a [`TextCanvas`]:
//!
//! - [`PathSubRun`]: glyph outlines.
//! - [`DrawableSubRun`]: glyphs that draw themselves.
//!
//! Every kind can be flattened into a [`WriteBuffer`] behind a one byte tag
//! and read back with [`SubRun::unflatten`].

mod direct_mask;
mod drawable;
mod path;
mod sdft;
#[cfg(test)]
pub(crate) mod testing;
mod transformed_mask;

use core::fmt::Debug;
use core::ops::Range;

pub use direct_mask::DirectMaskSubRun;
pub use drawable::DrawableSubRun;
pub use path::PathSubRun;
pub use sdft::SdftSubRun;
pub use transformed_mask::TransformedMaskSubRun;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::canvas::TextCanvas;
use crate::error::{Error, ErrorKind};
use crate::geom::{IRect, Matrix, Point, Rect};
use crate::glyph::MaskFormat;
use crate::glyph_vector::{AtlasContext, GlyphVector, RegenerateResult};
use crate::paint::Paint;
use crate::scaler::StrikeResolver;
use crate::sdft::DistanceFieldFlags;
use crate::strike::StrikeCache;

/// The serialized kind of a sub-run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SubRunType {
    /// Never written; reading it is an error.
    Bad = 0,
    /// [`DirectMaskSubRun`].
    DirectMask = 1,
    /// [`SdftSubRun`].
    Sdft = 2,
    /// [`TransformedMaskSubRun`].
    TransformedMask = 3,
    /// [`PathSubRun`].
    Path = 4,
    /// [`DrawableSubRun`].
    Drawable = 5,
}

impl SubRunType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::DirectMask,
            2 => Self::Sdft,
            3 => Self::TransformedMask,
            4 => Self::Path,
            5 => Self::Drawable,
            _ => return None,
        })
    }
}

/// A sub-run whose glyphs live in an atlas and are drawn as quads.
pub trait AtlasSubRun: Debug {
    /// The glyphs.
    fn glyphs(&self) -> &GlyphVector;

    /// The glyphs, mutably.
    fn glyphs_mut(&mut self) -> &mut GlyphVector;

    /// Mask format of every glyph.
    fn mask_format(&self) -> MaskFormat;

    /// Padding glyph images are uploaded with.
    fn glyph_src_padding(&self) -> u16;

    /// Bytes per vertex when drawn under `position_matrix`.
    fn vertex_stride(&self, position_matrix: &Matrix) -> usize;

    /// Append four vertices per glyph in `glyphs` to `dst`.
    ///
    /// Atlas locations are read from `strikes`, so the range must have been
    /// regenerated first.
    fn fill_vertex_data(
        &self,
        dst: &mut Vec<u8>,
        glyphs: Range<usize>,
        color: u32,
        position_matrix: &Matrix,
        clip: Option<&IRect>,
        strikes: &StrikeCache,
    );

    /// Device bounds under `position_matrix`.
    ///
    /// [`fill_vertex_data`](Self::fill_vertex_data) already writes device
    /// space positions, so no matrix is left for the backend to apply. An
    /// empty rectangle means nothing can be drawn.
    fn device_rect(&self, position_matrix: &Matrix) -> Rect;

    /// Sampling options for distance field sub-runs.
    fn distance_field_flags(&self, position_matrix: &Matrix) -> Option<DistanceFieldFlags> {
        let _ = position_matrix;
        None
    }

    /// Number of glyphs.
    fn glyph_count(&self) -> usize {
        self.glyphs().len()
    }

    /// Make glyphs `begin..end` resident in the atlas.
    fn regenerate_atlas(
        &mut self,
        begin: usize,
        end: usize,
        ctx: &mut AtlasContext<'_>,
    ) -> RegenerateResult {
        let format = self.mask_format();
        let padding = self.glyph_src_padding();
        self.glyphs_mut()
            .regenerate_atlas(begin, end, format, padding, ctx)
    }
}

/// One batch of glyphs and the technique that draws them.
#[derive(Debug)]
pub enum SubRun {
    /// Device-sized atlas masks.
    DirectMask(DirectMaskSubRun),
    /// Atlas masks mapped through the position matrix.
    TransformedMask(TransformedMaskSubRun),
    /// Atlas distance fields.
    Sdft(SdftSubRun),
    /// Outlines.
    Path(PathSubRun),
    /// Self-drawing glyphs.
    Drawable(DrawableSubRun),
}

impl SubRun {
    /// The serialized kind.
    pub fn kind(&self) -> SubRunType {
        match self {
            Self::DirectMask(_) => SubRunType::DirectMask,
            Self::TransformedMask(_) => SubRunType::TransformedMask,
            Self::Sdft(_) => SubRunType::Sdft,
            Self::Path(_) => SubRunType::Path,
            Self::Drawable(_) => SubRunType::Drawable,
        }
    }

    /// Number of glyphs.
    pub fn glyph_count(&self) -> usize {
        match self {
            Self::DirectMask(run) => run.glyph_count(),
            Self::TransformedMask(run) => run.glyph_count(),
            Self::Sdft(run) => run.glyph_count(),
            Self::Path(run) => run.glyph_count(),
            Self::Drawable(run) => run.glyph_count(),
        }
    }

    /// Whether this sub-run, built for an earlier draw, still draws
    /// correctly with `paint` under `position_matrix`.
    pub fn can_reuse(&self, paint: &Paint, position_matrix: &Matrix) -> bool {
        match self {
            Self::DirectMask(run) => run.can_reuse(paint, position_matrix),
            Self::TransformedMask(run) => run.can_reuse(paint, position_matrix),
            Self::Sdft(run) => run.can_reuse(paint, position_matrix),
            Self::Path(_) | Self::Drawable(_) => true,
        }
    }

    /// The quad-drawing interface, for atlas sub-runs.
    pub fn as_atlas(&self) -> Option<&dyn AtlasSubRun> {
        match self {
            Self::DirectMask(run) => Some(run),
            Self::TransformedMask(run) => Some(run),
            Self::Sdft(run) => Some(run),
            Self::Path(_) | Self::Drawable(_) => None,
        }
    }

    /// Mutable [`as_atlas`](Self::as_atlas).
    pub fn as_atlas_mut(&mut self) -> Option<&mut dyn AtlasSubRun> {
        match self {
            Self::DirectMask(run) => Some(run),
            Self::TransformedMask(run) => Some(run),
            Self::Sdft(run) => Some(run),
            Self::Path(_) | Self::Drawable(_) => None,
        }
    }

    /// Draw path and drawable sub-runs into `canvas`, with glyph positions
    /// relative to `draw_origin`.
    ///
    /// Atlas sub-runs are drawn by an [`AtlasTextOp`](crate::op::AtlasTextOp)
    /// instead and ignore this call.
    pub fn draw(&self, canvas: &mut dyn TextCanvas, draw_origin: Point, paint: &Paint) {
        match self {
            Self::Path(run) => run.draw(canvas, draw_origin, paint),
            Self::Drawable(run) => run.draw(canvas, draw_origin, paint),
            Self::DirectMask(_) | Self::TransformedMask(_) | Self::Sdft(_) => {}
        }
    }

    /// Write the tag and the sub-run.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_u8(self.kind() as u8);
        match self {
            Self::DirectMask(run) => run.flatten(buffer),
            Self::TransformedMask(run) => run.flatten(buffer),
            Self::Sdft(run) => run.flatten(buffer),
            Self::Path(run) => run.flatten(buffer),
            Self::Drawable(run) => run.flatten(buffer),
        }
    }

    /// Read a sub-run written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let tag = buffer.read_u8()?;
        let kind = SubRunType::from_u8(tag);
        buffer.validate_value(kind.is_some(), ErrorKind::InvalidTag, u64::from(tag))?;
        Ok(match kind {
            Some(SubRunType::DirectMask) => {
                Self::DirectMask(DirectMaskSubRun::unflatten(buffer, resolver)?)
            }
            Some(SubRunType::TransformedMask) => {
                Self::TransformedMask(TransformedMaskSubRun::unflatten(buffer, resolver)?)
            }
            Some(SubRunType::Sdft) => Self::Sdft(SdftSubRun::unflatten(buffer, resolver)?),
            Some(SubRunType::Path) => Self::Path(PathSubRun::unflatten(buffer, resolver)?),
            Some(SubRunType::Drawable) => {
                Self::Drawable(DrawableSubRun::unflatten(buffer, resolver)?)
            }
            Some(SubRunType::Bad) | None => {
                return Err(Error::with_value(ErrorKind::InvalidTag, buffer.offset(), u64::from(tag)));
            }
        })
    }
}

/// Read a mask format byte.
fn read_mask_format(buffer: &mut ReadBuffer<'_>) -> Result<MaskFormat, Error> {
    let raw = buffer.read_u8()?;
    let format = MaskFormat::from_u8(raw);
    buffer.validate_value(format.is_some(), ErrorKind::InvalidMaskFormat, u64::from(raw))?;
    format.ok_or_else(|| Error::with_value(ErrorKind::InvalidMaskFormat, buffer.offset(), u64::from(raw)))
}

/// Read a positive, finite strike to source scale.
fn read_strike_to_source(buffer: &mut ReadBuffer<'_>) -> Result<f32, Error> {
    let scale = buffer.read_f32()?;
    buffer.validate(scale.is_finite() && scale > 0.0, ErrorKind::InvalidScale)?;
    Ok(scale)
}
