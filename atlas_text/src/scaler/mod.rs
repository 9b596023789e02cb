// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The glyph scaler: produces metrics, masks, paths and drawables on demand.
//!
//! Rasterization itself is behind [`GlyphRasterizer`]. [`ScalerStrike`] adds
//! caching and the accept/reject partitioning used during classification,
//! and [`ScalerCache`] shares strikes across threads.

mod descriptor;
mod distance_field;
#[cfg(feature = "vello_cpu")]
mod outline;
mod strike;

use core::fmt::Debug;
use std::sync::Arc;

use crate::canvas::TextCanvas;
use crate::geom::{GlyphRect, Matrix, Point, Rect};
use crate::glyph::{MaskFormat, PackedGlyphId};
use crate::kurbo::BezPath;

pub use descriptor::{
    Blur, CANONICAL_PATH_SIZE, Dash, Frame, RoundingSpec, StrikeDescriptor, StrikeKind,
};
pub use distance_field::{
    DISTANCE_FIELD_INSET, DISTANCE_FIELD_MAGNITUDE, DISTANCE_FIELD_PAD, generate_distance_field,
};
#[cfg(feature = "vello_cpu")]
pub use outline::FontRasterizer;
pub use strike::{
    DIRECT_MASK_MAX_POS, DrawableGlyph, MaskGlyph, PathGlyph, Prepared, ScalerCache, ScalerStrike,
    StrikeResolver,
};

/// Largest glyph side, in pixels, that fits the atlas when drawn directly.
pub const MAX_ATLAS_GLYPH_SIDE: u16 = 256;

/// Largest glyph side that fits the atlas with a one pixel bilerp border.
pub const MAX_BILERP_ATLAS_GLYPH_SIDE: u16 = MAX_ATLAS_GLYPH_SIDE - 2;

/// Measurements of one glyph in one strike.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct GlyphMetrics {
    /// Mask bounds relative to the glyph origin, in strike pixels. Glyphs
    /// larger than `i16` can describe report empty bounds.
    pub bounds: GlyphRect,
    /// Mask format the glyph renders to.
    pub format: MaskFormat,
    /// Whether an outline exists.
    pub has_path: bool,
    /// Whether the glyph draws itself, as layered color glyphs do.
    pub has_drawable: bool,
}

/// A rendered glyph mask, tightly packed rows.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphImage {
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Pixel format.
    pub format: MaskFormat,
    /// `width * height * format.bytes_per_pixel()` bytes.
    pub data: Vec<u8>,
}

impl GlyphImage {
    /// An all-zero image.
    pub fn zeroed(width: u16, height: u16, format: MaskFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0; usize::from(width) * usize::from(height) * format.bytes_per_pixel()],
        }
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        usize::from(self.width) * self.format.bytes_per_pixel()
    }
}

/// A glyph that renders itself with canvas calls.
pub trait GlyphDrawable: Send + Sync + Debug {
    /// Bounds in strike space.
    fn bounds(&self) -> Rect;

    /// Draw into `canvas` with `matrix` mapping strike space to the canvas'
    /// current space.
    fn draw(&self, canvas: &mut dyn TextCanvas, matrix: &Matrix);
}

/// Renders glyphs for strike descriptors.
///
/// Implementations must be deterministic: the same descriptor and glyph must
/// always produce the same result, since masks are regenerated after atlas
/// eviction.
pub trait GlyphRasterizer: Send + Sync + Debug {
    /// Measure a glyph. `id` carries the sub-pixel position.
    fn metrics(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> GlyphMetrics;

    /// Render a glyph mask matching `metrics.bounds`.
    fn image(
        &self,
        desc: &StrikeDescriptor,
        id: PackedGlyphId,
        metrics: &GlyphMetrics,
    ) -> Option<GlyphImage>;

    /// The glyph outline in strike space, y down.
    fn path(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<BezPath>;

    /// The glyph's drawable, if it has one.
    fn drawable(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<Arc<dyn GlyphDrawable>> {
        let _ = (desc, glyph_id);
        None
    }
}

/// The drawing technique a digest is asked about.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActionType {
    /// Device-sized mask in the atlas.
    DirectMask,
    /// Transformed mask in the atlas, with a bilerp border.
    Mask,
    /// Distance field in the atlas.
    Sdft,
    /// Outline drawn by the canvas.
    Path,
    /// Drawable invoked on the canvas.
    Drawable,
}

/// Outcome of asking a digest about a technique.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GlyphAction {
    /// The technique can draw the glyph.
    Accept,
    /// Try a later technique.
    Reject,
    /// Nothing to draw.
    Drop,
}

/// The cached summary of a glyph used during classification.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GlyphDigest {
    /// Glyph identity.
    pub packed_id: PackedGlyphId,
    /// Mask bounds in strike pixels.
    pub bounds: GlyphRect,
    /// Mask format.
    pub format: MaskFormat,
    /// Whether an outline exists.
    pub has_path: bool,
    /// Whether a drawable exists.
    pub has_drawable: bool,
}

impl GlyphDigest {
    /// Summarize `metrics`.
    pub fn new(packed_id: PackedGlyphId, metrics: &GlyphMetrics) -> Self {
        Self {
            packed_id,
            bounds: metrics.bounds,
            format: metrics.format,
            has_path: metrics.has_path,
            has_drawable: metrics.has_drawable,
        }
    }

    /// Whether there is nothing to draw.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty() && !self.has_path && !self.has_drawable
    }

    /// Whether the mask carries color.
    pub fn is_color(&self) -> bool {
        self.format.is_color()
    }

    /// Largest side of the mask.
    pub fn max_dimension(&self) -> u16 {
        self.bounds.max_dimension()
    }

    /// Decide whether `action` can draw this glyph.
    pub fn action_for(&self, action: ActionType) -> GlyphAction {
        if self.is_empty() {
            return GlyphAction::Drop;
        }
        let fits = |limit: u16| !self.bounds.is_empty() && self.max_dimension() <= limit;
        let accept = match action {
            ActionType::DirectMask => fits(MAX_ATLAS_GLYPH_SIDE),
            ActionType::Mask => fits(MAX_BILERP_ATLAS_GLYPH_SIDE),
            ActionType::Sdft => fits(MAX_BILERP_ATLAS_GLYPH_SIDE) && !self.is_color(),
            ActionType::Path => self.has_path && !self.is_color(),
            ActionType::Drawable => self.has_drawable,
        };
        if accept {
            GlyphAction::Accept
        } else {
            GlyphAction::Reject
        }
    }
}

/// A glyph id with its source-space position.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SourceGlyph {
    /// Glyph index.
    pub id: u16,
    /// Position relative to the run list origin.
    pub position: Point,
}
