// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shaped glyph runs, the input to classification.

use crate::geom::{Point, Rect};
use crate::paint::Font;

/// Glyphs that share one font, positioned relative to their list's origin.
#[derive(Clone, Debug)]
pub struct GlyphRun {
    /// The font every glyph is drawn with.
    pub font: Font,
    /// Glyph indices.
    pub glyph_ids: Vec<u16>,
    /// One position per glyph.
    pub positions: Vec<Point>,
}

impl GlyphRun {
    /// Create a run. Extra ids or positions beyond the shorter list are ignored.
    pub fn new(font: Font, glyph_ids: Vec<u16>, positions: Vec<Point>) -> Self {
        let n = glyph_ids.len().min(positions.len());
        let mut glyph_ids = glyph_ids;
        let mut positions = positions;
        glyph_ids.truncate(n);
        positions.truncate(n);
        Self {
            font,
            glyph_ids,
            positions,
        }
    }

    /// Number of glyphs.
    pub fn len(&self) -> usize {
        self.glyph_ids.len()
    }

    /// Whether the run has no glyphs.
    pub fn is_empty(&self) -> bool {
        self.glyph_ids.is_empty()
    }

    /// Glyph ids paired with positions.
    pub fn glyphs(&self) -> impl Iterator<Item = (u16, Point)> + '_ {
        self.glyph_ids.iter().copied().zip(self.positions.iter().copied())
    }

    /// Conservative bounds of the run: positions outset by the em box.
    pub fn conservative_bounds(&self) -> Rect {
        let finite = self.positions.iter().copied().filter(|p| p.is_finite());
        let bounds = Rect::from_points(finite);
        if self.is_empty() {
            return Rect::EMPTY;
        }
        let font = &self.font;
        let reach = font.size * font.scale_x.abs().max(1.0) * (1.0 + font.skew_x.abs());
        Rect::new(
            bounds.left - reach,
            bounds.top - reach,
            bounds.right + reach,
            bounds.bottom + reach,
        )
    }
}

/// A set of runs drawn together, the unit of caching.
#[derive(Clone, Debug)]
pub struct GlyphRunList {
    runs: Vec<GlyphRun>,
    origin: Point,
    source_bounds: Rect,
    unique_id: u32,
    can_cache: bool,
}

impl GlyphRunList {
    /// Create a list drawn at `origin`. `unique_id` identifies the text content
    /// for the blob cache.
    pub fn new(unique_id: u32, origin: Point, runs: Vec<GlyphRun>) -> Self {
        let source_bounds = runs
            .iter()
            .map(GlyphRun::conservative_bounds)
            .fold(Rect::EMPTY, |acc, r| acc.union(&r));
        Self {
            runs,
            origin,
            source_bounds,
            unique_id,
            can_cache: true,
        }
    }

    /// Forbid caching of the built blob.
    pub fn with_can_cache(mut self, can_cache: bool) -> Self {
        self.can_cache = can_cache;
        self
    }

    /// The runs.
    pub fn runs(&self) -> &[GlyphRun] {
        &self.runs
    }

    /// Where the list is drawn.
    pub fn origin(&self) -> Point {
        self.origin
    }

    /// Conservative bounds of all runs relative to the origin.
    pub fn source_bounds(&self) -> Rect {
        self.source_bounds
    }

    /// Content identifier.
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Whether a built blob may be cached.
    pub fn can_cache(&self) -> bool {
        self.can_cache
    }

    /// Total glyphs over all runs.
    pub fn glyph_count(&self) -> usize {
        self.runs.iter().map(GlyphRun::len).sum()
    }
}
