// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Turning atlas sub-runs into recorded draws.
//!
//! [`AtlasTextOp::prepare`] walks a sub-run's glyphs: it makes a range
//! resident in the atlas, writes vertices for it, and records a
//! [`GlyphDraw`] whenever the atlas fills up or a draw reaches its quad
//! limit. A full atlas is not an error; the glyphs already written are
//! recorded, the target is flushed if that is not enough, and the walk
//! resumes where it stopped.

use crate::atlas::{AtlasManager, DrawToken, PendingUpload, TokenTracker};
use crate::geom::{IRect, Matrix, Rect};
use crate::glyph::MaskFormat;
use crate::glyph_vector::AtlasContext;
use crate::sdft::DistanceFieldFlags;
use crate::strike::StrikeCache;
use crate::subrun::AtlasSubRun;

/// One recorded draw of atlas glyphs.
#[derive(Clone, Debug)]
pub struct GlyphDraw {
    /// Token of the draw; atlas plots it samples stay resident until it is
    /// flushed.
    pub token: DrawToken,
    /// Atlas the quads sample.
    pub mask_format: MaskFormat,
    /// Number of active pages of that atlas.
    pub page_count: usize,
    /// Shader options for distance field glyphs.
    pub distance_field_flags: Option<DistanceFieldFlags>,
    /// Bytes per vertex.
    pub vertex_stride: usize,
    /// Number of quads, four vertices each.
    pub quad_count: usize,
    /// The vertices. Positions are already in device space.
    pub vertices: Vec<u8>,
    /// Texture updates that must land before the draw.
    pub uploads: Vec<PendingUpload>,
    /// Device bounds of the whole sub-run.
    pub device_bounds: Rect,
}

/// Receives recorded draws.
pub trait MeshDrawTarget {
    /// Take ownership of a draw.
    fn record_draw(&mut self, draw: GlyphDraw);

    /// Execute every recorded draw. Called before atlas plots they sample
    /// are reused.
    fn flush(&mut self) {}
}

/// Collects draws in a list.
#[derive(Clone, Debug, Default)]
pub struct GlyphDrawList {
    /// Draws recorded since the last flush.
    pub draws: Vec<GlyphDraw>,
    /// Draws that were flushed.
    pub flushed: Vec<GlyphDraw>,
    /// Number of flushes.
    pub flush_count: usize,
}

impl GlyphDrawList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every draw, flushed or not, in order.
    pub fn all_draws(&self) -> impl Iterator<Item = &GlyphDraw> {
        self.flushed.iter().chain(&self.draws)
    }
}

impl MeshDrawTarget for GlyphDrawList {
    fn record_draw(&mut self, draw: GlyphDraw) {
        self.draws.push(draw);
    }

    fn flush(&mut self) {
        self.flushed.append(&mut self.draws);
        self.flush_count += 1;
    }
}

/// The mutable state draws are prepared against.
#[derive(Debug)]
pub struct DrawResources<'a, T: MeshDrawTarget + ?Sized> {
    /// Glyph records.
    pub strikes: &'a mut StrikeCache,
    /// The atlases.
    pub atlas: &'a mut AtlasManager,
    /// Draw and flush tokens.
    pub tokens: &'a mut TokenTracker,
    /// Where draws go.
    pub target: &'a mut T,
}

impl<T: MeshDrawTarget + ?Sized> DrawResources<'_, T> {
    /// Flush the target, then release the atlas plots its draws held.
    pub fn flush(&mut self) {
        self.target.flush();
        self.tokens.flush();
        self.atlas.post_flush(self.tokens.next_flush_token());
        log::debug!("flushed draws up to token {}", self.tokens.next_flush_token().get());
    }
}

/// Draw parameters shared by every sub-run of one text draw.
#[derive(Clone, Debug)]
pub struct AtlasTextOp {
    position_matrix: Matrix,
    color: u32,
    clip: Option<IRect>,
    max_quads_per_draw: usize,
}

impl AtlasTextOp {
    /// Prepare draws under `position_matrix` with the packed vertex `color`,
    /// clipped to `clip` where the sub-run supports it.
    pub fn new(position_matrix: Matrix, color: u32, clip: Option<IRect>, max_quads_per_draw: usize) -> Self {
        Self {
            position_matrix,
            color,
            clip,
            max_quads_per_draw: max_quads_per_draw.max(1),
        }
    }

    /// Record draws for every glyph of `sub_run`, returning how many draws
    /// were recorded.
    ///
    /// Sub-runs whose matrix cannot be used, such as a singular one, record
    /// nothing. If the atlas still has no room after a flush, the remaining
    /// glyphs are skipped.
    pub fn prepare<T: MeshDrawTarget + ?Sized>(
        &self,
        sub_run: &mut dyn AtlasSubRun,
        resources: &mut DrawResources<'_, T>,
    ) -> usize {
        let m = &self.position_matrix;
        let device_bounds = sub_run.device_rect(m);
        if device_bounds.is_empty() {
            log::debug!("skipping a sub-run with empty device bounds");
            return 0;
        }
        let mut batch = Batch {
            mask_format: sub_run.mask_format(),
            distance_field_flags: sub_run.distance_field_flags(m),
            vertex_stride: sub_run.vertex_stride(m),
            device_bounds,
            vertices: Vec::new(),
            quad_count: 0,
            draws: 0,
        };

        let end = sub_run.glyph_count();
        let mut cursor = 0;
        let mut flushed_without_progress = false;
        while cursor < end {
            let result = {
                let mut ctx = AtlasContext {
                    strikes: &mut *resources.strikes,
                    atlas: &mut *resources.atlas,
                    tokens: &*resources.tokens,
                };
                sub_run.regenerate_atlas(cursor, end, &mut ctx)
            };
            let n = result
                .glyphs_processed
                .min(self.max_quads_per_draw - batch.quad_count);
            if n > 0 {
                sub_run.fill_vertex_data(
                    &mut batch.vertices,
                    cursor..cursor + n,
                    self.color,
                    m,
                    self.clip.as_ref(),
                    resources.strikes,
                );
                cursor += n;
                batch.quad_count += n;
                flushed_without_progress = false;
            }
            if cursor == end {
                break;
            }
            if batch.quad_count > 0 {
                // The draw is full or the atlas needs the plots it uses.
                batch.record(resources);
            } else {
                if flushed_without_progress {
                    log::warn!(
                        "atlas has no room for glyph {cursor} of {end} even after a flush; skipping the rest"
                    );
                    break;
                }
                resources.flush();
                flushed_without_progress = true;
            }
        }
        if batch.quad_count > 0 {
            batch.record(resources);
        }
        batch.draws
    }
}

struct Batch {
    mask_format: MaskFormat,
    distance_field_flags: Option<DistanceFieldFlags>,
    vertex_stride: usize,
    device_bounds: Rect,
    vertices: Vec<u8>,
    quad_count: usize,
    draws: usize,
}

impl Batch {
    fn record<T: MeshDrawTarget + ?Sized>(&mut self, resources: &mut DrawResources<'_, T>) {
        let token = resources.tokens.issue_draw_token();
        let format = resources.atlas.resolve_mask_format(self.mask_format);
        let draw = GlyphDraw {
            token,
            mask_format: format,
            page_count: resources.atlas.page_count(format),
            distance_field_flags: self.distance_field_flags,
            vertex_stride: self.vertex_stride,
            quad_count: self.quad_count,
            vertices: core::mem::take(&mut self.vertices),
            uploads: resources.atlas.take_pending_uploads(),
            device_bounds: self.device_bounds,
        };
        log::trace!("recorded {} quads with token {}", draw.quad_count, token.get());
        resources.target.record_draw(draw);
        self.quad_count = 0;
        self.draws += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScalerContextFlags, SurfaceProps};
    use crate::geom::Point;
    use crate::paint::{Font, Paint, TypefaceId};
    use crate::scaler::{SourceGlyph, StrikeDescriptor};
    use crate::subrun::DirectMaskSubRun;
    use crate::subrun::testing::{atlas_state, scaler_cache};

    fn direct_run(size: f32, count: u16) -> DirectMaskSubRun {
        let cache = scaler_cache();
        let strike = cache.find_or_create_strike(&StrikeDescriptor::mask(
            &Font::new(TypefaceId(1), size),
            &Paint::default(),
            &SurfaceProps::default(),
            ScalerContextFlags::empty(),
            &Matrix::IDENTITY,
        ));
        let source: Vec<_> = (0..count)
            .map(|i| SourceGlyph {
                id: i + 1,
                position: Point::new(f32::from(i) * size, size),
            })
            .collect();
        let prepared = strike.prepare_for_direct_mask_drawing(&Matrix::IDENTITY, &source);
        DirectMaskSubRun::new(&Matrix::IDENTITY, &prepared.accepted, strike, MaskFormat::A8, false)
            .unwrap()
    }

    #[test]
    fn quad_limit_splits_draws() {
        let mut run = direct_run(12.0, 10);
        let (mut strikes, mut atlas, mut tokens) = atlas_state();
        let mut target = GlyphDrawList::new();
        let mut resources = DrawResources {
            strikes: &mut strikes,
            atlas: &mut atlas,
            tokens: &mut tokens,
            target: &mut target,
        };
        let op = AtlasTextOp::new(Matrix::IDENTITY, 0, None, 4);
        assert_eq!(op.prepare(&mut run, &mut resources), 3);
        let counts: Vec<_> = target.draws.iter().map(|d| d.quad_count).collect();
        assert_eq!(counts, [4, 4, 2]);
        assert!(target.draws.windows(2).all(|w| w[0].token < w[1].token));
        assert_eq!(target.draws[0].uploads.len(), 10, "every upload precedes the first draw");
        assert_eq!(target.draws[2].vertices.len(), 2 * 4 * target.draws[2].vertex_stride);
    }

    #[test]
    fn full_atlas_flushes_and_resumes() {
        // 200px glyphs are squares of side 100; four pages of one 256px plot
        // hold sixteen of them.
        let mut run = direct_run(200.0, 24);
        let (mut strikes, mut atlas, mut tokens) = atlas_state();
        atlas.set_atlas_dimensions_to_minimum_for_testing();
        let mut target = GlyphDrawList::new();
        let mut resources = DrawResources {
            strikes: &mut strikes,
            atlas: &mut atlas,
            tokens: &mut tokens,
            target: &mut target,
        };
        let op = AtlasTextOp::new(Matrix::IDENTITY, 0, None, 4096);
        let draws = op.prepare(&mut run, &mut resources);
        assert!(draws > 1, "the atlas cannot hold every glyph at once");
        assert!(target.flush_count > 0);
        let quads: usize = target.all_draws().map(|d| d.quad_count).sum();
        assert_eq!(quads, 24);
    }

    #[test]
    fn singular_matrix_records_nothing() {
        let mut run = direct_run(12.0, 3);
        let (mut strikes, mut atlas, mut tokens) = atlas_state();
        let mut target = GlyphDrawList::new();
        let mut resources = DrawResources {
            strikes: &mut strikes,
            atlas: &mut atlas,
            tokens: &mut tokens,
            target: &mut target,
        };
        let op = AtlasTextOp::new(Matrix::scale(0.0, 0.0), 0, None, 4096);
        assert_eq!(op.prepare(&mut run, &mut resources), 0);
        assert!(target.draws.is_empty());
    }
}
