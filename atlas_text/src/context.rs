// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The entry point that owns every cache a text draw touches.

use std::sync::Arc;

use crate::atlas::{AtlasManager, TokenTracker};
use crate::blob::{TextBlob, TextBlobCache, TextBlobKey};
use crate::canvas::TextCanvas;
use crate::config::TextConfig;
use crate::container::{CreationBehavior, StrikeDeviceInfo, SubRunContainer};
use crate::geom::{IRect, Matrix, Point};
use crate::glyph_run::GlyphRunList;
use crate::op::{AtlasTextOp, DrawResources, MeshDrawTarget};
use crate::paint::Paint;
use crate::scaler::{GlyphRasterizer, ScalerCache};
use crate::strike::StrikeCache;
use crate::vertex::pack_color;

/// What one call to [`TextContext::draw_glyph_run_list`] did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDrawStats {
    /// Whether a cached blob was drawn instead of classifying again.
    pub reused_blob: bool,
    /// Atlas draws recorded.
    pub glyph_draws: usize,
    /// Glyphs the blob could not draw at all.
    pub dropped_glyphs: usize,
}

/// Owns the scaler cache, the glyph records, the atlases, the draw tokens
/// and the blob cache.
///
/// Everything but the scaler cache is single-threaded and mutated through
/// `&mut self`. The scaler cache is shared, so containers may be built on
/// other threads with [`TextContext::make_container`] semantics against
/// [`scaler_cache`](Self::scaler_cache).
#[derive(Debug)]
pub struct TextContext {
    config: TextConfig,
    scaler_cache: Arc<ScalerCache>,
    strikes: StrikeCache,
    atlas: AtlasManager,
    tokens: TokenTracker,
    blob_cache: TextBlobCache,
}

impl TextContext {
    /// Create a context rasterizing with `rasterizer`.
    pub fn new(rasterizer: Arc<dyn GlyphRasterizer>, config: TextConfig) -> Self {
        Self::with_scaler_cache(Arc::new(ScalerCache::new(rasterizer)), config)
    }

    /// Create a context that shares `scaler_cache` with other contexts.
    pub fn with_scaler_cache(scaler_cache: Arc<ScalerCache>, config: TextConfig) -> Self {
        Self {
            atlas: AtlasManager::new(config.atlas.clone()),
            blob_cache: TextBlobCache::new(config.blob_cache_budget),
            strikes: StrikeCache::new(),
            tokens: TokenTracker::new(),
            scaler_cache,
            config,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &TextConfig {
        &self.config
    }

    /// The shared scaler cache.
    pub fn scaler_cache(&self) -> &Arc<ScalerCache> {
        &self.scaler_cache
    }

    /// Glyph records.
    pub fn strike_cache(&self) -> &StrikeCache {
        &self.strikes
    }

    /// The atlases.
    pub fn atlas_manager(&self) -> &AtlasManager {
        &self.atlas
    }

    /// The atlases, mutably.
    pub fn atlas_manager_mut(&mut self) -> &mut AtlasManager {
        &mut self.atlas
    }

    /// The blob cache.
    pub fn blob_cache(&self) -> &TextBlobCache {
        &self.blob_cache
    }

    /// The device properties classification uses.
    pub fn device_info(&self) -> StrikeDeviceInfo {
        StrikeDeviceInfo {
            surface_props: self.config.surface_props,
            scaler_context_flags: self.config.scaler_context_flags,
            sdft_control: self.config.sdft.control(),
        }
    }

    /// Classify `glyph_run_list` drawn with `paint` under `view_matrix`
    /// without caching it, for example to serialize the result.
    pub fn make_container(
        &self,
        glyph_run_list: &GlyphRunList,
        paint: &Paint,
        view_matrix: &Matrix,
        behavior: CreationBehavior,
    ) -> SubRunContainer {
        let origin = glyph_run_list.origin();
        SubRunContainer::make(
            glyph_run_list,
            &view_matrix.pre_translate(origin.x, origin.y),
            paint,
            &self.device_info(),
            &self.scaler_cache,
            behavior,
        )
    }

    /// Draw `glyph_run_list` with `paint` under `view_matrix`.
    ///
    /// Path and drawable glyphs go to `canvas`, which must already apply
    /// `view_matrix`. Atlas glyphs are recorded into `target` in device
    /// space. A cached blob is reused when its key matches and every sub-run
    /// accepts the new matrix; otherwise the list is classified again and
    /// the result cached if the paint allows it.
    pub fn draw_glyph_run_list(
        &mut self,
        glyph_run_list: &GlyphRunList,
        paint: &Paint,
        view_matrix: &Matrix,
        clip: Option<IRect>,
        canvas: &mut dyn TextCanvas,
        target: &mut dyn MeshDrawTarget,
    ) -> TextDrawStats {
        let origin = glyph_run_list.origin();
        let position_matrix = view_matrix.pre_translate(origin.x, origin.y);
        let device_info = self.device_info();
        let key = TextBlobKey::make(glyph_run_list, paint, &position_matrix, &device_info);

        let mut reused_blob = false;
        let mut uncached;
        let blob = match &key {
            Some(key) => {
                reused_blob = self
                    .blob_cache
                    .find(key)
                    .is_some_and(|blob| blob.can_reuse(paint, &position_matrix));
                if reused_blob {
                    log::debug!("blob cache hit for text {}", key.unique_id());
                } else {
                    log::debug!("blob cache miss for text {}", key.unique_id());
                    self.blob_cache.insert(TextBlob::make(
                        Some(key.clone()),
                        glyph_run_list,
                        paint,
                        &position_matrix,
                        &device_info,
                        &self.scaler_cache,
                    ));
                }
                self.blob_cache.find(key)
            }
            None => {
                uncached = TextBlob::make(
                    None,
                    glyph_run_list,
                    paint,
                    &position_matrix,
                    &device_info,
                    &self.scaler_cache,
                );
                Some(&mut uncached)
            }
        };
        let Some(blob) = blob else {
            return TextDrawStats::default();
        };

        let mut resources = DrawResources {
            strikes: &mut self.strikes,
            atlas: &mut self.atlas,
            tokens: &mut self.tokens,
            target,
        };
        let glyph_draws = draw_sub_runs(
            blob.container_mut(),
            &position_matrix,
            origin,
            paint,
            clip,
            self.config.max_quads_per_draw,
            canvas,
            &mut resources,
        );
        TextDrawStats {
            reused_blob,
            glyph_draws,
            dropped_glyphs: blob.container().dropped_glyph_count(),
        }
    }

    /// Draw a container built elsewhere, such as one read back from a
    /// buffer, for a glyph run list at `draw_origin`. Returns the number of
    /// atlas draws recorded.
    pub fn draw_container(
        &mut self,
        container: &mut SubRunContainer,
        draw_origin: Point,
        paint: &Paint,
        view_matrix: &Matrix,
        clip: Option<IRect>,
        canvas: &mut dyn TextCanvas,
        target: &mut dyn MeshDrawTarget,
    ) -> usize {
        let position_matrix = view_matrix.pre_translate(draw_origin.x, draw_origin.y);
        let mut resources = DrawResources {
            strikes: &mut self.strikes,
            atlas: &mut self.atlas,
            tokens: &mut self.tokens,
            target,
        };
        draw_sub_runs(
            container,
            &position_matrix,
            draw_origin,
            paint,
            clip,
            self.config.max_quads_per_draw,
            canvas,
            &mut resources,
        )
    }

    /// Flush `target` and let the atlases reclaim plots no pending draw
    /// uses.
    pub fn flush(&mut self, target: &mut dyn MeshDrawTarget) {
        DrawResources {
            strikes: &mut self.strikes,
            atlas: &mut self.atlas,
            tokens: &mut self.tokens,
            target,
        }
        .flush();
    }

    /// Forget cached blobs of the text with `unique_id`.
    pub fn purge_blobs_for_id(&mut self, unique_id: u32) {
        self.blob_cache.purge_blobs_for_id(unique_id);
    }

    /// Drop the atlases, the glyph records and every cached blob.
    ///
    /// Containers held elsewhere stay valid; their glyphs are resolved and
    /// uploaded again on their next draw.
    pub fn free_gpu_resources(&mut self) {
        self.atlas.free_all();
        self.strikes.free_all();
        self.blob_cache.free_all();
        log::debug!("freed text GPU resources");
    }
}

fn draw_sub_runs(
    container: &mut SubRunContainer,
    position_matrix: &Matrix,
    draw_origin: Point,
    paint: &Paint,
    clip: Option<IRect>,
    max_quads_per_draw: usize,
    canvas: &mut dyn TextCanvas,
    resources: &mut DrawResources<'_, dyn MeshDrawTarget + '_>,
) -> usize {
    container.draw(canvas, draw_origin, paint);
    let op = AtlasTextOp::new(
        *position_matrix,
        pack_color(paint.vertex_color()),
        clip,
        max_quads_per_draw,
    );
    container
        .sub_runs_mut()
        .iter_mut()
        .filter_map(|run| run.as_atlas_mut())
        .map(|run| op.prepare(run, resources))
        .sum()
}
