// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The glyphs of one atlas sub-run and their atlas bookkeeping.

use core::fmt;
use std::sync::Arc;

use crate::atlas::{AtlasLocator, AtlasManager, BulkUsePlotUpdater, ErrorCode, TokenTracker};
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, ErrorKind};
use crate::glyph::{GlyphHandle, MaskFormat, PackedGlyphId};
use crate::scaler::{ScalerStrike, StrikeDescriptor, StrikeResolver};
use crate::strike::StrikeCache;

/// The single-threaded state a draw prepares against.
#[derive(Debug)]
pub struct AtlasContext<'a> {
    /// Glyph records.
    pub strikes: &'a mut StrikeCache,
    /// The atlases.
    pub atlas: &'a mut AtlasManager,
    /// Draw and flush tokens.
    pub tokens: &'a TokenTracker,
}

/// Outcome of [`GlyphVector::regenerate_atlas`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegenerateResult {
    /// `false` when the atlas ran out of room: flush and continue from
    /// `begin + glyphs_processed`.
    pub success: bool,
    /// Glyphs of the range now resident, counted from `begin`.
    pub glyphs_processed: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum GlyphSlot {
    Unresolved(PackedGlyphId),
    Resolved {
        id: PackedGlyphId,
        handle: GlyphHandle,
    },
}

impl GlyphSlot {
    fn packed_id(self) -> PackedGlyphId {
        match self {
            Self::Unresolved(id) | Self::Resolved { id, .. } => id,
        }
    }
}

/// Packed glyph ids of one strike, resolved lazily to [`Glyph`](crate::glyph::Glyph)
/// records.
///
/// Construction only needs the scaler strike, so it may happen on any
/// thread. Resolution and atlas regeneration need an [`AtlasContext`].
pub struct GlyphVector {
    strike: Arc<ScalerStrike>,
    slots: Vec<GlyphSlot>,
    resolved_epoch: Option<u64>,
    atlas_generation: Option<u64>,
    bulk: BulkUsePlotUpdater,
}

impl fmt::Debug for GlyphVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlyphVector")
            .field("strike", self.strike.descriptor())
            .field("glyphs", &self.slots.len())
            .field("atlas_generation", &self.atlas_generation)
            .finish_non_exhaustive()
    }
}

impl GlyphVector {
    /// Wrap `ids` of `strike`.
    pub fn new(strike: Arc<ScalerStrike>, ids: impl IntoIterator<Item = PackedGlyphId>) -> Self {
        Self {
            strike,
            slots: ids.into_iter().map(GlyphSlot::Unresolved).collect(),
            resolved_epoch: None,
            atlas_generation: None,
            bulk: BulkUsePlotUpdater::default(),
        }
    }

    /// The strike the glyphs render with.
    pub fn strike(&self) -> &Arc<ScalerStrike> {
        &self.strike
    }

    /// The strike descriptor.
    pub fn descriptor(&self) -> &StrikeDescriptor {
        self.strike.descriptor()
    }

    /// Number of glyphs.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no glyphs.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The packed ids, in order.
    pub fn packed_ids(&self) -> impl Iterator<Item = PackedGlyphId> + '_ {
        self.slots.iter().map(|slot| slot.packed_id())
    }

    /// Whether every slot refers to a live glyph record of `strikes`.
    pub fn is_resolved(&self, strikes: &StrikeCache) -> bool {
        self.resolved_epoch == Some(strikes.epoch())
    }

    /// Resolve every slot to its glyph record.
    ///
    /// Runs once; it runs again only if `strikes` was freed in between, in
    /// which case cached atlas locations are forgotten too.
    pub fn packed_glyph_id_to_glyph(&mut self, strikes: &mut StrikeCache) {
        if self.is_resolved(strikes) {
            return;
        }
        let strike = strikes.find_or_create_strike(self.strike.descriptor());
        for slot in &mut self.slots {
            let id = slot.packed_id();
            *slot = match strikes.get_glyph(strike, id) {
                Some(handle) => GlyphSlot::Resolved { id, handle },
                None => GlyphSlot::Unresolved(id),
            };
        }
        self.resolved_epoch = Some(strikes.epoch());
        self.atlas_generation = None;
        self.bulk.reset();
    }

    /// Where glyph `index` lives in the atlas. Unresolved or unplaced glyphs
    /// report an empty locator.
    pub fn atlas_locator(&self, index: usize, strikes: &StrikeCache) -> AtlasLocator {
        match self.slots.get(index) {
            Some(GlyphSlot::Resolved { handle, .. }) if self.is_resolved(strikes) => strikes
                .glyph(*handle)
                .map(|glyph| glyph.atlas_locator)
                .unwrap_or_default(),
            _ => AtlasLocator::default(),
        }
    }

    /// Make glyphs `begin..end` resident in `format`'s atlas, uploading
    /// images with `src_padding`.
    ///
    /// When the atlas is unchanged since the whole vector was last made
    /// resident this only refreshes use tokens. Otherwise the range is
    /// walked and glyphs missing from the atlas are added; if the atlas is
    /// full the walk stops early with `success == false`. Glyphs without an
    /// image, or that the atlas can never hold, count as processed and are
    /// left unplaced.
    pub fn regenerate_atlas(
        &mut self,
        begin: usize,
        end: usize,
        format: MaskFormat,
        src_padding: u16,
        ctx: &mut AtlasContext<'_>,
    ) -> RegenerateResult {
        self.packed_glyph_id_to_glyph(ctx.strikes);
        let end = end.min(self.slots.len());
        let begin = begin.min(end);
        let token = ctx.tokens.next_draw_token();

        if self.atlas_generation == Some(ctx.atlas.atlas_generation(format)) {
            if end == self.slots.len() {
                ctx.atlas.set_use_token_bulk(&self.bulk, token, format);
            }
            return RegenerateResult {
                success: true,
                glyphs_processed: end - begin,
            };
        }

        self.bulk.reset();
        let mut processed = 0;
        let mut success = true;
        for slot in &self.slots[begin..end] {
            let GlyphSlot::Resolved { id, handle } = *slot else {
                processed += 1;
                continue;
            };
            let Some(glyph) = ctx.strikes.glyph_mut(handle) else {
                processed += 1;
                continue;
            };
            if !ctx.atlas.has_glyph(format, glyph) {
                let Some(image) = self.strike.image(id) else {
                    log::warn!("glyph {} has no image; leaving it out", id.glyph_id());
                    processed += 1;
                    continue;
                };
                match ctx
                    .atlas
                    .add_glyph_to_atlas(&image, glyph, src_padding, ctx.tokens)
                {
                    ErrorCode::Succeeded => {}
                    ErrorCode::TryAgain => {
                        success = false;
                        break;
                    }
                    ErrorCode::Error => {
                        log::warn!(
                            "glyph {} ({}x{}) does not fit the atlas; leaving it out",
                            id.glyph_id(),
                            image.width,
                            image.height
                        );
                        processed += 1;
                        continue;
                    }
                }
            }
            ctx.atlas
                .add_glyph_to_bulk_and_set_use_token(&mut self.bulk, format, glyph, token);
            processed += 1;
        }

        if success && begin + processed == self.slots.len() {
            self.atlas_generation = Some(ctx.atlas.atlas_generation(format));
        }
        RegenerateResult {
            success,
            glyphs_processed: processed,
        }
    }

    /// Serialize the strike descriptor and packed ids.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        self.strike.descriptor().flatten(buffer);
        buffer.write_count(self.slots.len());
        for id in self.packed_ids() {
            buffer.write_u32(id.to_bits());
        }
    }

    /// Read a vector written by [`flatten`](Self::flatten), finding its
    /// strike through `resolver`.
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let descriptor = StrikeDescriptor::unflatten(buffer)?;
        let strike = resolver.resolve_strike(&descriptor);
        buffer.validate(strike.is_some(), ErrorKind::UnknownStrike)?;
        let count = buffer.check_glyph_count(4)?;
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            ids.push(PackedGlyphId::from_bits(buffer.read_u32()?));
        }
        match strike {
            Some(strike) => Ok(Self::new(strike, ids)),
            None => Err(Error::new(ErrorKind::UnknownStrike, buffer.offset())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtlasConfig, ScalerContextFlags, SurfaceProps};
    use crate::geom::{GlyphRect, Matrix};
    use crate::kurbo::BezPath;
    use crate::paint::{Font, Paint, TypefaceId};
    use crate::scaler::{GlyphImage, GlyphMetrics, GlyphRasterizer, ScalerCache};

    /// Every glyph is a `side` x `side` square.
    #[derive(Debug)]
    struct Squares {
        side: i16,
    }

    impl GlyphRasterizer for Squares {
        fn metrics(&self, _: &StrikeDescriptor, _: PackedGlyphId) -> GlyphMetrics {
            GlyphMetrics {
                bounds: GlyphRect::new(0, -self.side, self.side, 0),
                format: MaskFormat::A8,
                has_path: false,
                has_drawable: false,
            }
        }

        fn image(
            &self,
            _: &StrikeDescriptor,
            _: PackedGlyphId,
            metrics: &GlyphMetrics,
        ) -> Option<GlyphImage> {
            let mut image =
                GlyphImage::zeroed(metrics.bounds.width(), metrics.bounds.height(), MaskFormat::A8);
            image.data.fill(0xff);
            Some(image)
        }

        fn path(&self, _: &StrikeDescriptor, _: u16) -> Option<BezPath> {
            None
        }
    }

    fn setup(side: i16) -> (ScalerCache, StrikeDescriptor) {
        let cache = ScalerCache::new(Arc::new(Squares { side }));
        let desc = StrikeDescriptor::mask(
            &Font::new(TypefaceId(1), 12.0),
            &Paint::default(),
            &SurfaceProps::default(),
            ScalerContextFlags::empty(),
            &Matrix::IDENTITY,
        );
        (cache, desc)
    }

    fn vector(cache: &ScalerCache, desc: &StrikeDescriptor, count: u16) -> GlyphVector {
        GlyphVector::new(
            cache.find_or_create_strike(desc),
            (0..count).map(PackedGlyphId::new),
        )
    }

    #[test]
    fn regenerating_twice_is_idempotent() {
        let (cache, desc) = setup(10);
        let mut glyphs = vector(&cache, &desc, 5);
        let mut strikes = StrikeCache::new();
        let mut atlas = AtlasManager::new(AtlasConfig::default());
        let tokens = TokenTracker::new();
        let mut ctx = AtlasContext {
            strikes: &mut strikes,
            atlas: &mut atlas,
            tokens: &tokens,
        };
        let first = glyphs.regenerate_atlas(0, 5, MaskFormat::A8, 0, &mut ctx);
        let uvs: Vec<_> = (0..5).map(|i| glyphs.atlas_locator(i, ctx.strikes)).collect();
        let second = glyphs.regenerate_atlas(0, 5, MaskFormat::A8, 0, &mut ctx);
        let again: Vec<_> = (0..5).map(|i| glyphs.atlas_locator(i, ctx.strikes)).collect();
        let expected = RegenerateResult {
            success: true,
            glyphs_processed: 5,
        };
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert_eq!(uvs, again);
        assert!(uvs.iter().all(|l| l.width() == 10));
    }

    #[test]
    fn full_atlas_reports_partial_progress() {
        // One page of four plots, each filled by a single glyph.
        let (cache, desc) = setup(256);
        let mut glyphs = vector(&cache, &desc, 6);
        let mut strikes = StrikeCache::new();
        let mut atlas = AtlasManager::new(AtlasConfig {
            max_texture_width: 512,
            max_texture_height: 512,
            plot_width: 256,
            plot_height: 256,
            max_pages: 1,
            ..AtlasConfig::default()
        });
        let mut tokens = TokenTracker::new();

        let mut ctx = AtlasContext {
            strikes: &mut strikes,
            atlas: &mut atlas,
            tokens: &tokens,
        };
        let result = glyphs.regenerate_atlas(0, 6, MaskFormat::A8, 0, &mut ctx);
        assert_eq!(
            result,
            RegenerateResult {
                success: false,
                glyphs_processed: 4,
            }
        );

        tokens.issue_draw_token();
        tokens.flush();
        let mut ctx = AtlasContext {
            strikes: &mut strikes,
            atlas: &mut atlas,
            tokens: &tokens,
        };
        let result = glyphs.regenerate_atlas(4, 6, MaskFormat::A8, 0, &mut ctx);
        assert_eq!(
            result,
            RegenerateResult {
                success: true,
                glyphs_processed: 2,
            }
        );
    }

    #[test]
    fn flatten_round_trips_ids() {
        let (cache, desc) = setup(4);
        let glyphs = vector(&cache, &desc, 3);
        let mut buffer = WriteBuffer::new();
        glyphs.flatten(&mut buffer);
        let bytes = buffer.into_bytes();

        let read = GlyphVector::unflatten(&mut ReadBuffer::new(&bytes), &cache).unwrap();
        assert_eq!(read.packed_ids().collect::<Vec<_>>(), glyphs.packed_ids().collect::<Vec<_>>());

        let empty = ScalerCache::new(Arc::new(Squares { side: 4 }));
        let err = GlyphVector::unflatten(&mut ReadBuffer::new(&bytes), &empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownStrike);
    }
}
