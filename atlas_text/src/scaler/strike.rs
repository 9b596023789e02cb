// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Thread-safe strikes and the cache that shares them.

use core::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    ActionType, GlyphAction, GlyphDigest, GlyphDrawable, GlyphImage, GlyphMetrics,
    GlyphRasterizer, SourceGlyph, StrikeDescriptor, StrikeKind,
    distance_field::{DISTANCE_FIELD_PAD, generate_distance_field},
};
use crate::geom::{GlyphRect, Matrix, Point};
use crate::glyph::{MaskFormat, PackedGlyphId};
use crate::kurbo::BezPath;
use crate::{HashMap, new_map};

/// Largest device coordinate a direct mask glyph may be placed at.
pub const DIRECT_MASK_MAX_POS: f32 = 32_767.0 - 256.0;

/// A glyph accepted for atlas drawing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MaskGlyph {
    /// Identity in the strike, including sub-pixel buckets.
    pub packed_id: PackedGlyphId,
    /// Mask bounds in strike pixels.
    pub bounds: GlyphRect,
    /// Mask format.
    pub format: MaskFormat,
    /// Floored device position for direct masks, source position otherwise.
    pub position: Point,
}

/// A glyph accepted for path drawing.
#[derive(Clone, Debug)]
pub struct PathGlyph {
    /// Glyph index.
    pub id: u16,
    /// Source position.
    pub position: Point,
    /// Outline in strike space.
    pub path: Arc<BezPath>,
}

/// A glyph accepted for drawable drawing.
#[derive(Clone, Debug)]
pub struct DrawableGlyph {
    /// Glyph index.
    pub id: u16,
    /// Source position.
    pub position: Point,
    /// The drawable.
    pub drawable: Arc<dyn GlyphDrawable>,
}

/// The accept/reject partition of one classification stage.
#[derive(Clone, Debug)]
pub struct Prepared<T> {
    /// Glyphs this stage draws.
    pub accepted: Vec<T>,
    /// Glyphs handed to the next stage, with their source positions.
    pub rejected: Vec<SourceGlyph>,
    /// Glyphs with nothing to draw or a non-finite position.
    pub dropped: usize,
    /// Glyphs in `rejected` only because their device position was too far
    /// from the origin for a direct mask.
    pub excluded: usize,
}

impl<T> Default for Prepared<T> {
    fn default() -> Self {
        Self {
            accepted: Vec::new(),
            rejected: Vec::new(),
            dropped: 0,
            excluded: 0,
        }
    }
}

struct StrikeState {
    digests: HashMap<PackedGlyphId, GlyphDigest>,
    images: HashMap<PackedGlyphId, Option<Arc<GlyphImage>>>,
    paths: HashMap<u16, Option<Arc<BezPath>>>,
    drawables: HashMap<u16, Option<Arc<dyn GlyphDrawable>>>,
}

/// Glyph data for one descriptor, shared between threads.
///
/// Lookups are memoized. The lock is never held while the rasterizer runs,
/// so two threads may occasionally render the same glyph; the first result
/// stored wins.
pub struct ScalerStrike {
    descriptor: StrikeDescriptor,
    rasterizer: Arc<dyn GlyphRasterizer>,
    state: Mutex<StrikeState>,
}

impl fmt::Debug for ScalerStrike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScalerStrike")
            .field("descriptor", &self.descriptor)
            .field("digests", &state.digests.len())
            .field("images", &state.images.len())
            .finish_non_exhaustive()
    }
}

impl ScalerStrike {
    fn new(descriptor: StrikeDescriptor, rasterizer: Arc<dyn GlyphRasterizer>) -> Self {
        Self {
            descriptor,
            rasterizer,
            state: Mutex::new(StrikeState {
                digests: new_map(),
                images: new_map(),
                paths: new_map(),
                drawables: new_map(),
            }),
        }
    }

    /// The descriptor this strike renders.
    pub fn descriptor(&self) -> &StrikeDescriptor {
        &self.descriptor
    }

    /// The cached digest of `id`, measuring it on first use.
    pub fn digest(&self, id: PackedGlyphId) -> GlyphDigest {
        if let Some(digest) = self.state.lock().digests.get(&id) {
            return *digest;
        }
        let mut metrics = self.rasterizer.metrics(&self.descriptor, id);
        if self.descriptor.kind == StrikeKind::Sdf && !metrics.bounds.is_empty() {
            #[expect(clippy::cast_possible_truncation, reason = "the pad is a small constant")]
            let pad = DISTANCE_FIELD_PAD as i16;
            metrics.bounds = metrics.bounds.outset(pad);
        }
        let digest = GlyphDigest::new(id, &metrics);
        *self.state.lock().digests.entry(id).or_insert(digest)
    }

    /// The mask for `id`. Distance field strikes convert the rendered A8
    /// coverage into a field.
    pub fn image(&self, id: PackedGlyphId) -> Option<Arc<GlyphImage>> {
        if let Some(image) = self.state.lock().images.get(&id) {
            return image.clone();
        }
        let metrics = self.rasterizer.metrics(&self.descriptor, id);
        let image = if metrics.bounds.is_empty() {
            None
        } else {
            self.rasterizer
                .image(&self.descriptor, id, &metrics)
                .and_then(|image| match self.descriptor.kind {
                    StrikeKind::Sdf => sdf_from_mask(&image),
                    _ => Some(image),
                })
                .map(Arc::new)
        };
        self.state
            .lock()
            .images
            .entry(id)
            .or_insert(image)
            .clone()
    }

    /// The outline of `glyph_id` in strike space.
    pub fn path(&self, glyph_id: u16) -> Option<Arc<BezPath>> {
        if let Some(path) = self.state.lock().paths.get(&glyph_id) {
            return path.clone();
        }
        let path = self
            .rasterizer
            .path(&self.descriptor, glyph_id)
            .map(Arc::new);
        self.state
            .lock()
            .paths
            .entry(glyph_id)
            .or_insert(path)
            .clone()
    }

    /// The drawable of `glyph_id`.
    pub fn drawable(&self, glyph_id: u16) -> Option<Arc<dyn GlyphDrawable>> {
        if let Some(drawable) = self.state.lock().drawables.get(&glyph_id) {
            return drawable.clone();
        }
        let drawable = self.rasterizer.drawable(&self.descriptor, glyph_id);
        self.state
            .lock()
            .drawables
            .entry(glyph_id)
            .or_insert(drawable)
            .clone()
    }

    /// Partition `source` for device-space mask drawing under `position_matrix`.
    ///
    /// Accepted glyphs carry their floored device position; sub-pixel buckets
    /// come from the rounded fraction. Glyphs mapped further than
    /// [`DIRECT_MASK_MAX_POS`] from the origin are rejected.
    pub fn prepare_for_direct_mask_drawing(
        &self,
        position_matrix: &Matrix,
        source: &[SourceGlyph],
    ) -> Prepared<MaskGlyph> {
        let rounding = self.descriptor.rounding_spec();
        let half = rounding.half_axis_sample_freq;
        let with_rounding = position_matrix.post_translate(half.x, half.y);
        let mut prepared = Prepared::default();
        for glyph in source {
            if !glyph.position.is_finite() {
                prepared.dropped += 1;
                continue;
            }
            let mapped = with_rounding.map_point(glyph.position);
            if mapped.x.abs() > DIRECT_MASK_MAX_POS || mapped.y.abs() > DIRECT_MASK_MAX_POS {
                prepared.rejected.push(*glyph);
                prepared.excluded += 1;
                continue;
            }
            let packed_id = match rounding.subpixel_axes {
                Some(axes) => PackedGlyphId::from_position(glyph.id, mapped, axes),
                None => PackedGlyphId::new(glyph.id),
            };
            let digest = self.digest(packed_id);
            match digest.action_for(ActionType::DirectMask) {
                GlyphAction::Accept => prepared.accepted.push(MaskGlyph {
                    packed_id,
                    bounds: digest.bounds,
                    format: digest.format,
                    position: mapped.floor(),
                }),
                GlyphAction::Reject => prepared.rejected.push(*glyph),
                GlyphAction::Drop => prepared.dropped += 1,
            }
        }
        prepared
    }

    /// Partition `source` for transformed mask drawing.
    pub fn prepare_for_mask_drawing(&self, source: &[SourceGlyph]) -> Prepared<MaskGlyph> {
        self.prepare_for_atlas(source, ActionType::Mask)
    }

    /// Partition `source` for distance field drawing.
    pub fn prepare_for_sdft_drawing(&self, source: &[SourceGlyph]) -> Prepared<MaskGlyph> {
        self.prepare_for_atlas(source, ActionType::Sdft)
    }

    fn prepare_for_atlas(&self, source: &[SourceGlyph], action: ActionType) -> Prepared<MaskGlyph> {
        let mut prepared = Prepared::default();
        for glyph in source {
            if !glyph.position.is_finite() {
                prepared.dropped += 1;
                continue;
            }
            let packed_id = PackedGlyphId::new(glyph.id);
            let digest = self.digest(packed_id);
            match digest.action_for(action) {
                GlyphAction::Accept => prepared.accepted.push(MaskGlyph {
                    packed_id,
                    bounds: digest.bounds,
                    format: digest.format,
                    position: glyph.position,
                }),
                GlyphAction::Reject => prepared.rejected.push(*glyph),
                GlyphAction::Drop => prepared.dropped += 1,
            }
        }
        prepared
    }

    /// Partition `source` for path drawing.
    pub fn prepare_for_path_drawing(&self, source: &[SourceGlyph]) -> Prepared<PathGlyph> {
        let mut prepared = Prepared::default();
        for glyph in source {
            if !glyph.position.is_finite() {
                prepared.dropped += 1;
                continue;
            }
            let digest = self.digest(PackedGlyphId::new(glyph.id));
            match digest.action_for(ActionType::Path) {
                GlyphAction::Accept => match self.path(glyph.id) {
                    Some(path) => prepared.accepted.push(PathGlyph {
                        id: glyph.id,
                        position: glyph.position,
                        path,
                    }),
                    None => prepared.rejected.push(*glyph),
                },
                GlyphAction::Reject => prepared.rejected.push(*glyph),
                GlyphAction::Drop => prepared.dropped += 1,
            }
        }
        prepared
    }

    /// Partition `source` for drawable drawing.
    pub fn prepare_for_drawable_drawing(&self, source: &[SourceGlyph]) -> Prepared<DrawableGlyph> {
        let mut prepared = Prepared::default();
        for glyph in source {
            if !glyph.position.is_finite() {
                prepared.dropped += 1;
                continue;
            }
            let digest = self.digest(PackedGlyphId::new(glyph.id));
            match digest.action_for(ActionType::Drawable) {
                GlyphAction::Accept => match self.drawable(glyph.id) {
                    Some(drawable) => prepared.accepted.push(DrawableGlyph {
                        id: glyph.id,
                        position: glyph.position,
                        drawable,
                    }),
                    None => prepared.rejected.push(*glyph),
                },
                GlyphAction::Reject => prepared.rejected.push(*glyph),
                GlyphAction::Drop => prepared.dropped += 1,
            }
        }
        prepared
    }

    /// Largest mask side over `glyph_ids`, or zero if every glyph is empty or
    /// too large for the scaler to describe.
    pub fn find_maximum_glyph_dimension(&self, glyph_ids: &[u16]) -> u16 {
        glyph_ids
            .iter()
            .map(|&id| self.digest(PackedGlyphId::new(id)).max_dimension())
            .max()
            .unwrap_or(0)
    }
}

fn sdf_from_mask(image: &GlyphImage) -> Option<GlyphImage> {
    if image.format != MaskFormat::A8 {
        return None;
    }
    let width = usize::from(image.width);
    let height = usize::from(image.height);
    let data = generate_distance_field(&image.data, width, height);
    let pad = 2 * DISTANCE_FIELD_PAD;
    Some(GlyphImage {
        width: u16::try_from(width + pad).ok()?,
        height: u16::try_from(height + pad).ok()?,
        format: MaskFormat::A8,
        data,
    })
}

/// Finds strikes by descriptor when reading flattened sub-runs.
pub trait StrikeResolver {
    /// The strike for `desc`, if it is known.
    fn resolve_strike(&self, desc: &StrikeDescriptor) -> Option<Arc<ScalerStrike>>;
}

/// Shares strikes between threads.
pub struct ScalerCache {
    rasterizer: Arc<dyn GlyphRasterizer>,
    strikes: Mutex<HashMap<StrikeDescriptor, Arc<ScalerStrike>>>,
}

impl fmt::Debug for ScalerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalerCache")
            .field("rasterizer", &self.rasterizer)
            .field("strikes", &self.strikes.lock().len())
            .finish()
    }
}

impl ScalerCache {
    /// Create an empty cache rendering with `rasterizer`.
    pub fn new(rasterizer: Arc<dyn GlyphRasterizer>) -> Self {
        Self {
            rasterizer,
            strikes: Mutex::new(new_map()),
        }
    }

    /// The strike for `desc`, created on first use.
    pub fn find_or_create_strike(&self, desc: &StrikeDescriptor) -> Arc<ScalerStrike> {
        let mut strikes = self.strikes.lock();
        if let Some(strike) = strikes.get(desc) {
            return strike.clone();
        }
        log::debug!(
            "creating {:?} strike for typeface {} at {}",
            desc.kind,
            desc.typeface.0,
            desc.size
        );
        let strike = Arc::new(ScalerStrike::new(desc.clone(), self.rasterizer.clone()));
        strikes.insert(desc.clone(), strike.clone());
        strike
    }

    /// The strike for `desc`, if one exists.
    pub fn find_strike(&self, desc: &StrikeDescriptor) -> Option<Arc<ScalerStrike>> {
        self.strikes.lock().get(desc).cloned()
    }

    /// Forget every strike. Strikes still referenced elsewhere stay alive.
    pub fn free_all(&self) {
        self.strikes.lock().clear();
    }

    /// Number of cached strikes.
    pub fn strike_count(&self) -> usize {
        self.strikes.lock().len()
    }
}

impl StrikeResolver for ScalerCache {
    fn resolve_strike(&self, desc: &StrikeDescriptor) -> Option<Arc<ScalerStrike>> {
        self.find_strike(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::palette::css::BLACK;
    use crate::config::{ScalerContextFlags, SurfaceProps};
    use crate::paint::{Font, Paint, TypefaceId};

    /// Square glyphs whose side is the glyph id, scaled by the strike matrix.
    #[derive(Debug)]
    struct Squares;

    impl GlyphRasterizer for Squares {
        #[expect(clippy::cast_possible_truncation, reason = "test sizes are small")]
        fn metrics(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> GlyphMetrics {
            let side = (f32::from(id.glyph_id()) * desc.matrix[0]).ceil() as i16;
            GlyphMetrics {
                bounds: GlyphRect::new(0, -side, side, 0),
                format: MaskFormat::A8,
                has_path: side > 0,
                has_drawable: false,
            }
        }

        fn image(
            &self,
            _desc: &StrikeDescriptor,
            _id: PackedGlyphId,
            metrics: &GlyphMetrics,
        ) -> Option<GlyphImage> {
            let mut image =
                GlyphImage::zeroed(metrics.bounds.width(), metrics.bounds.height(), MaskFormat::A8);
            image.data.fill(255);
            Some(image)
        }

        fn path(&self, _desc: &StrikeDescriptor, _glyph_id: u16) -> Option<BezPath> {
            Some(BezPath::new())
        }
    }

    fn strike(matrix: &Matrix) -> Arc<ScalerStrike> {
        let cache = ScalerCache::new(Arc::new(Squares));
        let desc = StrikeDescriptor::mask(
            &Font::new(TypefaceId(0), 12.0),
            &Paint::new(BLACK),
            &SurfaceProps::default(),
            ScalerContextFlags::empty(),
            matrix,
        );
        cache.find_or_create_strike(&desc)
    }

    #[test]
    fn direct_mask_partition() {
        let strike = strike(&Matrix::IDENTITY);
        let source = [
            SourceGlyph {
                id: 10,
                position: Point::new(1.7, 2.2),
            },
            SourceGlyph {
                id: 300,
                position: Point::ZERO,
            },
            SourceGlyph {
                id: 0,
                position: Point::ZERO,
            },
            SourceGlyph {
                id: 10,
                position: Point::new(f32::INFINITY, 0.0),
            },
        ];
        let prepared = strike.prepare_for_direct_mask_drawing(&Matrix::IDENTITY, &source);
        assert_eq!(prepared.accepted.len(), 1);
        assert_eq!(prepared.accepted[0].position, Point::new(2.0, 2.0), "rounded to nearest");
        assert_eq!(prepared.rejected.len(), 1, "300px glyph does not fit");
        assert_eq!(prepared.dropped, 2, "empty glyph and infinite position");
    }

    #[test]
    fn maximum_dimension_scales_with_strike() {
        assert_eq!(strike(&Matrix::IDENTITY).find_maximum_glyph_dimension(&[3, 40, 7]), 40);
        assert_eq!(
            strike(&Matrix::scale(0.5, 0.5)).find_maximum_glyph_dimension(&[3, 40, 7]),
            20
        );
    }

    #[test]
    fn cache_shares_strikes() {
        let cache = ScalerCache::new(Arc::new(Squares));
        let desc = StrikeDescriptor::path(&Font::new(TypefaceId(0), 12.0), &SurfaceProps::default()).0;
        let a = cache.find_or_create_strike(&desc);
        let b = cache.find_or_create_strike(&desc);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.strike_count(), 1);
        assert!(cache.resolve_strike(&desc).is_some());
        cache.free_all();
        assert!(cache.resolve_strike(&desc).is_none());
    }
}
