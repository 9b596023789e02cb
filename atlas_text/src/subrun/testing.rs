// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A synthetic rasterizer for unit tests.
//!
//! Glyph 0 is blank. Glyphs from [`COLOR_GLYPH`] up render as color masks
//! and glyphs from [`DRAWABLE_GLYPH`] up to it only have drawables. Every
//! other glyph is a filled square whose side is half the device text size.

use std::sync::Arc;

use crate::atlas::{AtlasManager, TokenTracker};
use crate::canvas::TextCanvas;
use crate::config::AtlasConfig;
use crate::geom::{GlyphRect, Matrix, Rect};
use crate::glyph::{MaskFormat, PackedGlyphId};
use crate::kurbo::{BezPath, Shape};
use crate::paint::Paint;
use crate::scaler::{
    GlyphDrawable, GlyphImage, GlyphMetrics, GlyphRasterizer, ScalerCache, StrikeDescriptor,
};
use crate::strike::StrikeCache;
use crate::vertex::Mask2DVertex;

pub(crate) const DRAWABLE_GLYPH: u16 = 900;
pub(crate) const COLOR_GLYPH: u16 = 1000;

#[derive(Debug)]
pub(crate) struct Boxes;

pub(crate) fn side(desc: &StrikeDescriptor) -> f32 {
    let [a, b, c, d] = desc.matrix;
    let scale = a.hypot(c).max(b.hypot(d));
    (desc.size * scale * 0.5).ceil()
}

impl GlyphRasterizer for Boxes {
    #[expect(clippy::cast_possible_truncation, reason = "checked against i16::MAX")]
    fn metrics(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> GlyphMetrics {
        let glyph = id.glyph_id();
        let side = side(desc);
        let bounds = if glyph == 0 || !(1.0..=f32::from(i16::MAX)).contains(&side) {
            GlyphRect::EMPTY
        } else {
            let side = side as i16;
            GlyphRect::new(0, -side, side, 0)
        };
        GlyphMetrics {
            bounds,
            format: if glyph >= COLOR_GLYPH {
                MaskFormat::Argb
            } else {
                MaskFormat::A8
            },
            has_path: glyph != 0 && !(DRAWABLE_GLYPH..COLOR_GLYPH).contains(&glyph),
            has_drawable: (DRAWABLE_GLYPH..COLOR_GLYPH).contains(&glyph),
        }
    }

    fn image(
        &self,
        _: &StrikeDescriptor,
        _: PackedGlyphId,
        metrics: &GlyphMetrics,
    ) -> Option<GlyphImage> {
        let mut image =
            GlyphImage::zeroed(metrics.bounds.width(), metrics.bounds.height(), metrics.format);
        image.data.fill(0xff);
        Some(image)
    }

    fn path(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<BezPath> {
        if glyph_id == 0 || (DRAWABLE_GLYPH..COLOR_GLYPH).contains(&glyph_id) {
            return None;
        }
        let side = f64::from(desc.size * 0.5);
        Some(crate::kurbo::Rect::new(0.0, -side, side, 0.0).to_path(0.1))
    }

    fn drawable(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<Arc<dyn GlyphDrawable>> {
        (DRAWABLE_GLYPH..COLOR_GLYPH)
            .contains(&glyph_id)
            .then(|| Arc::new(BoxDrawable { side: desc.size * 0.5 }) as Arc<dyn GlyphDrawable>)
    }
}

#[derive(Debug)]
pub(crate) struct BoxDrawable {
    side: f32,
}

impl GlyphDrawable for BoxDrawable {
    fn bounds(&self) -> Rect {
        Rect::new(0.0, -self.side, self.side, 0.0)
    }

    fn draw(&self, canvas: &mut dyn TextCanvas, matrix: &Matrix) {
        canvas.save();
        canvas.concat(matrix);
        canvas.draw_path(&self.bounds().to_kurbo().to_path(0.1), &Paint::default());
        canvas.restore();
    }
}

pub(crate) fn scaler_cache() -> ScalerCache {
    ScalerCache::new(Arc::new(Boxes))
}

pub(crate) fn atlas_state() -> (StrikeCache, AtlasManager, TokenTracker) {
    (
        StrikeCache::new(),
        AtlasManager::new(AtlasConfig::default()),
        TokenTracker::new(),
    )
}

/// Positions of mask vertices in `bytes`.
pub(crate) fn mask_positions(bytes: &[u8]) -> Vec<[f32; 2]> {
    bytes
        .chunks_exact(size_of::<Mask2DVertex>())
        .map(|chunk| bytemuck::pod_read_unaligned::<Mask2DVertex>(chunk).position)
        .collect()
}
