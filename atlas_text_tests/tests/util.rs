// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers: a rasterizer that needs no fonts and a test environment.

use std::sync::Arc;

use atlas_text::config::SdftConfig;
use atlas_text::container::CreationBehavior;
use atlas_text::context::TextDrawStats;
use atlas_text::geom::GlyphRect;
use atlas_text::glyph::{MaskFormat, PackedGlyphId};
use atlas_text::kurbo::{BezPath, Shape};
use atlas_text::scaler::{
    GlyphDrawable, GlyphImage, GlyphMetrics, GlyphRasterizer, ScalerCache, StrikeDescriptor,
};
use atlas_text::subrun::SubRunType;
use atlas_text::vertex::Mask2DVertex;
use atlas_text::{
    CanvasRecorder, Font, GlyphDrawList, GlyphRun, GlyphRunList, Matrix, Paint, Point, Rect,
    SubRunContainer, TextCanvas, TextConfig, TextContext, TypefaceId,
};

/// Glyphs from here up to [`COLOR_GLYPH`] only have drawables.
pub(crate) const DRAWABLE_GLYPH: u16 = 500;
/// Glyphs from here up render as color masks.
pub(crate) const COLOR_GLYPH: u16 = 600;

/// Glyph 0 is blank and drawable glyphs have no mask; every other glyph is a
/// square whose side is half the device text size, rounded up.
#[derive(Debug)]
pub(crate) struct Squares;

fn device_side(desc: &StrikeDescriptor) -> f32 {
    let [a, b, c, d] = desc.matrix;
    (desc.size * a.hypot(c).max(b.hypot(d)) * 0.5).ceil()
}

fn is_drawable(glyph_id: u16) -> bool {
    (DRAWABLE_GLYPH..COLOR_GLYPH).contains(&glyph_id)
}

impl GlyphRasterizer for Squares {
    fn metrics(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> GlyphMetrics {
        let glyph = id.glyph_id();
        let side = device_side(desc);
        let blank = glyph == 0 || is_drawable(glyph);
        let bounds = if blank || !(1.0..=f32::from(i16::MAX)).contains(&side) {
            GlyphRect::EMPTY
        } else {
            GlyphRect::new(0, -(side as i16), side as i16, 0)
        };
        GlyphMetrics {
            bounds,
            format: if glyph >= COLOR_GLYPH {
                MaskFormat::Argb
            } else {
                MaskFormat::A8
            },
            has_path: glyph != 0 && !is_drawable(glyph),
            has_drawable: is_drawable(glyph),
        }
    }

    fn image(
        &self,
        _: &StrikeDescriptor,
        id: PackedGlyphId,
        metrics: &GlyphMetrics,
    ) -> Option<GlyphImage> {
        let mut image =
            GlyphImage::zeroed(metrics.bounds.width(), metrics.bounds.height(), metrics.format);
        // Distinct glyphs get distinct pixels so uploads can be told apart.
        image.data.fill(id.glyph_id() as u8 | 1);
        Some(image)
    }

    fn path(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<BezPath> {
        if glyph_id == 0 || is_drawable(glyph_id) {
            return None;
        }
        let side = f64::from(desc.size * 0.5);
        Some(atlas_text::kurbo::Rect::new(0.0, -side, side, 0.0).to_path(0.1))
    }

    fn drawable(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<Arc<dyn GlyphDrawable>> {
        is_drawable(glyph_id)
            .then(|| Arc::new(SquareDrawable { side: desc.size * 0.5 }) as Arc<dyn GlyphDrawable>)
    }
}

/// [`Squares`] whose mask bounds are outset by three pixels, the way a
/// scaler's rounding can make a glyph larger than its size predicts.
#[derive(Debug)]
pub(crate) struct Overshoot;

impl GlyphRasterizer for Overshoot {
    fn metrics(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> GlyphMetrics {
        let mut metrics = Squares.metrics(desc, id);
        if !metrics.bounds.is_empty() {
            metrics.bounds = metrics.bounds.outset(3);
        }
        metrics
    }

    fn image(
        &self,
        desc: &StrikeDescriptor,
        id: PackedGlyphId,
        metrics: &GlyphMetrics,
    ) -> Option<GlyphImage> {
        Squares.image(desc, id, metrics)
    }

    fn path(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<BezPath> {
        Squares.path(desc, glyph_id)
    }
}

#[derive(Debug)]
struct SquareDrawable {
    side: f32,
}

impl GlyphDrawable for SquareDrawable {
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

/// A configuration that never uses distance fields.
pub(crate) fn no_sdft() -> TextConfig {
    TextConfig {
        sdft: SdftConfig {
            able_to_use_sdft: false,
            ..SdftConfig::default()
        },
        ..TextConfig::default()
    }
}

/// A configuration that also draws text below 162px with distance fields.
pub(crate) fn small_sdft() -> TextConfig {
    TextConfig {
        sdft: SdftConfig {
            use_sdft_for_small_text: true,
            ..SdftConfig::default()
        },
        ..TextConfig::default()
    }
}

/// A single run of `glyphs` at `size`, one em apart on the baseline.
pub(crate) fn text(unique_id: u32, size: f32, glyphs: &[u16]) -> GlyphRunList {
    let positions = (0..glyphs.len())
        .map(|i| Point::new(i as f32 * size, size))
        .collect();
    let run = GlyphRun::new(Font::new(TypefaceId(7), size), glyphs.to_vec(), positions);
    GlyphRunList::new(unique_id, Point::new(10.0, 20.0), vec![run])
}

/// Kinds of the sub-runs of `container`, in order.
pub(crate) fn kinds(container: &SubRunContainer) -> Vec<SubRunType> {
    container.sub_runs().iter().map(|run| run.kind()).collect()
}

/// Positions of the mask vertices in `bytes`.
pub(crate) fn mask_positions(bytes: &[u8]) -> Vec<[f32; 2]> {
    bytes
        .chunks_exact(size_of::<Mask2DVertex>())
        .map(|chunk| bytemuck::pod_read_unaligned::<Mask2DVertex>(chunk).position)
        .collect()
}

/// A context with the canvas and draw list of the most recent draw.
#[derive(Debug)]
pub(crate) struct TestEnv {
    pub(crate) context: TextContext,
    pub(crate) canvas: CanvasRecorder,
    pub(crate) target: GlyphDrawList,
}

impl TestEnv {
    pub(crate) fn new(config: TextConfig) -> Self {
        Self::with_rasterizer(Arc::new(Squares), config)
    }

    pub(crate) fn with_rasterizer(rasterizer: Arc<dyn GlyphRasterizer>, config: TextConfig) -> Self {
        Self::with_scaler_cache(Arc::new(ScalerCache::new(rasterizer)), config)
    }

    pub(crate) fn with_scaler_cache(scaler_cache: Arc<ScalerCache>, config: TextConfig) -> Self {
        Self {
            context: TextContext::with_scaler_cache(scaler_cache, config),
            canvas: CanvasRecorder::default(),
            target: GlyphDrawList::new(),
        }
    }

    pub(crate) fn classify(&self, list: &GlyphRunList, view: &Matrix) -> SubRunContainer {
        self.context
            .make_container(list, &Paint::default(), view, CreationBehavior::AddSubRuns)
    }

    /// Draw `list`, replacing the canvas and draw list of the previous draw.
    pub(crate) fn draw(&mut self, list: &GlyphRunList, paint: &Paint, view: &Matrix) -> TextDrawStats {
        self.canvas = CanvasRecorder::new(*view);
        self.target = GlyphDrawList::new();
        self.context
            .draw_glyph_run_list(list, paint, view, None, &mut self.canvas, &mut self.target)
    }

    /// Draw `container` the way [`draw`](Self::draw) draws a list.
    pub(crate) fn draw_container(
        &mut self,
        container: &mut SubRunContainer,
        origin: Point,
        view: &Matrix,
    ) -> usize {
        self.canvas = CanvasRecorder::new(*view);
        self.target = GlyphDrawList::new();
        self.context.draw_container(
            container,
            origin,
            &Paint::default(),
            view,
            None,
            &mut self.canvas,
            &mut self.target,
        )
    }

    pub(crate) fn quads(&self) -> usize {
        self.target.all_draws().map(|draw| draw.quad_count).sum()
    }

    pub(crate) fn uploads(&self) -> usize {
        self.target.all_draws().map(|draw| draw.uploads.len()).sum()
    }

    pub(crate) fn positions(&self) -> Vec<[f32; 2]> {
        self.target
            .all_draws()
            .flat_map(|draw| mask_positions(&draw.vertices))
            .collect()
    }
}
