// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Classification of glyph runs into sub-runs.
//!
//! Every glyph of every run passes through a fixed sequence of stages, each
//! of which accepts the glyphs it can draw and hands the rest to the next:
//!
//! 1. Distance fields, for plain fills in the distance field size range.
//! 2. Direct masks, for glyphs that fit the atlas at device size.
//! 3. Drawables.
//! 4. Paths, for outline glyphs too large for the atlas.
//! 5. The drawing of last resort: masks rasterized at a reduced size that
//!    fits the atlas, then scaled up, which mostly catches large color glyphs.
//!
//! Glyphs without anything to draw are counted as dropped, so every glyph is
//! either in exactly one sub-run or in [`SubRunContainer::dropped_glyph_count`].

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::canvas::TextCanvas;
use crate::config::{ScalerContextFlags, SurfaceProps};
use crate::error::{Error, ErrorKind};
use crate::geom::{Matrix, Point, approximate_transformed_text_size};
use crate::glyph::MaskFormat;
use crate::glyph_run::{GlyphRun, GlyphRunList};
use crate::math::FloatExt;
use crate::paint::{Edging, Paint};
use crate::scaler::{
    MAX_BILERP_ATLAS_GLYPH_SIDE, MaskGlyph, ScalerCache, SourceGlyph, StrikeDescriptor,
    StrikeResolver,
};
use crate::sdft::SdftControl;
use crate::subrun::{
    DirectMaskSubRun, DrawableSubRun, PathSubRun, SdftSubRun, SubRun, TransformedMaskSubRun,
};

/// Upper bound on size reductions in the drawing of last resort.
const MAX_LAST_RESORT_ITERATIONS: usize = 8;

/// What classification produces.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CreationBehavior {
    /// Build sub-runs.
    AddSubRuns,
    /// Only create and measure the strikes, to warm a cache that another
    /// process will draw from.
    StrikeCalculationsOnly,
}

/// Device properties classification depends on.
#[derive(Copy, Clone, Debug)]
pub struct StrikeDeviceInfo {
    /// Surface properties.
    pub surface_props: SurfaceProps,
    /// Scaler flags for mask strikes.
    pub scaler_context_flags: ScalerContextFlags,
    /// Distance field policy.
    pub sdft_control: SdftControl,
}

/// The sub-runs built for one glyph run list.
#[derive(Debug)]
pub struct SubRunContainer {
    initial_position_matrix: Matrix,
    sub_runs: Vec<SubRun>,
    dropped_glyph_count: usize,
}

impl SubRunContainer {
    /// Create an empty container for `initial_position_matrix`.
    pub fn new(initial_position_matrix: Matrix) -> Self {
        Self {
            initial_position_matrix,
            sub_runs: Vec::new(),
            dropped_glyph_count: 0,
        }
    }

    /// Classify every glyph of `glyph_run_list`.
    ///
    /// `position_matrix` maps glyph positions, which are relative to the
    /// list's origin, to device space; that is the view matrix with the
    /// origin pre-translated.
    pub fn make(
        glyph_run_list: &GlyphRunList,
        position_matrix: &Matrix,
        paint: &Paint,
        device_info: &StrikeDeviceInfo,
        scaler_cache: &ScalerCache,
        behavior: CreationBehavior,
    ) -> Self {
        let mut builder = Builder {
            container: Self::new(*position_matrix),
            position_matrix,
            paint,
            device_info,
            scaler_cache,
            behavior,
            location: glyph_run_list.source_bounds().center(),
        };
        for run in glyph_run_list.runs() {
            builder.add_run(run);
        }
        let container = builder.container;
        log::debug!(
            "classified {} glyphs into {} sub-runs, {} dropped",
            glyph_run_list.glyph_count(),
            container.sub_runs.len(),
            container.dropped_glyph_count
        );
        container
    }

    /// The matrix the container was built for.
    pub fn initial_position_matrix(&self) -> &Matrix {
        &self.initial_position_matrix
    }

    /// The sub-runs, in drawing order.
    pub fn sub_runs(&self) -> &[SubRun] {
        &self.sub_runs
    }

    /// The sub-runs, mutably.
    pub fn sub_runs_mut(&mut self) -> &mut [SubRun] {
        &mut self.sub_runs
    }

    /// Whether there are no sub-runs.
    pub fn is_empty(&self) -> bool {
        self.sub_runs.is_empty()
    }

    /// Glyphs that had nothing to draw, a non-finite position, or never fit
    /// the atlas.
    pub fn dropped_glyph_count(&self) -> usize {
        self.dropped_glyph_count
    }

    /// Glyphs over all sub-runs.
    pub fn glyph_count(&self) -> usize {
        self.sub_runs.iter().map(SubRun::glyph_count).sum()
    }

    /// Whether any sub-run is a direct mask.
    pub fn has_direct_sub_runs(&self) -> bool {
        self.sub_runs
            .iter()
            .any(|run| matches!(run, SubRun::DirectMask(_)))
    }

    /// Whether every sub-run can be drawn with `paint` under
    /// `position_matrix`.
    pub fn can_reuse(&self, paint: &Paint, position_matrix: &Matrix) -> bool {
        self.sub_runs
            .iter()
            .all(|run| run.can_reuse(paint, position_matrix))
    }

    /// Draw the path and drawable sub-runs into `canvas`.
    pub fn draw(&self, canvas: &mut dyn TextCanvas, draw_origin: Point, paint: &Paint) {
        for run in &self.sub_runs {
            run.draw(canvas, draw_origin, paint);
        }
    }

    /// Serialize the container.
    ///
    /// An [empty](Self::is_empty) container is written like any other, but
    /// [`unflatten`](Self::unflatten) rejects it, so senders should skip
    /// text whose glyphs were all dropped.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_matrix(&self.initial_position_matrix);
        buffer.write_count(self.sub_runs.len());
        for run in &self.sub_runs {
            run.flatten(buffer);
        }
    }

    /// Read a container written by [`flatten`](Self::flatten).
    ///
    /// Any malformed sub-run fails the whole read.
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let initial_position_matrix = buffer.read_matrix()?;
        let count = buffer.read_u32()?;
        // Every sub-run takes at least a tag and a glyph count.
        let plausible = count > 0 && (count as usize).saturating_mul(5) <= buffer.available();
        buffer.validate_value(plausible, ErrorKind::InvalidSubRunCount, u64::from(count))?;
        let mut sub_runs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            sub_runs.push(SubRun::unflatten(buffer, resolver)?);
        }
        Ok(Self {
            initial_position_matrix,
            sub_runs,
            dropped_glyph_count: 0,
        })
    }
}

struct Builder<'a> {
    container: SubRunContainer,
    position_matrix: &'a Matrix,
    paint: &'a Paint,
    device_info: &'a StrikeDeviceInfo,
    scaler_cache: &'a ScalerCache,
    behavior: CreationBehavior,
    location: Point,
}

impl Builder<'_> {
    fn add_sub_runs(&self) -> bool {
        self.behavior == CreationBehavior::AddSubRuns
    }

    fn push(&mut self, run: Option<SubRun>) {
        if let Some(run) = run {
            self.container.sub_runs.push(run);
        }
    }

    fn add_run(&mut self, run: &GlyphRun) {
        let m = self.position_matrix;
        let font = &run.font;
        let props = &self.device_info.surface_props;
        let control = &self.device_info.sdft_control;
        let mut source: Vec<SourceGlyph> = run
            .glyphs()
            .map(|(id, position)| SourceGlyph { id, position })
            .collect();

        let approximate_size = approximate_transformed_text_size(font.size, m, self.location);

        if !self.paint.is_hairline() && approximate_size < control.max_size() {
            if !source.is_empty() && control.is_sdft(approximate_size, self.paint, m) {
                let (df_font, strike_to_source, range) = control.sdf_font(font, m, self.location);
                if !strike_to_source.is_nearly_zero() {
                    let desc = StrikeDescriptor::sdft(&df_font, self.paint, props, strike_to_source);
                    let strike = self.scaler_cache.find_or_create_strike(&desc);
                    let prepared = strike.prepare_for_sdft_drawing(&source);
                    self.container.dropped_glyph_count += prepared.dropped;
                    source = prepared.rejected;
                    if self.add_sub_runs() {
                        let run =
                            SdftSubRun::new(font, &prepared.accepted, strike, strike_to_source, range);
                        self.push(run.map(SubRun::Sdft));
                    }
                }
            }

            if !source.is_empty() && !m.has_perspective() {
                let desc = StrikeDescriptor::mask(
                    font,
                    self.paint,
                    props,
                    self.device_info.scaler_context_flags,
                    m,
                );
                let strike = self.scaler_cache.find_or_create_strike(&desc);
                let prepared = strike.prepare_for_direct_mask_drawing(m, &source);
                self.container.dropped_glyph_count += prepared.dropped;
                source = prepared.rejected;
                if prepared.excluded > 0 {
                    log::debug!(
                        "{} glyphs too far from the origin for direct masks",
                        prepared.excluded
                    );
                }
                if self.add_sub_runs() {
                    let excluded = prepared.excluded > 0;
                    for (format, glyphs) in by_mask_format(&prepared.accepted) {
                        let run =
                            DirectMaskSubRun::new(m, glyphs, strike.clone(), format, excluded);
                        self.push(run.map(SubRun::DirectMask));
                    }
                }
            }
        }

        if !source.is_empty() {
            let (desc, strike_to_source) = StrikeDescriptor::path(font, props);
            if !strike_to_source.is_nearly_zero() {
                let strike = self.scaler_cache.find_or_create_strike(&desc);
                let prepared = strike.prepare_for_drawable_drawing(&source);
                self.container.dropped_glyph_count += prepared.dropped;
                source = prepared.rejected;
                if self.add_sub_runs() {
                    let run = DrawableSubRun::new(prepared.accepted, strike, strike_to_source);
                    self.push(run.map(SubRun::Drawable));
                }
            }
        }

        if !source.is_empty() {
            let (desc, strike_to_source) = StrikeDescriptor::path(font, props);
            if !strike_to_source.is_nearly_zero() {
                let strike = self.scaler_cache.find_or_create_strike(&desc);
                let prepared = strike.prepare_for_path_drawing(&source);
                self.container.dropped_glyph_count += prepared.dropped;
                source = prepared.rejected;
                if self.add_sub_runs() {
                    let anti_alias = font.edging != Edging::Alias;
                    let run = PathSubRun::new(prepared.accepted, strike, strike_to_source, anti_alias);
                    self.push(run.map(SubRun::Path));
                }
            }
        }

        if !source.is_empty() && !approximate_size.is_nearly_zero() {
            source = self.draw_last_resort(run, source);
        }

        if !source.is_empty() {
            log::warn!(
                "dropping {} glyphs of typeface {} at size {} that no technique can draw",
                source.len(),
                font.typeface.0,
                font.size
            );
            self.container.dropped_glyph_count += source.len();
        }
    }

    /// Rasterize the remaining glyphs at a scale whose largest glyph fits the
    /// atlas with a bilerp border, and draw them as transformed masks.
    ///
    /// The scaler rounds glyph bounds, so one proportional reduction can
    /// still overshoot; the scale is measured and reduced again until it
    /// fits, a bounded number of times. Returns the glyphs still rejected.
    fn draw_last_resort(&mut self, run: &GlyphRun, source: Vec<SourceGlyph>) -> Vec<SourceGlyph> {
        let m = self.position_matrix;
        let font = &run.font;
        let props = &self.device_info.surface_props;
        let flags = self.device_info.scaler_context_flags;
        let ids: Vec<u16> = source.iter().map(|g| g.id).collect();
        let max_side = f32::from(MAX_BILERP_ATLAS_GLYPH_SIDE);

        let mut scale = if m.has_perspective() {
            let area = m.differential_area_scale(self.location);
            if area.is_finite() && !area.is_nearly_zero() {
                area.sqrt()
            } else {
                1.0
            }
        } else {
            m.max_scale()
        };
        if !(scale.is_finite() && scale > 0.0) {
            scale = 1.0;
        }

        let descriptor = |scale: f32| {
            StrikeDescriptor::transform_mask(
                font,
                self.paint,
                props,
                flags,
                &Matrix::scale(scale, scale),
            )
        };
        let max_dimension = |scale: f32| {
            let strike = self.scaler_cache.find_or_create_strike(&descriptor(scale));
            match strike.find_maximum_glyph_dimension(&ids) {
                // The scaler reports nothing for glyphs beyond what it can
                // measure.
                0 => f32::from(u16::MAX),
                dimension => f32::from(dimension),
            }
        };

        let mut dimension = max_dimension(scale);
        let mut iterations = 0;
        while dimension > max_side && iterations < MAX_LAST_RESORT_ITERATIONS {
            scale *= max_side / dimension;
            dimension = max_dimension(scale);
            iterations += 1;
        }
        log::debug!(
            "last resort scale {scale} after {iterations} reductions, largest glyph {dimension}"
        );

        let strike = self.scaler_cache.find_or_create_strike(&descriptor(scale));
        let prepared = strike.prepare_for_mask_drawing(&source);
        self.container.dropped_glyph_count += prepared.dropped;
        if self.add_sub_runs() {
            for (format, glyphs) in by_mask_format(&prepared.accepted) {
                let run = TransformedMaskSubRun::new(m, glyphs, strike.clone(), 1.0 / scale, format);
                self.push(run.map(SubRun::TransformedMask));
            }
        }
        prepared.rejected
    }
}

/// Split `glyphs` into maximal runs of one mask format, keeping order.
fn by_mask_format(glyphs: &[MaskGlyph]) -> impl Iterator<Item = (MaskFormat, &[MaskGlyph])> + '_ {
    glyphs
        .chunk_by(|a, b| a.format == b.format)
        .map(|chunk| (chunk[0].format, chunk))
}
