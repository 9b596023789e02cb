// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyphs drawn as outlines.

use std::sync::Arc;

use super::read_strike_to_source;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::canvas::TextCanvas;
use crate::error::{Error, ErrorKind};
use crate::geom::{Matrix, Point};
use crate::glyph::PackedGlyphId;
use crate::paint::{MaskFilter, Paint};
use crate::scaler::{PathGlyph, ScalerStrike, StrikeDescriptor, StrikeResolver};

/// Outlines in strike space, scaled to source space when drawn.
#[derive(Debug)]
pub struct PathSubRun {
    strike: Arc<ScalerStrike>,
    paths: Vec<PathGlyph>,
    strike_to_source: f32,
    anti_alias: bool,
}

impl PathSubRun {
    /// Build from glyphs accepted for path drawing.
    pub fn new(
        accepted: Vec<PathGlyph>,
        strike: Arc<ScalerStrike>,
        strike_to_source: f32,
        anti_alias: bool,
    ) -> Option<Self> {
        if accepted.is_empty() {
            return None;
        }
        Some(Self {
            strike,
            paths: accepted,
            strike_to_source,
            anti_alias,
        })
    }

    /// Number of glyphs.
    pub fn glyph_count(&self) -> usize {
        self.paths.len()
    }

    /// The path strike descriptor.
    pub fn descriptor(&self) -> &StrikeDescriptor {
        self.strike.descriptor()
    }

    /// Draw every outline.
    ///
    /// Paints whose look depends on the device transform get outlines mapped
    /// to device space. Otherwise the canvas applies the strike scale, and a
    /// blur sigma is divided by it so the blur keeps its device radius.
    pub fn draw(&self, canvas: &mut dyn TextCanvas, draw_origin: Point, paint: &Paint) {
        let mut run_paint = paint.clone();
        run_paint.anti_alias = self.anti_alias;
        let strike_to_source = Matrix::scale(self.strike_to_source, self.strike_to_source)
            .post_translate(draw_origin.x, draw_origin.y);

        if !paint.needs_exact_ctm() {
            if let Some(MaskFilter::Blur { sigma, .. }) = &mut run_paint.mask_filter {
                *sigma /= self.strike_to_source;
            }
            for glyph in &self.paths {
                let path_matrix = strike_to_source.post_translate(glyph.position.x, glyph.position.y);
                canvas.save();
                canvas.concat(&path_matrix);
                canvas.draw_path(&glyph.path, &run_paint);
                canvas.restore();
            }
        } else {
            for glyph in &self.paths {
                let path_matrix = strike_to_source.post_translate(glyph.position.x, glyph.position.y);
                canvas.draw_path(&path_matrix.transform_path(&glyph.path), &run_paint);
            }
        }
    }

    /// Serialize the sub-run, without its tag.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        self.strike.descriptor().flatten(buffer);
        buffer.write_f32(self.strike_to_source);
        buffer.write_bool(self.anti_alias);
        buffer.write_count(self.paths.len());
        for glyph in &self.paths {
            buffer.write_u32(PackedGlyphId::new(glyph.id).to_bits());
            buffer.write_point(glyph.position);
        }
    }

    /// Read a sub-run written by [`flatten`](Self::flatten), fetching the
    /// outlines again from the resolved strike.
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let descriptor = StrikeDescriptor::unflatten(buffer)?;
        let strike = resolver.resolve_strike(&descriptor);
        buffer.validate(strike.is_some(), ErrorKind::UnknownStrike)?;
        let strike_to_source = read_strike_to_source(buffer)?;
        let anti_alias = buffer.read_bool()?;
        let count = buffer.check_glyph_count(4 + 8)?;
        let Some(strike) = strike else {
            return Err(Error::new(ErrorKind::UnknownStrike, buffer.offset()));
        };
        let mut paths = Vec::with_capacity(count);
        for _ in 0..count {
            let id = PackedGlyphId::from_bits(buffer.read_u32()?).glyph_id();
            let position = buffer.read_point()?;
            let path = strike.path(id);
            buffer.validate_value(path.is_some(), ErrorKind::MissingGlyphData, u64::from(id))?;
            if let Some(path) = path {
                paths.push(PathGlyph { id, position, path });
            }
        }
        Ok(Self {
            strike,
            paths,
            strike_to_source,
            anti_alias,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{CanvasCommand, CanvasRecorder};
    use crate::config::SurfaceProps;
    use crate::kurbo::Shape;
    use crate::paint::{BlurStyle, Font, PaintStyle, TypefaceId};
    use crate::scaler::{ScalerCache, SourceGlyph};
    use crate::subrun::testing::scaler_cache;

    fn build(cache: &ScalerCache) -> PathSubRun {
        let (desc, strike_to_source) =
            StrikeDescriptor::path(&Font::new(TypefaceId(1), 128.0), &SurfaceProps::default());
        assert_eq!(strike_to_source, 2.0);
        let strike = cache.find_or_create_strike(&desc);
        let prepared = strike.prepare_for_path_drawing(&[
            SourceGlyph {
                id: 1,
                position: Point::new(0.0, 100.0),
            },
            SourceGlyph {
                id: 2,
                position: Point::new(70.0, 100.0),
            },
        ]);
        PathSubRun::new(prepared.accepted, strike, strike_to_source, true).unwrap()
    }

    #[test]
    fn blurred_paths_leave_the_matrix_to_the_canvas() {
        let cache = scaler_cache();
        let run = build(&cache);
        let paint = Paint {
            mask_filter: Some(MaskFilter::Blur {
                style: BlurStyle::Normal,
                sigma: 4.0,
            }),
            ..Paint::default()
        };
        let mut canvas = CanvasRecorder::default();
        run.draw(&mut canvas, Point::new(10.0, 0.0), &paint);

        let draws: Vec<_> = canvas
            .commands
            .iter()
            .filter_map(|c| match c {
                CanvasCommand::DrawPath { paint, matrix, .. } => Some((paint.blur(), *matrix)),
                _ => None,
            })
            .collect();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].0, Some((BlurStyle::Normal, 2.0)), "sigma is in strike space");
        assert_eq!(draws[1].1.map_xy(0.0, 0.0), Point::new(80.0, 100.0));
        assert_eq!(draws[1].1.scale_x(), 2.0);
        assert_eq!(canvas.save_count(), 0);
    }

    #[test]
    fn exact_ctm_paths_are_pretransformed() {
        let cache = scaler_cache();
        let run = build(&cache);
        let paint = Paint {
            style: PaintStyle::Stroke(crate::kurbo::Stroke::new(1.0)),
            ..Paint::default()
        };
        let mut canvas = CanvasRecorder::default();
        run.draw(&mut canvas, Point::ZERO, &paint);
        assert_eq!(canvas.commands.len(), 2, "no save or concat");
        let (path, matrix) = canvas.paths().next().unwrap();
        assert_eq!(*matrix, Matrix::IDENTITY);
        // A 64px strike square of side 32, doubled.
        let bounds = path.bounding_box();
        assert_eq!((bounds.x0, bounds.y0, bounds.x1, bounds.y1), (0.0, 36.0, 64.0, 100.0));
    }

    #[test]
    fn flatten_refetches_outlines() {
        let cache = scaler_cache();
        let run = build(&cache);
        let mut buffer = WriteBuffer::new();
        run.flatten(&mut buffer);
        let bytes = buffer.into_bytes();
        let read = PathSubRun::unflatten(&mut ReadBuffer::new(&bytes), &cache).unwrap();
        assert_eq!(read.glyph_count(), 2);
        assert_eq!(read.paths[1].position, Point::new(70.0, 100.0));
        assert_eq!(read.descriptor(), run.descriptor());
    }
}
