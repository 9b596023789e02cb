// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyphs that draw themselves, such as layered color glyphs.

use std::sync::Arc;

use super::read_strike_to_source;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::canvas::TextCanvas;
use crate::error::{Error, ErrorKind};
use crate::geom::{Matrix, Point};
use crate::glyph::PackedGlyphId;
use crate::paint::Paint;
use crate::scaler::{DrawableGlyph, ScalerStrike, StrikeDescriptor, StrikeResolver};

/// Drawables in strike space, each drawn into its own layer.
#[derive(Debug)]
pub struct DrawableSubRun {
    strike: Arc<ScalerStrike>,
    drawables: Vec<DrawableGlyph>,
    strike_to_source: f32,
}

impl DrawableSubRun {
    /// Build from glyphs accepted for drawable drawing.
    pub fn new(
        accepted: Vec<DrawableGlyph>,
        strike: Arc<ScalerStrike>,
        strike_to_source: f32,
    ) -> Option<Self> {
        if accepted.is_empty() {
            return None;
        }
        Some(Self {
            strike,
            drawables: accepted,
            strike_to_source,
        })
    }

    /// Number of glyphs.
    pub fn glyph_count(&self) -> usize {
        self.drawables.len()
    }

    /// The strike descriptor.
    pub fn descriptor(&self) -> &StrikeDescriptor {
        self.strike.descriptor()
    }

    /// Draw every glyph inside a layer composited with `paint`.
    pub fn draw(&self, canvas: &mut dyn TextCanvas, draw_origin: Point, paint: &Paint) {
        let strike_to_source = Matrix::scale(self.strike_to_source, self.strike_to_source)
            .post_translate(draw_origin.x, draw_origin.y);
        for glyph in &self.drawables {
            let matrix = strike_to_source.post_translate(glyph.position.x, glyph.position.y);
            let bounds = matrix.map_rect(&glyph.drawable.bounds());
            canvas.save_layer(Some(bounds), paint);
            glyph.drawable.draw(canvas, &matrix);
            canvas.restore();
        }
    }

    /// Serialize the sub-run, without its tag.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        self.strike.descriptor().flatten(buffer);
        buffer.write_f32(self.strike_to_source);
        buffer.write_count(self.drawables.len());
        for glyph in &self.drawables {
            buffer.write_u32(PackedGlyphId::new(glyph.id).to_bits());
            buffer.write_point(glyph.position);
        }
    }

    /// Read a sub-run written by [`flatten`](Self::flatten), fetching the
    /// drawables again from the resolved strike.
    pub fn unflatten(buffer: &mut ReadBuffer<'_>, resolver: &dyn StrikeResolver) -> Result<Self, Error> {
        let descriptor = StrikeDescriptor::unflatten(buffer)?;
        let strike = resolver.resolve_strike(&descriptor);
        buffer.validate(strike.is_some(), ErrorKind::UnknownStrike)?;
        let strike_to_source = read_strike_to_source(buffer)?;
        let count = buffer.check_glyph_count(4 + 8)?;
        let Some(strike) = strike else {
            return Err(Error::new(ErrorKind::UnknownStrike, buffer.offset()));
        };
        let mut drawables = Vec::with_capacity(count);
        for _ in 0..count {
            let id = PackedGlyphId::from_bits(buffer.read_u32()?).glyph_id();
            let position = buffer.read_point()?;
            let drawable = strike.drawable(id);
            buffer.validate_value(drawable.is_some(), ErrorKind::MissingGlyphData, u64::from(id))?;
            if let Some(drawable) = drawable {
                drawables.push(DrawableGlyph {
                    id,
                    position,
                    drawable,
                });
            }
        }
        Ok(Self {
            strike,
            drawables,
            strike_to_source,
        })
    }
}
