// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A [`GlyphRasterizer`] over real fonts: skrifa outlines rendered with Vello CPU.

use core::fmt;

use parking_lot::RwLock;
use skrifa::instance::{LocationRef, Size};
use skrifa::outline::{DrawSettings, OutlinePen};
use skrifa::{FontRef, GlyphId, MetadataProvider};
use vello_cpu::{Pixmap, RenderContext, color::palette::css::BLACK};

use super::{GlyphImage, GlyphMetrics, GlyphRasterizer, StrikeDescriptor};
use crate::geom::{GlyphRect, Matrix};
use crate::glyph::{MaskFormat, PackedGlyphId};
use crate::kurbo::{self, BezPath, Shape as _, Stroke, StrokeOpts};
use crate::paint::{BlurStyle, Edging, TypefaceId};
use crate::peniko::FontData;
use crate::{HashMap, new_map};

/// Flattening tolerance for strokes and dashes, in strike pixels.
const TOLERANCE: f64 = 0.1;

/// Fake bold stroke width as a fraction of the font size, at 9 and 36 pixels.
const EMBOLDEN_AT_9: f32 = 1.0 / 24.0;
const EMBOLDEN_AT_36: f32 = 1.0 / 32.0;

/// Rasterizes outline glyphs of registered fonts.
///
/// Only outlines are supported, so every glyph renders to an A8 mask (A565
/// for LCD strikes) and none of them has a drawable.
pub struct FontRasterizer {
    fonts: RwLock<HashMap<TypefaceId, FontData>>,
}

impl fmt::Debug for FontRasterizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontRasterizer")
            .field("fonts", &self.fonts.read().len())
            .finish_non_exhaustive()
    }
}

impl Default for FontRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FontRasterizer {
    /// Create a rasterizer with no fonts.
    pub fn new() -> Self {
        Self {
            fonts: RwLock::new(new_map()),
        }
    }

    /// Make `font` available as `typeface`, replacing any previous font.
    pub fn register(&self, typeface: TypefaceId, font: FontData) {
        self.fonts.write().insert(typeface, font);
    }

    /// Outline in strike space, before the sub-pixel offset.
    fn outline(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<BezPath> {
        let fonts = self.fonts.read();
        let font = fonts.get(&desc.typeface)?;
        let font_ref = FontRef::from_index(font.data.as_ref(), font.index).ok()?;
        let glyph = font_ref
            .outline_glyphs()
            .get(GlyphId::new(u32::from(glyph_id)))?;
        let mut pen = PathPen(BezPath::new());
        let settings = DrawSettings::unhinted(Size::new(1.0), LocationRef::default());
        glyph.draw(settings, &mut pen).ok()?;
        let em = pen.0;
        if em.elements().is_empty() {
            return None;
        }

        // Em units, y up, to source pixels, y down.
        let font_matrix = Matrix::from_row_major([
            desc.size * desc.scale_x,
            -desc.size * desc.skew_x,
            0.0,
            0.0,
            -desc.size,
            0.0,
            0.0,
            0.0,
            1.0,
        ]);
        let mut path = font_matrix.transform_path(&em);
        if desc.embolden {
            let width = embolden_width(desc.size);
            let stroked = kurbo::stroke(
                path.iter(),
                &Stroke::new(f64::from(width)),
                &StrokeOpts::default(),
                TOLERANCE,
            );
            path.extend(stroked.iter());
        }
        if let Some(frame) = &desc.frame {
            let mut style = Stroke::new(f64::from(frame.width.max(1.0 / 16.0)))
                .with_miter_limit(f64::from(frame.miter_limit))
                .with_join(frame.join)
                .with_caps(frame.cap);
            if let Some(dash) = &desc.dash {
                style = style.with_dashes(
                    f64::from(dash.phase),
                    dash.intervals.iter().map(|&v| f64::from(v)),
                );
            }
            let stroked = kurbo::stroke(path.iter(), &style, &StrokeOpts::default(), TOLERANCE);
            if frame.fill {
                path.extend(stroked.iter());
            } else {
                path = stroked;
            }
        } else if let Some(dash) = &desc.dash {
            let intervals: Vec<f64> = dash.intervals.iter().map(|&v| f64::from(v)).collect();
            path = kurbo::dash(path.iter(), f64::from(dash.phase), &intervals).collect();
        }
        Some(desc.device_matrix().transform_path(&path))
    }

    /// Outline in strike pixels, including the sub-pixel offset of `id`.
    fn positioned_outline(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> Option<BezPath> {
        let offset = id.subpixel_offset();
        let path = self.outline(desc, id.glyph_id())?;
        Some(Matrix::translate(offset.x, offset.y).transform_path(&path))
    }
}

impl GlyphRasterizer for FontRasterizer {
    fn metrics(&self, desc: &StrikeDescriptor, id: PackedGlyphId) -> GlyphMetrics {
        let format = if desc.is_lcd() {
            MaskFormat::A565
        } else {
            MaskFormat::A8
        };
        let Some(path) = self.positioned_outline(desc, id) else {
            return GlyphMetrics {
                format,
                ..GlyphMetrics::default()
            };
        };
        let mut bbox = path.bounding_box();
        if let Some(blur) = &desc.blur {
            let reach = f64::from(blur_radius(blur.sigma) * 3);
            bbox = bbox.inflate(reach, reach);
        }
        GlyphMetrics {
            bounds: glyph_rect_from(bbox),
            format,
            has_path: true,
            has_drawable: false,
        }
    }

    fn image(
        &self,
        desc: &StrikeDescriptor,
        id: PackedGlyphId,
        metrics: &GlyphMetrics,
    ) -> Option<GlyphImage> {
        let bounds = metrics.bounds;
        if bounds.is_empty() {
            return None;
        }
        let path = self.positioned_outline(desc, id)?;
        let (width, height) = (bounds.width(), bounds.height());

        let mut ctx = RenderContext::new(width, height);
        ctx.set_transform(kurbo::Affine::translate((
            -f64::from(bounds.left),
            -f64::from(bounds.top),
        )));
        ctx.set_paint(BLACK);
        ctx.fill_path(&path);
        ctx.flush();
        let mut pixmap = Pixmap::new(width, height);
        ctx.render_to_pixmap(&mut pixmap);

        let mut coverage: Vec<u8> = pixmap.data().iter().map(|px| px.a).collect();
        if desc.edging == Edging::Alias {
            for c in &mut coverage {
                *c = if *c >= 128 { 255 } else { 0 };
            }
        }
        if let Some(blur) = &desc.blur {
            coverage = blur_mask(
                &coverage,
                usize::from(width),
                usize::from(height),
                blur.style,
                blur_radius(blur.sigma),
            );
        }

        let data = match metrics.format {
            MaskFormat::A565 => coverage
                .iter()
                .flat_map(|&c| pack_565(c).to_le_bytes())
                .collect(),
            MaskFormat::A8 => coverage,
            MaskFormat::Argb => coverage.iter().flat_map(|&c| [0, 0, 0, c]).collect(),
        };
        Some(GlyphImage {
            width,
            height,
            format: metrics.format,
            data,
        })
    }

    fn path(&self, desc: &StrikeDescriptor, glyph_id: u16) -> Option<BezPath> {
        self.outline(desc, glyph_id)
    }
}

struct PathPen(BezPath);

impl OutlinePen for PathPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.0.move_to((x, y));
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.0.line_to((x, y));
    }

    fn quad_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        self.0.quad_to((cx, cy), (x, y));
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.0.curve_to((cx0, cy0), (cx1, cy1), (x, y));
    }

    fn close(&mut self) {
        self.0.close_path();
    }
}

fn embolden_width(size: f32) -> f32 {
    let t = ((size - 9.0) / (36.0 - 9.0)).clamp(0.0, 1.0);
    size * (EMBOLDEN_AT_9 + t * (EMBOLDEN_AT_36 - EMBOLDEN_AT_9))
}

/// Rounded-out bounds, or empty bounds if they do not fit `i16`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "values are range checked against i16 first"
)]
fn glyph_rect_from(bbox: kurbo::Rect) -> GlyphRect {
    let (l, t, r, b) = (bbox.x0.floor(), bbox.y0.floor(), bbox.x1.ceil(), bbox.y1.ceil());
    let range = f64::from(i16::MIN)..=f64::from(i16::MAX);
    if ![l, t, r, b].iter().all(|v| range.contains(v)) || l >= r || t >= b {
        return GlyphRect::EMPTY;
    }
    GlyphRect::new(l as i16, t as i16, r as i16, b as i16)
}

/// Box radius whose three passes approximate a gaussian of `sigma`.
#[expect(
    clippy::cast_possible_truncation,
    reason = "sigma is clamped to a small range"
)]
fn blur_radius(sigma: f32) -> i32 {
    if sigma.is_nan() || sigma <= 0.0 {
        return 0;
    }
    (sigma.min(256.0) * 0.94).round().max(1.0) as i32
}

fn blur_mask(mask: &[u8], width: usize, height: usize, style: BlurStyle, radius: i32) -> Vec<u8> {
    let mut blurred = mask.to_vec();
    if radius > 0 {
        for _ in 0..3 {
            blurred = box_blur(&blurred, width, height, radius, true);
            blurred = box_blur(&blurred, width, height, radius, false);
        }
    }
    let inv = |v: u8| 255 - u16::from(v);
    blurred
        .iter()
        .zip(mask)
        .map(|(&b, &m)| match style {
            BlurStyle::Normal => b,
            BlurStyle::Solid => b.max(m),
            BlurStyle::Outer => scale_u8(b, inv(m)),
            BlurStyle::Inner => scale_u8(b, u16::from(m)),
        })
        .collect()
}

#[expect(clippy::cast_possible_truncation, reason = "the product is at most 255")]
fn scale_u8(v: u8, scale: u16) -> u8 {
    ((u32::from(v) * u32::from(scale) + 127) / 255) as u8
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "the window average is at most 255"
)]
fn box_blur(src: &[u8], width: usize, height: usize, radius: i32, horizontal: bool) -> Vec<u8> {
    let (lines, len) = if horizontal {
        (height, width)
    } else {
        (width, height)
    };
    let index = |line: usize, i: usize| {
        if horizontal {
            line * width + i
        } else {
            i * width + line
        }
    };
    let r = radius.unsigned_abs() as usize;
    let window = (2 * r + 1) as u32;
    let mut dst = vec![0_u8; src.len()];
    for line in 0..lines {
        let mut sum = 0_u32;
        for i in 0..=r.min(len.saturating_sub(1)) {
            sum += u32::from(src[index(line, i)]);
        }
        for i in 0..len {
            dst[index(line, i)] = ((sum + window / 2) / window) as u8;
            if i + r + 1 < len {
                sum += u32::from(src[index(line, i + r + 1)]);
            }
            if i >= r {
                sum -= u32::from(src[index(line, i - r)]);
            }
        }
    }
    dst
}

fn pack_565(c: u8) -> u16 {
    let c = u16::from(c);
    ((c >> 3) << 11) | ((c >> 2) << 5) | (c >> 3)
}
