// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Strike descriptors: everything that determines how a strike's glyphs look.

use core::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::config::{PixelGeometry, ScalerContextFlags, SurfaceProps};
use crate::error::{Error, ErrorKind};
use crate::geom::{Matrix, Point};
use crate::glyph::AxisAlignment;
use crate::kurbo::{Cap, Join};
use crate::paint::{BlurStyle, Edging, Font, Paint, PaintStyle, PathEffect, TypefaceId};

/// Size path strikes are normalized to when the requested size is larger.
pub const CANONICAL_PATH_SIZE: f32 = 64.0;

/// What a strike produces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StrikeKind {
    /// Coverage or color masks.
    Mask,
    /// Signed distance fields built from A8 masks.
    Sdf,
    /// Outlines and drawables.
    Path,
}

impl StrikeKind {
    fn to_u8(self) -> u8 {
        match self {
            Self::Mask => 0,
            Self::Sdf => 1,
            Self::Path => 2,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Mask,
            1 => Self::Sdf,
            2 => Self::Path,
            _ => return None,
        })
    }
}

/// Stroke applied to outlines before rasterizing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frame {
    /// Stroke width in strike space. Zero is a hairline.
    pub width: f32,
    /// Miter limit.
    pub miter_limit: f32,
    /// Corner join.
    pub join: Join,
    /// Cap at open ends.
    pub cap: Cap,
    /// Whether the interior is filled too.
    pub fill: bool,
}

/// Dash pattern applied to outlines before stroking.
#[derive(Clone, Debug, PartialEq)]
pub struct Dash {
    /// On/off lengths in strike space.
    pub intervals: SmallVec<[f32; 4]>,
    /// Offset into the pattern.
    pub phase: f32,
}

/// Gaussian blur applied to masks.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Blur {
    /// Falloff style.
    pub style: BlurStyle,
    /// Standard deviation in device pixels.
    pub sigma: f32,
}

/// How subpixel positions are rounded for a strike.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RoundingSpec {
    /// Added to device positions before flooring.
    pub half_axis_sample_freq: Point,
    /// Axes that carry sub-pixel buckets, or `None` if positions are whole pixels.
    pub subpixel_axes: Option<AxisAlignment>,
}

/// The full recipe for a strike's glyphs.
///
/// Two descriptors are equal when every float matches bit for bit; there is
/// no tolerance because equal descriptors must produce identical masks.
#[derive(Clone, Debug)]
pub struct StrikeDescriptor {
    /// Typeface.
    pub typeface: TypefaceId,
    /// Size in pixels per em, before `matrix`.
    pub size: f32,
    /// Horizontal stretch.
    pub scale_x: f32,
    /// Horizontal skew.
    pub skew_x: f32,
    /// Device 2x2 transform as `[sx, kx, ky, sy]`.
    pub matrix: [f32; 4],
    /// Edge rendering.
    pub edging: Edging,
    /// Whether glyphs are rendered at sub-pixel offsets.
    pub subpixel: bool,
    /// Axis carrying sub-pixel offsets.
    pub axis_alignment: AxisAlignment,
    /// Synthetic bold.
    pub embolden: bool,
    /// Stroke, if any.
    pub frame: Option<Frame>,
    /// Dash, if any.
    pub dash: Option<Dash>,
    /// Blur, if any.
    pub blur: Option<Blur>,
    /// Sub-pixel layout for LCD masks.
    pub pixel_geometry: PixelGeometry,
    /// Coverage adjustments.
    pub flags: ScalerContextFlags,
    /// What the strike produces.
    pub kind: StrikeKind,
}

impl StrikeDescriptor {
    /// A mask strike whose glyphs are rendered under `matrix`.
    pub fn mask(
        font: &Font,
        paint: &Paint,
        props: &SurfaceProps,
        flags: ScalerContextFlags,
        matrix: &Matrix,
    ) -> Self {
        let edging = match font.edging {
            Edging::SubpixelAntiAlias if props.pixel_geometry == PixelGeometry::Unknown => {
                Edging::AntiAlias
            }
            edging => edging,
        };
        Self {
            typeface: font.typeface,
            size: font.size,
            scale_x: font.scale_x,
            skew_x: font.skew_x,
            matrix: [
                matrix.scale_x(),
                matrix.skew_x(),
                matrix.skew_y(),
                matrix.scale_y(),
            ],
            edging,
            subpixel: font.subpixel,
            axis_alignment: axis_alignment_for(matrix),
            embolden: font.embolden,
            frame: frame_for(paint, 1.0),
            dash: dash_for(paint, 1.0),
            blur: paint.blur().map(|(style, sigma)| Blur {
                style,
                sigma: sigma * matrix.max_scale().max(0.0),
            }),
            pixel_geometry: props.pixel_geometry,
            flags,
            kind: StrikeKind::Mask,
        }
    }

    /// A mask strike for glyphs that will be drawn transformed, so sub-pixel
    /// positioning and LCD coverage are turned off.
    pub fn transform_mask(
        font: &Font,
        paint: &Paint,
        props: &SurfaceProps,
        flags: ScalerContextFlags,
        matrix: &Matrix,
    ) -> Self {
        let mut desc = Self::mask(font, paint, props, flags, matrix);
        desc.subpixel = false;
        if desc.edging == Edging::SubpixelAntiAlias {
            desc.edging = Edging::AntiAlias;
        }
        desc
    }

    /// A distance field strike for `df_font`, which is already at the
    /// distance field size. Stroke and dash lengths are scaled into strike
    /// space.
    pub fn sdft(df_font: &Font, paint: &Paint, props: &SurfaceProps, strike_to_source: f32) -> Self {
        let mut desc = Self::mask(
            df_font,
            paint,
            props,
            ScalerContextFlags::empty(),
            &Matrix::IDENTITY,
        );
        desc.frame = frame_for(paint, strike_to_source);
        desc.dash = dash_for(paint, strike_to_source);
        desc.blur = None;
        desc.subpixel = false;
        desc.kind = StrikeKind::Sdf;
        desc
    }

    /// A path strike for `font`, returning the scale from strike space back
    /// to source space.
    pub fn path(font: &Font, props: &SurfaceProps) -> (Self, f32) {
        let (size, strike_to_source) = if font.size > CANONICAL_PATH_SIZE {
            (CANONICAL_PATH_SIZE, font.size / CANONICAL_PATH_SIZE)
        } else {
            (font.size, 1.0)
        };
        let desc = Self {
            typeface: font.typeface,
            size,
            scale_x: font.scale_x,
            skew_x: font.skew_x,
            matrix: [1.0, 0.0, 0.0, 1.0],
            edging: Edging::AntiAlias,
            subpixel: false,
            axis_alignment: AxisAlignment::None,
            embolden: font.embolden,
            frame: None,
            dash: None,
            blur: None,
            pixel_geometry: props.pixel_geometry,
            flags: ScalerContextFlags::empty(),
            kind: StrikeKind::Path,
        };
        (desc, strike_to_source)
    }

    /// The device 2x2 transform as a matrix.
    pub fn device_matrix(&self) -> Matrix {
        let [sx, kx, ky, sy] = self.matrix;
        Matrix::from_row_major([sx, kx, 0.0, ky, sy, 0.0, 0.0, 0.0, 1.0])
    }

    /// Transform from em units to strike pixels, y down.
    pub fn glyph_matrix(&self) -> Matrix {
        let font = Matrix::from_row_major([
            self.size * self.scale_x,
            self.size * self.skew_x,
            0.0,
            0.0,
            self.size,
            0.0,
            0.0,
            0.0,
            1.0,
        ]);
        self.device_matrix() * font
    }

    /// How device positions are rounded for glyphs of this strike.
    pub fn rounding_spec(&self) -> RoundingSpec {
        const HALF: f32 = 0.5;
        const SUBPIXEL_ROUND: f32 = 1.0 / 8.0;
        if !self.subpixel {
            return RoundingSpec {
                half_axis_sample_freq: Point::new(HALF, HALF),
                subpixel_axes: None,
            };
        }
        let half_axis_sample_freq = match self.axis_alignment {
            AxisAlignment::X => Point::new(SUBPIXEL_ROUND, HALF),
            AxisAlignment::Y => Point::new(HALF, SUBPIXEL_ROUND),
            AxisAlignment::None => Point::new(SUBPIXEL_ROUND, SUBPIXEL_ROUND),
        };
        RoundingSpec {
            half_axis_sample_freq,
            subpixel_axes: Some(self.axis_alignment),
        }
    }

    /// Whether glyph masks carry per-channel coverage.
    pub fn is_lcd(&self) -> bool {
        self.edging == Edging::SubpixelAntiAlias
    }

    /// Serialize the descriptor.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_u32(self.typeface.0);
        buffer.write_f32(self.size);
        buffer.write_f32(self.scale_x);
        buffer.write_f32(self.skew_x);
        for v in self.matrix {
            buffer.write_f32(v);
        }
        buffer.write_u8(self.edging.to_u8());
        buffer.write_bool(self.subpixel);
        buffer.write_u8(self.axis_alignment.to_u8());
        buffer.write_bool(self.embolden);
        buffer.write_bool(self.frame.is_some());
        if let Some(frame) = &self.frame {
            buffer.write_f32(frame.width);
            buffer.write_f32(frame.miter_limit);
            buffer.write_u8(join_to_u8(frame.join));
            buffer.write_u8(cap_to_u8(frame.cap));
            buffer.write_bool(frame.fill);
        }
        buffer.write_bool(self.dash.is_some());
        if let Some(dash) = &self.dash {
            buffer.write_count(dash.intervals.len());
            for &v in &dash.intervals {
                buffer.write_f32(v);
            }
            buffer.write_f32(dash.phase);
        }
        buffer.write_bool(self.blur.is_some());
        if let Some(blur) = &self.blur {
            buffer.write_u8(blur.style.to_u8());
            buffer.write_f32(blur.sigma);
        }
        buffer.write_u8(self.pixel_geometry.to_u8());
        buffer.write_u8(self.flags.bits());
        buffer.write_u8(self.kind.to_u8());
    }

    /// Read a descriptor written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>) -> Result<Self, Error> {
        let typeface = TypefaceId(buffer.read_u32()?);
        let size = buffer.read_f32()?;
        let scale_x = buffer.read_f32()?;
        let skew_x = buffer.read_f32()?;
        let mut matrix = [0.0; 4];
        for v in &mut matrix {
            *v = buffer.read_f32()?;
        }
        let edging = decode(buffer, Edging::from_u8)?;
        let subpixel = buffer.read_bool()?;
        let axis_alignment = decode(buffer, AxisAlignment::from_u8)?;
        let embolden = buffer.read_bool()?;
        let frame = if buffer.read_bool()? {
            Some(Frame {
                width: buffer.read_f32()?,
                miter_limit: buffer.read_f32()?,
                join: decode(buffer, join_from_u8)?,
                cap: decode(buffer, cap_from_u8)?,
                fill: buffer.read_bool()?,
            })
        } else {
            None
        };
        let dash = if buffer.read_bool()? {
            let count = buffer.read_u32()? as usize;
            buffer.validate(
                count.saturating_mul(4) <= buffer.available(),
                ErrorKind::InvalidDescriptor,
            )?;
            let mut intervals = SmallVec::with_capacity(count);
            for _ in 0..count {
                intervals.push(buffer.read_f32()?);
            }
            Some(Dash {
                intervals,
                phase: buffer.read_f32()?,
            })
        } else {
            None
        };
        let blur = if buffer.read_bool()? {
            Some(Blur {
                style: decode(buffer, BlurStyle::from_u8)?,
                sigma: buffer.read_f32()?,
            })
        } else {
            None
        };
        let pixel_geometry = decode(buffer, PixelGeometry::from_u8)?;
        let flags = decode(buffer, ScalerContextFlags::from_bits)?;
        let kind = decode(buffer, StrikeKind::from_u8)?;
        Ok(Self {
            typeface,
            size,
            scale_x,
            skew_x,
            matrix,
            edging,
            subpixel,
            axis_alignment,
            embolden,
            frame,
            dash,
            blur,
            pixel_geometry,
            flags,
            kind,
        })
    }

    /// Every field as 32-bit words, for hashing and equality.
    fn key_words(&self) -> SmallVec<[u32; 32]> {
        let mut words = SmallVec::new();
        words.push(self.typeface.0);
        words.push(self.size.to_bits());
        words.push(self.scale_x.to_bits());
        words.push(self.skew_x.to_bits());
        words.extend(self.matrix.iter().map(|v| v.to_bits()));
        words.push(
            u32::from(self.edging.to_u8())
                | u32::from(self.subpixel) << 8
                | u32::from(self.axis_alignment.to_u8()) << 16
                | u32::from(self.embolden) << 24,
        );
        words.push(
            u32::from(self.pixel_geometry.to_u8())
                | u32::from(self.flags.bits()) << 8
                | u32::from(self.kind.to_u8()) << 16,
        );
        match &self.frame {
            Some(frame) => words.extend([
                1,
                frame.width.to_bits(),
                frame.miter_limit.to_bits(),
                u32::from(join_to_u8(frame.join))
                    | u32::from(cap_to_u8(frame.cap)) << 8
                    | u32::from(frame.fill) << 16,
            ]),
            None => words.push(0),
        }
        match &self.dash {
            Some(dash) => {
                words.push(u32::try_from(dash.intervals.len()).unwrap_or(u32::MAX));
                words.extend(dash.intervals.iter().map(|v| v.to_bits()));
                words.push(dash.phase.to_bits());
            }
            None => words.push(u32::MAX),
        }
        match &self.blur {
            Some(blur) => words.extend([u32::from(blur.style.to_u8()) + 1, blur.sigma.to_bits()]),
            None => words.push(0),
        }
        words
    }
}

impl PartialEq for StrikeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key_words() == other.key_words()
    }
}

impl Eq for StrikeDescriptor {}

impl Hash for StrikeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key_words().hash(state);
    }
}

fn decode<T>(buffer: &mut ReadBuffer<'_>, f: impl FnOnce(u8) -> Option<T>) -> Result<T, Error> {
    let raw = buffer.read_u8()?;
    let value = f(raw);
    buffer.validate_value(value.is_some(), ErrorKind::InvalidDescriptor, u64::from(raw))?;
    value.ok_or_else(|| Error::new(ErrorKind::InvalidDescriptor, buffer.offset()))
}

/// Glyphs laid out along x get sub-pixel x positions only, and likewise for y.
fn axis_alignment_for(matrix: &Matrix) -> AxisAlignment {
    if matrix.has_perspective() {
        AxisAlignment::None
    } else if matrix.skew_y() == 0.0 {
        AxisAlignment::X
    } else if matrix.scale_x() == 0.0 {
        AxisAlignment::Y
    } else {
        AxisAlignment::None
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "stroke parameters are stored as f32 like the rest of the descriptor"
)]
fn frame_for(paint: &Paint, strike_to_source: f32) -> Option<Frame> {
    let (stroke, fill) = match &paint.style {
        PaintStyle::Fill => return None,
        PaintStyle::Stroke(stroke) => (stroke, false),
        PaintStyle::StrokeAndFill(stroke) => (stroke, true),
    };
    Some(Frame {
        width: stroke.width as f32 / strike_to_source,
        miter_limit: stroke.miter_limit as f32,
        join: stroke.join,
        cap: stroke.start_cap,
        fill,
    })
}

fn dash_for(paint: &Paint, strike_to_source: f32) -> Option<Dash> {
    match &paint.path_effect {
        Some(PathEffect::Dash { intervals, phase }) if !intervals.is_empty() => Some(Dash {
            intervals: intervals.iter().map(|v| v / strike_to_source).collect(),
            phase: phase / strike_to_source,
        }),
        _ => None,
    }
}

fn join_to_u8(join: Join) -> u8 {
    match join {
        Join::Bevel => 0,
        Join::Miter => 1,
        Join::Round => 2,
    }
}

fn join_from_u8(v: u8) -> Option<Join> {
    Some(match v {
        0 => Join::Bevel,
        1 => Join::Miter,
        2 => Join::Round,
        _ => return None,
    })
}

fn cap_to_u8(cap: Cap) -> u8 {
    match cap {
        Cap::Butt => 0,
        Cap::Square => 1,
        Cap::Round => 2,
    }
}

fn cap_from_u8(v: u8) -> Option<Cap> {
    Some(match v {
        0 => Cap::Butt,
        1 => Cap::Square,
        2 => Cap::Round,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::palette::css::BLACK;
    use crate::kurbo::Stroke;

    fn font() -> Font {
        Font::new(TypefaceId(3), 24.0)
    }

    #[test]
    fn equal_descriptors_hash_alike() {
        let paint = Paint::new(BLACK);
        let props = SurfaceProps::default();
        let flags = ScalerContextFlags::empty();
        let a = StrikeDescriptor::mask(&font(), &paint, &props, flags, &Matrix::IDENTITY);
        let b = StrikeDescriptor::mask(
            &font(),
            &paint,
            &props,
            flags,
            &Matrix::translate(10.5, 3.0),
        );
        assert_eq!(a, b, "translation does not affect the strike");

        let c = StrikeDescriptor::mask(&font(), &paint, &props, flags, &Matrix::scale(2.0, 2.0));
        assert_ne!(a, c);
    }

    #[test]
    fn path_strikes_are_canonicalized() {
        let (desc, scale) = StrikeDescriptor::path(&font().with_size(256.0), &SurfaceProps::default());
        assert_eq!(desc.size, CANONICAL_PATH_SIZE);
        assert_eq!(scale, 4.0);
        let (desc, scale) = StrikeDescriptor::path(&font(), &SurfaceProps::default());
        assert_eq!(desc.size, 24.0);
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn sdft_scales_stroke_into_strike_space() {
        let mut paint = Paint::new(BLACK);
        paint.style = PaintStyle::Stroke(Stroke::new(4.0));
        let desc = StrikeDescriptor::sdft(&font(), &paint, &SurfaceProps::default(), 0.5);
        assert_eq!(desc.frame.map(|f| f.width), Some(8.0));
        assert_eq!(desc.kind, StrikeKind::Sdf);
    }

    #[test]
    fn flatten_round_trips() {
        let mut paint = Paint::new(BLACK);
        paint.style = PaintStyle::StrokeAndFill(Stroke::new(1.5));
        paint.path_effect = Some(PathEffect::Dash {
            intervals: SmallVec::from_slice(&[2.0, 1.0]),
            phase: 0.5,
        });
        let mut font = font();
        font.subpixel = true;
        let desc = StrikeDescriptor::mask(
            &font,
            &paint,
            &SurfaceProps::default(),
            ScalerContextFlags::FAKE_GAMMA,
            &Matrix::scale(1.5, 1.5),
        );
        let mut w = WriteBuffer::new();
        desc.flatten(&mut w);
        let mut r = ReadBuffer::new(w.as_bytes());
        assert_eq!(StrikeDescriptor::unflatten(&mut r), Ok(desc));
        assert_eq!(r.available(), 0);
    }

    #[test]
    fn rounding_spec_follows_axis() {
        let mut font = font();
        font.subpixel = true;
        let desc = StrikeDescriptor::mask(
            &font,
            &Paint::new(BLACK),
            &SurfaceProps::default(),
            ScalerContextFlags::empty(),
            &Matrix::IDENTITY,
        );
        let spec = desc.rounding_spec();
        assert_eq!(spec.half_axis_sample_freq, Point::new(0.125, 0.5));
        assert_eq!(spec.subpixel_axes, Some(AxisAlignment::X));
    }
}
