// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint and font descriptions consumed by the text pipeline.

use smallvec::SmallVec;

use crate::color::{AlphaColor, Srgb, palette::css::BLACK};
use crate::kurbo::Stroke;
use crate::peniko::Brush;

/// Identifies a typeface registered with a rasterizer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypefaceId(pub u32);

/// How glyph edges are rendered.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Edging {
    /// Binary coverage.
    Alias,
    /// Grayscale coverage.
    #[default]
    AntiAlias,
    /// Per-channel LCD coverage.
    SubpixelAntiAlias,
}

impl Edging {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Alias => 0,
            Self::AntiAlias => 1,
            Self::SubpixelAntiAlias => 2,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Alias,
            1 => Self::AntiAlias,
            2 => Self::SubpixelAntiAlias,
            _ => return None,
        })
    }
}

/// A typeface at a size, with the options that shape its glyph masks.
#[derive(Clone, Debug, PartialEq)]
pub struct Font {
    /// The typeface.
    pub typeface: TypefaceId,
    /// Size in points (pixels per em before the draw transform).
    pub size: f32,
    /// Horizontal stretch.
    pub scale_x: f32,
    /// Horizontal skew, as used for synthetic oblique.
    pub skew_x: f32,
    /// Edge rendering.
    pub edging: Edging,
    /// Whether glyphs are positioned at sub-pixel offsets.
    pub subpixel: bool,
    /// Synthetic bold.
    pub embolden: bool,
}

impl Font {
    /// A font with default options.
    pub fn new(typeface: TypefaceId, size: f32) -> Self {
        Self {
            typeface,
            size,
            scale_x: 1.0,
            skew_x: 0.0,
            edging: Edging::AntiAlias,
            subpixel: false,
            embolden: false,
        }
    }

    /// The same font at another size.
    pub fn with_size(&self, size: f32) -> Self {
        Self { size, ..self.clone() }
    }
}

/// Blur falloff styles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlurStyle {
    /// Blur inside and outside.
    #[default]
    Normal,
    /// Solid inside, blurred outside.
    Solid,
    /// Nothing inside, blurred outside.
    Outer,
    /// Blurred inside, nothing outside.
    Inner,
}

impl BlurStyle {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Solid => 1,
            Self::Outer => 2,
            Self::Inner => 3,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Normal,
            1 => Self::Solid,
            2 => Self::Outer,
            3 => Self::Inner,
            _ => return None,
        })
    }
}

/// Coverage filters applied before compositing.
#[derive(Clone, Debug, PartialEq)]
pub enum MaskFilter {
    /// Gaussian blur with the given sigma in source space.
    Blur {
        /// Falloff style.
        style: BlurStyle,
        /// Standard deviation.
        sigma: f32,
    },
    /// A filter the text pipeline cannot bake into glyph masks. Glyphs are
    /// handed to the canvas as device-space paths and blobs are not cached.
    Custom,
}

/// Path effects applied to glyph outlines.
#[derive(Clone, Debug, PartialEq)]
pub enum PathEffect {
    /// Dash pattern.
    Dash {
        /// On/off lengths.
        intervals: SmallVec<[f32; 4]>,
        /// Offset into the pattern.
        phase: f32,
    },
    /// An effect the text pipeline cannot bake into glyph masks.
    Custom,
}

/// Geometry style of a paint.
#[derive(Clone, Debug)]
pub enum PaintStyle {
    /// Fill glyph interiors.
    Fill,
    /// Stroke glyph outlines. A zero width is a hairline.
    Stroke(Stroke),
    /// Stroke and fill.
    StrokeAndFill(Stroke),
}

/// How text is painted.
#[derive(Clone, Debug)]
pub struct Paint {
    /// Color source.
    pub brush: Brush,
    /// Fill or stroke.
    pub style: PaintStyle,
    /// Coverage filter.
    pub mask_filter: Option<MaskFilter>,
    /// Outline effect.
    pub path_effect: Option<PathEffect>,
    /// Whether path-drawn glyphs are antialiased.
    pub anti_alias: bool,
}

impl Default for Paint {
    fn default() -> Self {
        Self::new(BLACK)
    }
}

impl Paint {
    /// A solid fill.
    pub fn new(color: AlphaColor<Srgb>) -> Self {
        Self {
            brush: Brush::Solid(color),
            style: PaintStyle::Fill,
            mask_filter: None,
            path_effect: None,
            anti_alias: true,
        }
    }

    /// The stroke, if the paint strokes.
    pub fn stroke(&self) -> Option<&Stroke> {
        match &self.style {
            PaintStyle::Fill => None,
            PaintStyle::Stroke(stroke) | PaintStyle::StrokeAndFill(stroke) => Some(stroke),
        }
    }

    /// Whether this is a zero width stroke.
    pub fn is_hairline(&self) -> bool {
        matches!(&self.style, PaintStyle::Stroke(stroke) if stroke.width == 0.0)
    }

    /// Whether the brush is a single color.
    pub fn is_solid(&self) -> bool {
        matches!(self.brush, Brush::Solid(_))
    }

    /// The blur, if the mask filter is one.
    pub fn blur(&self) -> Option<(BlurStyle, f32)> {
        match self.mask_filter {
            Some(MaskFilter::Blur { style, sigma }) => Some((style, sigma)),
            _ => None,
        }
    }

    /// Color written into mask vertices. Non-solid brushes are shaded by the
    /// backend, so they modulate opaque white.
    pub fn vertex_color(&self) -> AlphaColor<Srgb> {
        match &self.brush {
            Brush::Solid(color) => *color,
            _ => AlphaColor::WHITE,
        }
    }

    /// A single color that stands in for the brush when picking gamma tables.
    pub fn luminance_color(&self) -> AlphaColor<Srgb> {
        match &self.brush {
            Brush::Solid(color) => *color,
            Brush::Gradient(gradient) => {
                let mut sum = [0.0_f32; 4];
                let mut count = 0_u16;
                for stop in gradient.stops.iter() {
                    let c = stop.color.to_alpha_color::<Srgb>();
                    for (acc, v) in sum.iter_mut().zip(c.components) {
                        *acc += v;
                    }
                    count = count.saturating_add(1);
                }
                if count == 0 {
                    return BLACK;
                }
                AlphaColor::new(sum.map(|v| v / f32::from(count)))
            }
            _ => AlphaColor::new([0.5, 0.5, 0.5, 1.0]),
        }
    }

    /// Whether glyph paths must be drawn already mapped to device space.
    ///
    /// This holds for anything whose appearance depends on the device
    /// transform beyond coverage: shaded brushes, path effects, real strokes
    /// and non-blur mask filters.
    pub fn needs_exact_ctm(&self) -> bool {
        !self.is_solid()
            || self.path_effect.is_some()
            || (self.stroke().is_some() && !self.is_hairline())
            || matches!(self.mask_filter, Some(MaskFilter::Custom))
    }
}
