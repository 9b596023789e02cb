// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration for the text pipeline.

use bitflags::bitflags;

use crate::sdft::SdftControl;

/// Configuration for the glyph atlases.
#[derive(Clone, Debug)]
pub struct AtlasConfig {
    /// Maximum width of one atlas page in pixels.
    pub max_texture_width: u16,
    /// Maximum height of one atlas page in pixels.
    pub max_texture_height: u16,
    /// Width of a plot, the unit of eviction.
    pub plot_width: u16,
    /// Height of a plot.
    pub plot_height: u16,
    /// Maximum number of pages per mask format.
    pub max_pages: u8,
    /// Whether direct-mask glyphs may be sampled with bilinear filtering, which
    /// requires a one pixel border around each of them.
    pub support_bilerp: bool,
    /// Whether the backend can sample `A565` atlases. Otherwise LCD glyphs are
    /// stored as ARGB.
    pub support_a565: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            max_texture_width: 2048,
            max_texture_height: 2048,
            plot_width: 512,
            plot_height: 512,
            max_pages: 4,
            support_bilerp: false,
            support_a565: true,
        }
    }
}

impl AtlasConfig {
    /// The smallest configuration: a single 256x256 plot per page.
    pub fn minimum() -> Self {
        Self {
            max_texture_width: 256,
            max_texture_height: 256,
            plot_width: 256,
            plot_height: 256,
            ..Self::default()
        }
    }

    /// Plots per row and per column of a page.
    pub fn plots_per_axis(&self) -> (u16, u16) {
        let across = (self.max_texture_width / self.plot_width.max(1)).max(1);
        let down = (self.max_texture_height / self.plot_height.max(1)).max(1);
        (across, down)
    }
}

/// Size limits for signed distance field text.
#[derive(Clone, Debug)]
pub struct SdftConfig {
    /// Smallest device text size drawn with distance fields.
    pub min_size: f32,
    /// Largest device text size drawn with distance fields.
    pub max_size: f32,
    /// Whether distance fields may be used at all.
    pub able_to_use_sdft: bool,
    /// Whether text smaller than 162px may use distance fields. When unset,
    /// `min_size` is ignored and small text always uses masks.
    pub use_sdft_for_small_text: bool,
    /// Whether distance fields may be used under perspective.
    pub able_to_use_perspective_sdft: bool,
}

impl Default for SdftConfig {
    fn default() -> Self {
        Self {
            min_size: 18.0,
            max_size: 324.0,
            able_to_use_sdft: true,
            use_sdft_for_small_text: false,
            able_to_use_perspective_sdft: false,
        }
    }
}

impl SdftConfig {
    /// Build the control that answers the per-run questions.
    pub fn control(&self) -> SdftControl {
        SdftControl::new(
            self.able_to_use_sdft,
            self.use_sdft_for_small_text,
            self.able_to_use_perspective_sdft,
            self.min_size,
            self.max_size,
        )
    }
}

/// Sub-pixel layout of the target surface.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelGeometry {
    /// Unknown layout; LCD text is drawn as grayscale.
    #[default]
    Unknown,
    /// Horizontal RGB stripes.
    RgbHorizontal,
    /// Horizontal BGR stripes.
    BgrHorizontal,
    /// Vertical RGB stripes.
    RgbVertical,
    /// Vertical BGR stripes.
    BgrVertical,
}

impl PixelGeometry {
    /// Whether sub-pixels run in BGR order.
    pub fn is_bgr(self) -> bool {
        matches!(self, Self::BgrHorizontal | Self::BgrVertical)
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::RgbHorizontal => 1,
            Self::BgrHorizontal => 2,
            Self::RgbVertical => 3,
            Self::BgrVertical => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Unknown,
            1 => Self::RgbHorizontal,
            2 => Self::BgrHorizontal,
            3 => Self::RgbVertical,
            4 => Self::BgrVertical,
            _ => return None,
        })
    }
}

/// Properties of the surface text is drawn to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SurfaceProps {
    /// Sub-pixel layout.
    pub pixel_geometry: PixelGeometry,
}

bitflags! {
    /// Adjustments the glyph scaler applies to masks.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ScalerContextFlags: u8 {
        /// Apply a gamma curve to coverage.
        const FAKE_GAMMA = 1 << 0;
        /// Boost the contrast of coverage.
        const BOOST_CONTRAST = 1 << 1;
    }
}

/// Configuration for a [`TextContext`](crate::TextContext).
#[derive(Clone, Debug)]
pub struct TextConfig {
    /// Atlas layout.
    pub atlas: AtlasConfig,
    /// Distance field limits.
    pub sdft: SdftConfig,
    /// Target surface properties.
    pub surface_props: SurfaceProps,
    /// Flags passed to every mask strike.
    pub scaler_context_flags: ScalerContextFlags,
    /// Byte budget of the text blob cache.
    pub blob_cache_budget: usize,
    /// Maximum number of quads recorded into one draw.
    pub max_quads_per_draw: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            atlas: AtlasConfig::default(),
            sdft: SdftConfig::default(),
            surface_props: SurfaceProps::default(),
            scaler_context_flags: ScalerContextFlags::FAKE_GAMMA | ScalerContextFlags::BOOST_CONTRAST,
            blob_cache_budget: 4 * 1024 * 1024,
            max_quads_per_draw: 4096,
        }
    }
}
