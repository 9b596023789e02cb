// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Glyph atlases: texture pages split into plots, with LRU plot eviction.
//!
//! Each page is divided into fixed-size plots. Glyphs are packed into plots,
//! and a plot is the unit of eviction: when every page is full the least
//! recently used plot that no pending draw references is cleared. Every
//! eviction bumps the atlas generation, which is how glyph vectors notice
//! that their cached locations may be stale.

mod draw_atlas;
mod manager;
mod token;

use smallvec::SmallVec;

pub use draw_atlas::DrawAtlas;
pub use manager::AtlasManager;
pub use token::{DrawToken, TokenTracker};

use crate::geom::IRect;
use crate::glyph::MaskFormat;

/// Largest number of pages an atlas may use.
pub const MAX_PAGES: usize = 4;

/// Largest number of plots on one page.
pub const MAX_PLOTS_PER_PAGE: usize = 32;

/// Page index bit stored in the top of the left and top texture coordinates.
const PAGE_BIT_SHIFT: u16 = 13;
const UV_MASK: u16 = (1 << PAGE_BIT_SHIFT) - 1;

/// Outcome of adding an image to an atlas.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// The image was placed.
    Succeeded,
    /// Every plot is referenced by unflushed draws; flush and retry.
    TryAgain,
    /// The image can never be placed.
    Error,
}

/// Hands out atlas generations. Zero is never handed out, so it marks
/// "never placed".
#[derive(Clone, Debug)]
pub struct GenerationCounter(u64);

impl Default for GenerationCounter {
    fn default() -> Self {
        Self(1)
    }
}

impl GenerationCounter {
    /// The next unused generation.
    pub fn next(&mut self) -> u64 {
        let generation = self.0;
        self.0 += 1;
        generation
    }
}

/// Identifies one plot at one generation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlotLocator {
    page: u8,
    plot: u8,
    generation: u64,
}

impl PlotLocator {
    /// Create a locator.
    pub fn new(page: u8, plot: u8, generation: u64) -> Self {
        Self {
            page,
            plot,
            generation,
        }
    }

    /// Whether this refers to a placement at all.
    pub fn is_valid(self) -> bool {
        self.generation != 0
    }

    /// Page index.
    pub fn page_index(self) -> u8 {
        self.page
    }

    /// Plot index within the page.
    pub fn plot_index(self) -> u8 {
        self.plot
    }

    /// Plot generation at placement time.
    pub fn generation(self) -> u64 {
        self.generation
    }
}

/// Where a glyph lives in an atlas.
///
/// The texture rectangle is stored as `u16` texture coordinates with the
/// page index packed into bit 13: the low bit in both horizontal
/// coordinates and the high bit in both vertical ones, so every vertex
/// carries the page for free.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AtlasLocator {
    plot_locator: PlotLocator,
    uvs: [u16; 4],
}

impl AtlasLocator {
    /// The plot this glyph was placed in.
    pub fn plot_locator(&self) -> PlotLocator {
        self.plot_locator
    }

    /// Page index.
    pub fn page_index(&self) -> u8 {
        self.plot_locator.page_index()
    }

    /// Texture coordinates `[left, top, right, bottom]`, page bits included.
    pub fn uvs(&self) -> [u16; 4] {
        self.uvs
    }

    /// Texture coordinates with the page bits stripped.
    pub fn rect(&self) -> [u16; 4] {
        self.uvs.map(|v| v & UV_MASK)
    }

    /// Width of the texture rectangle.
    pub fn width(&self) -> u16 {
        let [l, _, r, _] = self.rect();
        r.saturating_sub(l)
    }

    /// Height of the texture rectangle.
    pub fn height(&self) -> u16 {
        let [_, t, _, b] = self.rect();
        b.saturating_sub(t)
    }

    /// Shrink the rectangle by the padding the image was uploaded with.
    pub fn inset_src(&mut self, padding: u16) {
        let [l, t, r, b] = self.rect();
        let page = self.page_index();
        self.uvs = [
            l.saturating_add(padding),
            t.saturating_add(padding),
            r.saturating_sub(padding),
            b.saturating_sub(padding),
        ];
        self.set_page_bits(page);
    }

    pub(crate) fn update_rect(&mut self, rect: IRect) {
        let clamp = |v: i32| u16::try_from(v).unwrap_or(0) & UV_MASK;
        let page = self.page_index();
        self.uvs = [
            clamp(rect.left),
            clamp(rect.top),
            clamp(rect.right),
            clamp(rect.bottom),
        ];
        self.set_page_bits(page);
    }

    pub(crate) fn update_plot_locator(&mut self, locator: PlotLocator) {
        self.plot_locator = locator;
        self.set_page_bits(locator.page_index());
    }

    fn set_page_bits(&mut self, page: u8) {
        let page = u16::from(page);
        let u_bit = (page & 1) << PAGE_BIT_SHIFT;
        let v_bit = ((page >> 1) & 1) << PAGE_BIT_SHIFT;
        let [l, t, r, b] = self.uvs.map(|v| v & UV_MASK);
        self.uvs = [l | u_bit, t | v_bit, r | u_bit, b | v_bit];
    }
}

/// Collects the plots a draw touches so their use tokens are bumped once.
#[derive(Clone, Debug, Default)]
pub struct BulkUsePlotUpdater {
    seen: [u32; MAX_PAGES],
    plots: SmallVec<[PlotLocator; 8]>,
}

impl BulkUsePlotUpdater {
    /// Record `locator`'s plot. Returns `true` the first time a plot is seen.
    pub fn add(&mut self, locator: &AtlasLocator) -> bool {
        let plot = locator.plot_locator();
        let page = usize::from(plot.page_index());
        let bit = 1_u32 << u32::from(plot.plot_index());
        match self.seen.get_mut(page) {
            Some(seen) if *seen & bit == 0 => {
                *seen |= bit;
                self.plots.push(plot);
                true
            }
            _ => false,
        }
    }

    /// Forget every recorded plot.
    pub fn reset(&mut self) {
        self.seen = [0; MAX_PAGES];
        self.plots.clear();
    }

    /// Recorded plots.
    pub fn plots(&self) -> &[PlotLocator] {
        &self.plots
    }

    /// Number of recorded plots.
    pub fn count(&self) -> usize {
        self.plots.len()
    }
}

/// Pixels waiting to be copied into an atlas texture.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingUpload {
    /// Which atlas.
    pub format: MaskFormat,
    /// Page within the atlas.
    pub page: u8,
    /// Destination rectangle in page pixels.
    pub rect: IRect,
    /// Tightly packed rows of `format` pixels, padding included.
    pub data: Vec<u8>,
}
