// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One atlas texture array: pages of plots for a single mask format.

use core::fmt;

use etagere::BucketedAtlasAllocator;
use smallvec::SmallVec;

use super::{
    AtlasLocator, BulkUsePlotUpdater, DrawToken, ErrorCode, GenerationCounter, MAX_PAGES,
    MAX_PLOTS_PER_PAGE, PendingUpload, PlotLocator, TokenTracker,
};
use crate::config::AtlasConfig;
use crate::geom::IRect;
use crate::glyph::MaskFormat;

/// A plot unused for this many flushes counts as idle during compaction.
const PLOT_RECENTLY_USED_COUNT: u32 = 32;

/// Compaction runs at least this often, in flushes, even when nothing is drawn.
const ATLAS_RECENTLY_USED_COUNT: u32 = 128;

struct Plot {
    index: u8,
    page: u8,
    generation: u64,
    /// Top left of the plot in page pixels.
    offset: (i32, i32),
    allocator: BucketedAtlasAllocator,
    last_use: DrawToken,
    flushes_since_last_used: u32,
}

impl Plot {
    fn locator(&self) -> PlotLocator {
        PlotLocator::new(self.page, self.index, self.generation)
    }

    fn reset(&mut self, generations: &mut GenerationCounter) {
        self.allocator.clear();
        self.generation = generations.next();
        self.last_use = DrawToken::ALREADY_FLUSHED;
        self.flushes_since_last_used = 0;
    }

    /// Reserve a `width` x `height` rectangle, in page pixels.
    fn allocate(&mut self, width: u16, height: u16) -> Option<IRect> {
        let size = euclid::size2(i32::from(width), i32::from(height));
        let allocation = self.allocator.allocate(size)?;
        let min = allocation.rectangle.min;
        let (x, y) = (self.offset.0 + min.x, self.offset.1 + min.y);
        Some(IRect::new(
            x,
            y,
            x + i32::from(width),
            y + i32::from(height),
        ))
    }
}

struct Page {
    plots: Vec<Plot>,
    /// Plot indices, most recently used first.
    mru: SmallVec<[u8; MAX_PLOTS_PER_PAGE]>,
}

impl Page {
    fn make_mru(&mut self, plot: u8) {
        if let Some(pos) = self.mru.iter().position(|&p| p == plot) {
            self.mru.remove(pos);
        }
        self.mru.insert(0, plot);
    }

    fn lru(&self) -> Option<u8> {
        self.mru.last().copied()
    }
}

/// Pages of plots holding images of one format.
///
/// Pages are activated on demand, up to the configured maximum, and the last
/// page is deactivated again by [`compact`](Self::compact) once its plots
/// have gone unused for long enough.
pub struct DrawAtlas {
    format: MaskFormat,
    texture_width: u16,
    texture_height: u16,
    plot_width: u16,
    plot_height: u16,
    plots_across: u16,
    plots_per_page: usize,
    max_pages: usize,
    pages: Vec<Page>,
    atlas_generation: u64,
    prev_flush_token: DrawToken,
    flushes_since_last_use: u32,
    pending_uploads: Vec<PendingUpload>,
}

impl fmt::Debug for DrawAtlas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawAtlas")
            .field("format", &self.format)
            .field("texture_width", &self.texture_width)
            .field("texture_height", &self.texture_height)
            .field("pages", &self.pages.len())
            .field("atlas_generation", &self.atlas_generation)
            .finish_non_exhaustive()
    }
}

impl DrawAtlas {
    /// Create an atlas with no active pages.
    pub fn new(format: MaskFormat, config: &AtlasConfig, generations: &mut GenerationCounter) -> Self {
        let (mut across, mut down) = config.plots_per_axis();
        while usize::from(across) * usize::from(down) > MAX_PLOTS_PER_PAGE {
            if across >= down {
                across /= 2;
            } else {
                down /= 2;
            }
        }
        let plot_width = config.plot_width.max(1);
        let plot_height = config.plot_height.max(1);
        Self {
            format,
            texture_width: across * plot_width,
            texture_height: down * plot_height,
            plot_width,
            plot_height,
            plots_across: across,
            plots_per_page: usize::from(across) * usize::from(down),
            max_pages: usize::from(config.max_pages).clamp(1, MAX_PAGES),
            pages: Vec::new(),
            atlas_generation: generations.next(),
            prev_flush_token: DrawToken::ALREADY_FLUSHED,
            flushes_since_last_use: 0,
            pending_uploads: Vec::new(),
        }
    }

    /// The format stored in this atlas.
    pub fn format(&self) -> MaskFormat {
        self.format
    }

    /// Page size in pixels.
    pub fn texture_size(&self) -> (u16, u16) {
        (self.texture_width, self.texture_height)
    }

    /// Plot size in pixels.
    pub fn plot_size(&self) -> (u16, u16) {
        (self.plot_width, self.plot_height)
    }

    /// Number of active pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Changes whenever a plot is evicted or a page is deactivated.
    pub fn atlas_generation(&self) -> u64 {
        self.atlas_generation
    }

    /// Whether the placement `locator` describes is still resident.
    pub fn has_id(&self, locator: &AtlasLocator) -> bool {
        self.plot(locator.plot_locator())
            .is_some_and(|plot| plot.generation == locator.plot_locator().generation())
    }

    /// Place a `width` x `height` image, returning where it went.
    ///
    /// `image` holds tightly packed rows of this atlas' format.
    pub fn add_to_atlas(
        &mut self,
        generations: &mut GenerationCounter,
        tokens: &TokenTracker,
        width: u16,
        height: u16,
        image: &[u8],
    ) -> (ErrorCode, AtlasLocator) {
        if width > self.plot_width || height > self.plot_height {
            log::warn!(
                "{width}x{height} image never fits a {}x{} plot",
                self.plot_width,
                self.plot_height
            );
            return (ErrorCode::Error, AtlasLocator::default());
        }

        for page in 0..self.pages.len() {
            if let Some(locator) = self.add_to_page(page, width, height, image) {
                return (ErrorCode::Succeeded, locator);
            }
        }

        if self.pages.len() < self.max_pages {
            self.activate_new_page(generations);
            if let Some(locator) = self.add_to_page(self.pages.len() - 1, width, height, image) {
                return (ErrorCode::Succeeded, locator);
            }
            return (ErrorCode::Error, AtlasLocator::default());
        }

        // Every page is full: recycle a least recently used plot that no
        // unflushed draw references.
        let next_flush = tokens.next_flush_token();
        for page in 0..self.pages.len() {
            let Some(plot) = self.pages[page].lru() else {
                continue;
            };
            if self.pages[page].plots[usize::from(plot)].last_use < next_flush {
                self.evict(page, plot, generations);
                if let Some(locator) = self.add_to_page(page, width, height, image) {
                    return (ErrorCode::Succeeded, locator);
                }
                return (ErrorCode::Error, AtlasLocator::default());
            }
        }
        (ErrorCode::TryAgain, AtlasLocator::default())
    }

    /// Mark the plot of `locator` as used by the draw with `token`.
    pub fn set_last_use_token(&mut self, locator: &AtlasLocator, token: DrawToken) {
        if !self.has_id(locator) {
            return;
        }
        self.touch(locator.plot_locator(), token);
    }

    /// Mark every plot in `updater` as used by the draw with `token`.
    pub fn set_last_use_token_bulk(&mut self, updater: &BulkUsePlotUpdater, token: DrawToken) {
        for &plot in updater.plots() {
            // Plots may have been evicted since they were recorded; the token
            // then protects the new occupant, which is harmless.
            self.touch(plot, token);
        }
    }

    /// Age plots after a flush and give back the last page once it is idle.
    ///
    /// `start_token_for_next_flush` is the first token of the next flush.
    pub fn compact(
        &mut self,
        generations: &mut GenerationCounter,
        start_token_for_next_flush: DrawToken,
    ) {
        if self.pages.is_empty() {
            self.prev_flush_token = start_token_for_next_flush;
            return;
        }

        let flush = self.prev_flush_token..start_token_for_next_flush;
        let mut atlas_used_this_flush = false;
        for plot in self.pages.iter_mut().flat_map(|page| &mut page.plots) {
            if flush.contains(&plot.last_use) {
                plot.flushes_since_last_used = 0;
                atlas_used_this_flush = true;
            }
        }
        if atlas_used_this_flush {
            self.flushes_since_last_use = 0;
        } else {
            self.flushes_since_last_use = self.flushes_since_last_use.saturating_add(1);
        }

        // Plots only age in flushes that draw text, so a blinking cursor does
        // not empty the atlas.
        if atlas_used_this_flush || self.flushes_since_last_use > ATLAS_RECENTLY_USED_COUNT {
            for plot in self.pages.iter_mut().flat_map(|page| &mut page.plots) {
                if !flush.contains(&plot.last_use) {
                    plot.flushes_since_last_used = plot.flushes_since_last_used.saturating_add(1);
                }
            }
            if self.pages.len() > 1 {
                self.compact_last_page(generations);
            }
        }
        self.prev_flush_token = start_token_for_next_flush;
    }

    /// Move the last page's recently used plots out so it can be freed.
    fn compact_last_page(&mut self, generations: &mut GenerationCounter) {
        let recently_used = |plot: &Plot| plot.flushes_since_last_used <= PLOT_RECENTLY_USED_COUNT;
        let last = self.pages.len() - 1;

        // Idle plots on earlier pages that the last page's glyphs can move to.
        let mut available: Vec<(usize, u8)> = self.pages[..last]
            .iter()
            .enumerate()
            .flat_map(|(p, page)| {
                page.plots
                    .iter()
                    .filter(|plot| !recently_used(plot))
                    .map(move |plot| (p, plot.index))
            })
            .collect();

        let mut used = Vec::new();
        let mut aged_out = Vec::new();
        for plot in &self.pages[last].plots {
            if recently_used(plot) {
                used.push(plot.index);
            } else if plot.last_use != DrawToken::ALREADY_FLUSHED {
                aged_out.push(plot.index);
            }
        }
        for plot in aged_out {
            self.evict(last, plot, generations);
        }

        // A handful of busy plots must not pin the whole page.
        if !available.is_empty() && !used.is_empty() && used.len() <= self.plots_per_page / 4 {
            while let Some(&plot) = used.last() {
                let Some((page, spare)) = available.pop() else {
                    break;
                };
                self.evict(last, plot, generations);
                self.evict(page, spare, generations);
                used.pop();
            }
        }

        if used.is_empty() {
            self.deactivate_last_page(generations);
            self.flushes_since_last_use = 0;
        }
    }

    /// Drop every page.
    pub fn free_all(&mut self, generations: &mut GenerationCounter) {
        self.pages.clear();
        self.pending_uploads.clear();
        self.atlas_generation = generations.next();
    }

    /// Take the pixel copies accumulated since the last call.
    pub fn take_pending_uploads(&mut self) -> Vec<PendingUpload> {
        core::mem::take(&mut self.pending_uploads)
    }

    fn plot(&self, locator: PlotLocator) -> Option<&Plot> {
        self.pages
            .get(usize::from(locator.page_index()))?
            .plots
            .get(usize::from(locator.plot_index()))
    }

    fn touch(&mut self, locator: PlotLocator, token: DrawToken) {
        let Some(page) = self.pages.get_mut(usize::from(locator.page_index())) else {
            return;
        };
        let index = locator.plot_index();
        if let Some(plot) = page.plots.get_mut(usize::from(index)) {
            plot.last_use = plot.last_use.max(token);
            page.make_mru(index);
        }
    }

    fn add_to_page(&mut self, page: usize, width: u16, height: u16, image: &[u8]) -> Option<AtlasLocator> {
        let format = self.format;
        let page_ref = self.pages.get_mut(page)?;
        let candidates = page_ref.mru.clone();
        for index in candidates {
            let plot = &mut page_ref.plots[usize::from(index)];
            let Some(rect) = plot.allocate(width, height) else {
                continue;
            };
            let mut locator = AtlasLocator::default();
            locator.update_plot_locator(plot.locator());
            locator.update_rect(rect);
            page_ref.make_mru(index);
            log::trace!("{format:?} atlas: placed {width}x{height} at {rect:?} on page {page}");
            self.pending_uploads.push(PendingUpload {
                format,
                page: locator.page_index(),
                rect,
                data: image.to_vec(),
            });
            return Some(locator);
        }
        None
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "page and plot counts are bounded by MAX_PAGES and MAX_PLOTS_PER_PAGE"
    )]
    fn activate_new_page(&mut self, generations: &mut GenerationCounter) {
        let page = self.pages.len() as u8;
        let across = usize::from(self.plots_across.max(1));
        let plots = (0..self.plots_per_page)
            .map(|i| Plot {
                index: i as u8,
                page,
                generation: generations.next(),
                offset: (
                    (i % across) as i32 * i32::from(self.plot_width),
                    (i / across) as i32 * i32::from(self.plot_height),
                ),
                allocator: BucketedAtlasAllocator::new(euclid::size2(
                    i32::from(self.plot_width),
                    i32::from(self.plot_height),
                )),
                last_use: DrawToken::ALREADY_FLUSHED,
                flushes_since_last_used: 0,
            })
            .collect();
        // Least recently used at the back, so fill order starts at plot 0.
        let mru = (0..self.plots_per_page).map(|i| i as u8).collect();
        self.pages.push(Page { plots, mru });
        log::debug!("{:?} atlas: activated page {page}", self.format);
    }

    fn deactivate_last_page(&mut self, generations: &mut GenerationCounter) {
        if self.pages.pop().is_some() {
            self.atlas_generation = generations.next();
            log::debug!(
                "{:?} atlas: deactivated page {}",
                self.format,
                self.pages.len()
            );
        }
    }

    fn evict(&mut self, page: usize, plot: u8, generations: &mut GenerationCounter) {
        let Some(page_ref) = self.pages.get_mut(page) else {
            return;
        };
        if let Some(p) = page_ref.plots.get_mut(usize::from(plot)) {
            p.reset(generations);
            self.atlas_generation = generations.next();
            log::debug!("{:?} atlas: evicted plot {plot} on page {page}", self.format);
        }
    }
}
