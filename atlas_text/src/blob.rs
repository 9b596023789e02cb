// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cached text blobs and the keys they are found by.
//!
//! A [`TextBlob`] owns the [`SubRunContainer`] built for one glyph run list
//! under one paint and matrix. The [`TextBlobCache`] keeps blobs between
//! draws so that text redrawn with a compatible paint and matrix skips
//! classification. Compatibility is decided in two steps: the
//! [`TextBlobKey`] finds a candidate, then [`TextBlob::can_reuse`] asks every
//! sub-run whether it can draw under the new matrix.

use crate::HashMap;
use crate::canvas::TextCanvas;
use crate::config::{PixelGeometry, ScalerContextFlags};
use crate::container::{CreationBehavior, StrikeDeviceInfo, SubRunContainer};
use crate::geom::{Matrix, Point, approximate_transformed_text_size};
use crate::glyph_run::GlyphRunList;
use crate::kurbo::Join;
use crate::new_map;
use crate::paint::{BlurStyle, Edging, MaskFilter, Paint, PaintStyle};
use crate::scaler::ScalerCache;
use crate::subrun::SubRun;
use crate::vertex::can_use_direct;

/// The color key of LCD text, which must match the exact paint color.
const TRANSPARENT: u32 = 0;

/// Bits of luminance a canonical color keeps.
const LUMINANCE_BITS: u32 = 3;

/// Rough per-glyph cost of a sub-run, for the cache budget.
const BYTES_PER_GLYPH: usize = 32;

#[derive(Clone, Debug, PartialEq)]
enum StyleKey {
    Fill,
    Stroke {
        width: f64,
        miter_limit: f64,
        join: Join,
    },
    StrokeAndFill {
        width: f64,
        miter_limit: f64,
        join: Join,
    },
}

impl StyleKey {
    fn new(style: &PaintStyle) -> Self {
        match style {
            PaintStyle::Fill => Self::Fill,
            PaintStyle::Stroke(stroke) => Self::Stroke {
                width: stroke.width,
                miter_limit: stroke.miter_limit,
                join: stroke.join,
            },
            PaintStyle::StrokeAndFill(stroke) => Self::StrokeAndFill {
                width: stroke.width,
                miter_limit: stroke.miter_limit,
                join: stroke.join,
            },
        }
    }
}

/// Identifies the blobs a draw may reuse.
///
/// Two keys are equal when the text content, paint style, canonical color,
/// blur and scaler flags agree. When any run would draw direct masks, the
/// matrices must also differ by a whole-pixel translation only; otherwise
/// the matrix is left to the sub-runs, perspective included.
#[derive(Clone, Debug)]
pub struct TextBlobKey {
    unique_id: u32,
    canonical_color: u32,
    style: StyleKey,
    pixel_geometry: PixelGeometry,
    blur: Option<(BlurStyle, f32)>,
    scaler_context_flags: ScalerContextFlags,
    has_some_direct_sub_runs: bool,
    position_matrix: Matrix,
}

impl TextBlobKey {
    /// Build the key for drawing `glyph_run_list` with `paint` under
    /// `position_matrix`, or `None` if the result must not be cached.
    ///
    /// Path effects and mask filters other than blurs make a draw
    /// uncacheable, as does a list that opted out.
    pub fn make(
        glyph_run_list: &GlyphRunList,
        paint: &Paint,
        position_matrix: &Matrix,
        device_info: &StrikeDeviceInfo,
    ) -> Option<Self> {
        let can_cache = glyph_run_list.can_cache()
            && paint.path_effect.is_none()
            && !matches!(paint.mask_filter, Some(MaskFilter::Custom));
        if !can_cache {
            return None;
        }

        let has_lcd = glyph_run_list
            .runs()
            .iter()
            .any(|run| run.font.edging == Edging::SubpixelAntiAlias);
        // Grayscale masks do not depend on the pixel geometry.
        let pixel_geometry = if has_lcd {
            device_info.surface_props.pixel_geometry
        } else {
            PixelGeometry::Unknown
        };

        let location = glyph_run_list.source_bounds().center();
        let has_some_direct_sub_runs = glyph_run_list.runs().iter().any(|run| {
            let size = approximate_transformed_text_size(run.font.size, position_matrix, location);
            device_info
                .sdft_control
                .is_direct(size, paint, position_matrix)
        });

        let position_matrix = if has_some_direct_sub_runs {
            // Only the sub-pixel part of the origin matters to direct masks.
            let origin = position_matrix.map_origin();
            let mut m = *position_matrix;
            m.set_translate(origin.x - origin.x.floor(), origin.y - origin.y.floor());
            m
        } else {
            Matrix::IDENTITY
        };

        Some(Self {
            unique_id: glyph_run_list.unique_id(),
            canonical_color: canonical_color(paint, has_lcd),
            style: StyleKey::new(&paint.style),
            pixel_geometry,
            blur: paint.blur(),
            scaler_context_flags: device_info.scaler_context_flags,
            has_some_direct_sub_runs,
            position_matrix,
        })
    }

    /// The text content identifier.
    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    /// Whether any run of the keyed draw uses direct masks.
    pub fn has_some_direct_sub_runs(&self) -> bool {
        self.has_some_direct_sub_runs
    }
}

impl PartialEq for TextBlobKey {
    fn eq(&self, other: &Self) -> bool {
        if self.unique_id != other.unique_id
            || self.canonical_color != other.canonical_color
            || self.style != other.style
            || self.pixel_geometry != other.pixel_geometry
            || self.blur != other.blur
            || self.scaler_context_flags != other.scaler_context_flags
        {
            return false;
        }
        if self.has_some_direct_sub_runs != other.has_some_direct_sub_runs {
            return false;
        }
        if self.has_some_direct_sub_runs {
            return can_use_direct(&self.position_matrix, &other.position_matrix).0;
        }
        true
    }
}

/// The color masks are generated for, reduced to a few luminance levels so
/// that similar colors share masks. LCD masks depend on the exact color and
/// get a placeholder that forces a color check on reuse.
fn canonical_color(paint: &Paint, lcd: bool) -> u32 {
    if lcd {
        return TRANSPARENT;
    }
    let c = paint.luminance_color().to_rgba8();
    let luminance = (u32::from(c.r) * 54 + u32::from(c.g) * 183 + u32::from(c.b) * 19) >> 8;
    let v = luminance >> (8 - LUMINANCE_BITS);
    let v = (v << 5) | (v << 2) | (v >> 1);
    0xff00_0000 | (v << 16) | (v << 8) | v
}

/// The sub-runs of one draw, with what is needed to decide their reuse.
#[derive(Debug)]
pub struct TextBlob {
    key: Option<TextBlobKey>,
    container: SubRunContainer,
    initial_luminance: u32,
    size: usize,
    last_use: u64,
}

impl TextBlob {
    /// Classify `glyph_run_list` into a new blob. `key` is stored for
    /// caching and is `None` for draws that cannot be cached.
    pub fn make(
        key: Option<TextBlobKey>,
        glyph_run_list: &GlyphRunList,
        paint: &Paint,
        position_matrix: &Matrix,
        device_info: &StrikeDeviceInfo,
        scaler_cache: &ScalerCache,
    ) -> Self {
        let container = SubRunContainer::make(
            glyph_run_list,
            position_matrix,
            paint,
            device_info,
            scaler_cache,
            CreationBehavior::AddSubRuns,
        );
        Self::from_container(key, container, paint)
    }

    /// Wrap an existing container, such as one read back from a buffer.
    pub fn from_container(key: Option<TextBlobKey>, container: SubRunContainer, paint: &Paint) -> Self {
        let size = size_of::<Self>()
            + container.sub_runs().len() * size_of::<SubRun>()
            + container.glyph_count() * BYTES_PER_GLYPH;
        Self {
            key,
            container,
            initial_luminance: paint.luminance_color().to_rgba8().to_u32(),
            size,
            last_use: 0,
        }
    }

    /// The cache key, if the blob is cacheable.
    pub fn key(&self) -> Option<&TextBlobKey> {
        self.key.as_ref()
    }

    /// The sub-runs.
    pub fn container(&self) -> &SubRunContainer {
        &self.container
    }

    /// The sub-runs, mutably, for atlas regeneration.
    pub fn container_mut(&mut self) -> &mut SubRunContainer {
        &mut self.container
    }

    /// Estimated memory use in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the blob can be drawn with `paint` under `position_matrix`.
    pub fn can_reuse(&self, paint: &Paint, position_matrix: &Matrix) -> bool {
        let initial = self.container.initial_position_matrix();
        // Nothing records how an empty or perspective blob would move.
        if (self.container.is_empty() || initial.has_perspective()) && initial != position_matrix {
            return false;
        }
        if self
            .key
            .as_ref()
            .is_some_and(|key| key.canonical_color == TRANSPARENT)
            && self.initial_luminance != paint.luminance_color().to_rgba8().to_u32()
        {
            return false;
        }
        self.container.can_reuse(paint, position_matrix)
    }

    /// Draw the path and drawable sub-runs into `canvas`.
    pub fn draw(&self, canvas: &mut dyn TextCanvas, draw_origin: Point, paint: &Paint) {
        self.container.draw(canvas, draw_origin, paint);
    }
}

/// Blobs kept between draws, bounded by a byte budget.
///
/// Blobs are grouped by the unique id of their text so that a change of
/// content purges every blob built for it. Each lookup stamps the blob with
/// a serial; when the budget is exceeded the blobs with the oldest serial go
/// first.
#[derive(Debug)]
pub struct TextBlobCache {
    blobs: HashMap<u32, Vec<TextBlob>>,
    budget: usize,
    current_size: usize,
    serial: u64,
}

impl TextBlobCache {
    /// Create an empty cache holding at most `budget` bytes.
    pub fn new(budget: usize) -> Self {
        Self {
            blobs: new_map(),
            budget,
            current_size: 0,
            serial: 0,
        }
    }

    /// The byte budget.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Estimated bytes in use.
    pub fn size_used(&self) -> usize {
        self.current_size
    }

    /// Number of cached blobs.
    pub fn blob_count(&self) -> usize {
        self.blobs.values().map(Vec::len).sum()
    }

    fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }

    /// Find the blob stored under `key`, marking it used.
    pub fn find(&mut self, key: &TextBlobKey) -> Option<&mut TextBlob> {
        let serial = self.next_serial();
        let blob = self
            .blobs
            .get_mut(&key.unique_id)?
            .iter_mut()
            .find(|blob| blob.key.as_ref() == Some(key))?;
        blob.last_use = serial;
        Some(blob)
    }

    /// Store `blob`, replacing a blob with an equal key, and evict the least
    /// recently used blobs while over budget.
    ///
    /// Blobs without a key are not stored.
    pub fn insert(&mut self, mut blob: TextBlob) {
        let Some(key) = blob.key.clone() else {
            return;
        };
        self.remove(&key);
        blob.last_use = self.next_serial();
        self.current_size += blob.size;
        self.blobs.entry(key.unique_id).or_default().push(blob);
        self.check_budget(Some(&key));
    }

    /// Remove the blob stored under `key`.
    pub fn remove(&mut self, key: &TextBlobKey) {
        let Some(list) = self.blobs.get_mut(&key.unique_id) else {
            return;
        };
        if let Some(index) = list.iter().position(|blob| blob.key.as_ref() == Some(key)) {
            let blob = list.swap_remove(index);
            self.current_size -= blob.size;
        }
        if list.is_empty() {
            self.blobs.remove(&key.unique_id);
        }
    }

    /// Remove every blob built for the text with `unique_id`.
    pub fn purge_blobs_for_id(&mut self, unique_id: u32) {
        if let Some(list) = self.blobs.remove(&unique_id) {
            let freed: usize = list.iter().map(TextBlob::size).sum();
            self.current_size -= freed;
            log::debug!("purged {} blobs for text {unique_id}", list.len());
        }
    }

    /// Remove every blob.
    pub fn free_all(&mut self) {
        self.blobs.clear();
        self.current_size = 0;
    }

    /// Evict least recently used blobs until the cache fits its budget,
    /// sparing the blob under `keep`.
    fn check_budget(&mut self, keep: Option<&TextBlobKey>) {
        while self.current_size > self.budget {
            let oldest = self
                .blobs
                .iter()
                .flat_map(|(&id, list)| list.iter().enumerate().map(move |(i, blob)| (id, i, blob)))
                .filter(|(_, _, blob)| keep.is_none() || blob.key.as_ref() != keep)
                .min_by_key(|(_, _, blob)| blob.last_use)
                .map(|(id, i, _)| (id, i));
            let Some((id, index)) = oldest else {
                break;
            };
            if let Some(list) = self.blobs.get_mut(&id) {
                let blob = list.swap_remove(index);
                self.current_size -= blob.size;
                log::debug!("evicted blob for text {id}, {} bytes", blob.size);
                if list.is_empty() {
                    self.blobs.remove(&id);
                }
            }
        }
    }
}
