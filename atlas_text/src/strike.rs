// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The GPU-side strike cache: per-descriptor arenas of [`Glyph`] records.
//!
//! Unlike [`ScalerCache`](crate::scaler::ScalerCache), this cache is owned by
//! the thread that prepares draws and is mutated without locking. Glyphs are
//! referred to by [`GlyphHandle`], an index pair that stays valid until
//! [`StrikeCache::free_all`].

use crate::glyph::{Glyph, GlyphHandle, PackedGlyphId};
use crate::scaler::StrikeDescriptor;
use crate::{HashMap, new_map};

/// Stable reference to a strike in a [`StrikeCache`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StrikeHandle(u32);

/// The glyphs of one descriptor.
#[derive(Debug)]
pub struct TextStrike {
    descriptor: StrikeDescriptor,
    glyphs: Vec<Glyph>,
    index: HashMap<PackedGlyphId, u32>,
}

impl TextStrike {
    /// The descriptor the glyphs were rendered with.
    pub fn descriptor(&self) -> &StrikeDescriptor {
        &self.descriptor
    }

    /// Number of glyph records.
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }
}

/// Owns every [`TextStrike`] of a context.
#[derive(Debug)]
pub struct StrikeCache {
    strikes: Vec<TextStrike>,
    by_descriptor: HashMap<StrikeDescriptor, u32>,
    epoch: u64,
}

impl Default for StrikeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StrikeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            strikes: Vec::new(),
            by_descriptor: new_map(),
            epoch: 0,
        }
    }

    /// The strike for `desc`, created on first use.
    pub fn find_or_create_strike(&mut self, desc: &StrikeDescriptor) -> StrikeHandle {
        if let Some(&index) = self.by_descriptor.get(desc) {
            return StrikeHandle(index);
        }
        let Ok(index) = u32::try_from(self.strikes.len()) else {
            // Four billion strikes cannot be reached without exhausting memory.
            return StrikeHandle(u32::MAX);
        };
        self.strikes.push(TextStrike {
            descriptor: desc.clone(),
            glyphs: Vec::new(),
            index: new_map(),
        });
        self.by_descriptor.insert(desc.clone(), index);
        StrikeHandle(index)
    }

    /// The strike behind `handle`.
    pub fn strike(&self, handle: StrikeHandle) -> Option<&TextStrike> {
        self.strikes.get(handle.0 as usize)
    }

    /// The glyph record for `packed_id`, created on first use.
    ///
    /// Returns `None` only for a handle from before the last
    /// [`free_all`](Self::free_all).
    pub fn get_glyph(&mut self, strike: StrikeHandle, packed_id: PackedGlyphId) -> Option<GlyphHandle> {
        let text_strike = self.strikes.get_mut(strike.0 as usize)?;
        if let Some(&glyph) = text_strike.index.get(&packed_id) {
            return Some(GlyphHandle {
                strike: strike.0,
                glyph,
            });
        }
        let glyph = u32::try_from(text_strike.glyphs.len()).ok()?;
        text_strike.glyphs.push(Glyph::new(packed_id));
        text_strike.index.insert(packed_id, glyph);
        Some(GlyphHandle {
            strike: strike.0,
            glyph,
        })
    }

    /// The glyph behind `handle`.
    pub fn glyph(&self, handle: GlyphHandle) -> Option<&Glyph> {
        self.strikes
            .get(handle.strike as usize)?
            .glyphs
            .get(handle.glyph as usize)
    }

    /// The glyph behind `handle`, mutably.
    pub fn glyph_mut(&mut self, handle: GlyphHandle) -> Option<&mut Glyph> {
        self.strikes
            .get_mut(handle.strike as usize)?
            .glyphs
            .get_mut(handle.glyph as usize)
    }

    /// Drop every strike. Outstanding handles become stale, which
    /// [`epoch`](Self::epoch) reports.
    pub fn free_all(&mut self) {
        log::debug!("freeing {} strikes", self.strikes.len());
        self.strikes.clear();
        self.by_descriptor.clear();
        self.epoch += 1;
    }

    /// Incremented by every [`free_all`](Self::free_all).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of strikes.
    pub fn strike_count(&self) -> usize {
        self.strikes.len()
    }

    /// Number of glyph records over all strikes.
    pub fn glyph_count(&self) -> usize {
        self.strikes.iter().map(TextStrike::glyph_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScalerContextFlags, SurfaceProps};
    use crate::geom::Matrix;
    use crate::paint::{Font, Paint, TypefaceId};

    fn descriptor(size: f32) -> StrikeDescriptor {
        StrikeDescriptor::mask(
            &Font::new(TypefaceId(1), size),
            &Paint::default(),
            &SurfaceProps::default(),
            ScalerContextFlags::empty(),
            &Matrix::IDENTITY,
        )
    }

    #[test]
    fn glyphs_are_shared_per_strike() {
        let mut cache = StrikeCache::new();
        let a = cache.find_or_create_strike(&descriptor(12.0));
        let b = cache.find_or_create_strike(&descriptor(12.0));
        let c = cache.find_or_create_strike(&descriptor(13.0));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let id = PackedGlyphId::new(7);
        let first = cache.get_glyph(a, id).unwrap();
        let second = cache.get_glyph(a, id).unwrap();
        assert_eq!(first, second);
        cache.get_glyph(c, id).unwrap();
        assert_eq!(cache.strike_count(), 2);
        assert_eq!(cache.glyph_count(), 2);
        assert_eq!(cache.glyph(first).unwrap().packed_id, id);
    }

    #[test]
    fn free_all_stales_handles() {
        let mut cache = StrikeCache::new();
        let strike = cache.find_or_create_strike(&descriptor(12.0));
        let glyph = cache.get_glyph(strike, PackedGlyphId::new(1)).unwrap();
        let epoch = cache.epoch();
        cache.free_all();
        assert!(cache.glyph(glyph).is_none());
        assert!(cache.get_glyph(strike, PackedGlyphId::new(1)).is_none());
        assert_ne!(cache.epoch(), epoch);
    }
}
