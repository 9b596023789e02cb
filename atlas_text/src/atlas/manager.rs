// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owns one [`DrawAtlas`] per mask format.

use super::{
    AtlasLocator, BulkUsePlotUpdater, DrawAtlas, DrawToken, ErrorCode, GenerationCounter,
    PendingUpload, TokenTracker,
};
use crate::config::AtlasConfig;
use crate::glyph::{Glyph, MaskFormat};
use crate::scaler::GlyphImage;

/// The glyph atlases of one context.
///
/// Atlases are created the first time a glyph of their format is added.
#[derive(Debug)]
pub struct AtlasManager {
    config: AtlasConfig,
    atlases: [Option<DrawAtlas>; MaskFormat::COUNT],
    generations: GenerationCounter,
}

impl AtlasManager {
    /// Create a manager with no atlases allocated.
    pub fn new(config: AtlasConfig) -> Self {
        Self {
            config,
            atlases: [None, None, None],
            generations: GenerationCounter::default(),
        }
    }

    /// The configuration atlases are created with.
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// The format glyphs of `format` are actually stored as.
    pub fn resolve_mask_format(&self, format: MaskFormat) -> MaskFormat {
        if format == MaskFormat::A565 && !self.config.support_a565 {
            MaskFormat::Argb
        } else {
            format
        }
    }

    /// The atlas for `format`, if any glyph of that format was ever added.
    pub fn atlas(&self, format: MaskFormat) -> Option<&DrawAtlas> {
        self.atlases[self.resolve_mask_format(format).index()].as_ref()
    }

    /// Whether `glyph`'s recorded placement is still resident.
    pub fn has_glyph(&self, format: MaskFormat, glyph: &Glyph) -> bool {
        glyph.atlas_locator.plot_locator().is_valid()
            && self
                .atlas(format)
                .is_some_and(|atlas| atlas.has_id(&glyph.atlas_locator))
    }

    /// Upload `image` for `glyph`, surrounded by `src_padding` pixels.
    ///
    /// A padding of 0 is used for direct masks, 1 for transformed masks,
    /// which are sampled bilinearly and get a transparent border, and 2 for
    /// distance fields, whose images already contain their border. On
    /// success the glyph's locator is updated and inset to the unpadded
    /// image.
    pub fn add_glyph_to_atlas(
        &mut self,
        image: &GlyphImage,
        glyph: &mut Glyph,
        mut src_padding: u16,
        tokens: &TokenTracker,
    ) -> ErrorCode {
        if image.width == 0 || image.height == 0 {
            return ErrorCode::Error;
        }
        let add_border = match src_padding {
            0 if self.config.support_bilerp => {
                src_padding = 1;
                true
            }
            0 | 2 => false,
            1 => true,
            _ => {
                log::warn!("unsupported glyph padding {src_padding}");
                return ErrorCode::Error;
            }
        };

        let format = self.resolve_mask_format(image.format);
        let converted;
        let image = if format == image.format {
            image
        } else {
            converted = convert_image(image, format);
            &converted
        };
        let padded;
        let image = if add_border {
            padded = with_border(image);
            &padded
        } else {
            image
        };

        let atlas = self.atlases[format.index()]
            .get_or_insert_with(|| DrawAtlas::new(format, &self.config, &mut self.generations));
        let (code, mut locator) = atlas.add_to_atlas(
            &mut self.generations,
            tokens,
            image.width,
            image.height,
            &image.data,
        );
        if code == ErrorCode::Succeeded {
            locator.inset_src(src_padding);
            glyph.atlas_locator = locator;
        }
        code
    }

    /// Record `glyph`'s plot in `updater`, marking it used by the next draw
    /// the first time it is seen.
    pub fn add_glyph_to_bulk_and_set_use_token(
        &mut self,
        updater: &mut BulkUsePlotUpdater,
        format: MaskFormat,
        glyph: &Glyph,
        token: DrawToken,
    ) {
        if updater.add(&glyph.atlas_locator) {
            self.set_use_token(format, &glyph.atlas_locator, token);
        }
    }

    /// Mark `locator`'s plot as used by the draw with `token`.
    pub fn set_use_token(&mut self, format: MaskFormat, locator: &AtlasLocator, token: DrawToken) {
        if let Some(atlas) = self.atlas_mut(format) {
            atlas.set_last_use_token(locator, token);
        }
    }

    /// Mark every plot in `updater` as used by the draw with `token`.
    pub fn set_use_token_bulk(
        &mut self,
        updater: &BulkUsePlotUpdater,
        token: DrawToken,
        format: MaskFormat,
    ) {
        if let Some(atlas) = self.atlas_mut(format) {
            atlas.set_last_use_token_bulk(updater, token);
        }
    }

    /// The eviction generation of `format`'s atlas. Zero before the atlas
    /// exists.
    pub fn atlas_generation(&self, format: MaskFormat) -> u64 {
        self.atlas(format).map_or(0, DrawAtlas::atlas_generation)
    }

    /// Number of active pages of `format`'s atlas.
    pub fn page_count(&self, format: MaskFormat) -> usize {
        self.atlas(format).map_or(0, DrawAtlas::page_count)
    }

    /// Age plots and compact every atlas after a flush.
    pub fn post_flush(&mut self, start_token_for_next_flush: DrawToken) {
        for atlas in self.atlases.iter_mut().flatten() {
            atlas.compact(&mut self.generations, start_token_for_next_flush);
        }
    }

    /// Drop every atlas page. Every glyph placement becomes stale.
    pub fn free_all(&mut self) {
        for atlas in self.atlases.iter_mut().flatten() {
            atlas.free_all(&mut self.generations);
        }
        log::debug!("freed all glyph atlases");
    }

    /// Shrink every atlas to a single small plot. Existing atlases are freed.
    pub fn set_atlas_dimensions_to_minimum_for_testing(&mut self) {
        self.free_all();
        self.config = AtlasConfig {
            support_bilerp: self.config.support_bilerp,
            support_a565: self.config.support_a565,
            ..AtlasConfig::minimum()
        };
        self.atlases = [None, None, None];
    }

    /// Take every pending texture upload, across all formats.
    pub fn take_pending_uploads(&mut self) -> Vec<PendingUpload> {
        self.atlases
            .iter_mut()
            .flatten()
            .flat_map(DrawAtlas::take_pending_uploads)
            .collect()
    }

    fn atlas_mut(&mut self, format: MaskFormat) -> Option<&mut DrawAtlas> {
        let index = self.resolve_mask_format(format).index();
        self.atlases[index].as_mut()
    }
}

/// Copy `image` into a new image with a one pixel transparent border.
fn with_border(image: &GlyphImage) -> GlyphImage {
    let mut out = GlyphImage::zeroed(image.width + 2, image.height + 2, image.format);
    let src_stride = image.stride();
    let dst_stride = out.stride();
    let bpp = image.format.bytes_per_pixel();
    for (row, src) in image.data.chunks_exact(src_stride).enumerate() {
        let start = (row + 1) * dst_stride + bpp;
        out.data[start..start + src_stride].copy_from_slice(src);
    }
    out
}

/// Expand LCD coverage to premultiplied color for backends without `A565`.
fn convert_image(image: &GlyphImage, format: MaskFormat) -> GlyphImage {
    let mut out = GlyphImage::zeroed(image.width, image.height, format);
    if image.format != MaskFormat::A565 || format != MaskFormat::Argb {
        log::warn!("no conversion from {:?} to {format:?}", image.format);
        return out;
    }
    for (src, dst) in image.data.chunks_exact(2).zip(out.data.chunks_exact_mut(4)) {
        let p = u16::from_le_bytes([src[0], src[1]]);
        let r = expand_bits((p >> 11) & 0x1f, 5);
        let g = expand_bits((p >> 5) & 0x3f, 6);
        let b = expand_bits(p & 0x1f, 5);
        dst.copy_from_slice(&[r, g, b, r.max(g).max(b)]);
    }
    out
}

#[expect(clippy::cast_possible_truncation, reason = "result is at most 255")]
fn expand_bits(v: u16, bits: u32) -> u8 {
    ((u32::from(v) * 255 + ((1 << bits) - 1) / 2) / ((1 << bits) - 1)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyph::PackedGlyphId;

    fn solid(width: u16, height: u16) -> GlyphImage {
        GlyphImage {
            width,
            height,
            format: MaskFormat::A8,
            data: vec![0xff; usize::from(width) * usize::from(height)],
        }
    }

    #[test]
    fn padding_is_inset_after_upload() {
        let tokens = TokenTracker::new();
        let mut manager = AtlasManager::new(AtlasConfig::default());
        let mut glyph = Glyph::new(PackedGlyphId::with_subpixel(5, 0, 0));
        let code = manager.add_glyph_to_atlas(&solid(10, 7), &mut glyph, 1, &tokens);
        assert_eq!(code, ErrorCode::Succeeded);
        assert_eq!(glyph.atlas_locator.width(), 10);
        assert_eq!(glyph.atlas_locator.height(), 7);
        assert!(manager.has_glyph(MaskFormat::A8, &glyph));

        let uploads = manager.take_pending_uploads();
        assert_eq!(uploads.len(), 1);
        let upload = &uploads[0];
        assert_eq!((upload.rect.width(), upload.rect.height()), (12, 9));
        assert_eq!(upload.data[0], 0, "border is transparent");
        assert_eq!(upload.data[12 + 1], 0xff);
    }

    #[test]
    fn bilerp_forces_a_border() {
        let tokens = TokenTracker::new();
        let config = AtlasConfig {
            support_bilerp: true,
            ..AtlasConfig::default()
        };
        let mut manager = AtlasManager::new(config);
        let mut glyph = Glyph::new(PackedGlyphId::with_subpixel(1, 0, 0));
        manager.add_glyph_to_atlas(&solid(4, 4), &mut glyph, 0, &tokens);
        let uploads = manager.take_pending_uploads();
        assert_eq!(uploads[0].rect.width(), 6);
        assert_eq!(glyph.atlas_locator.width(), 4);
    }

    #[test]
    fn bad_padding_is_an_error() {
        let tokens = TokenTracker::new();
        let mut manager = AtlasManager::new(AtlasConfig::default());
        let mut glyph = Glyph::new(PackedGlyphId::with_subpixel(1, 0, 0));
        let code = manager.add_glyph_to_atlas(&solid(4, 4), &mut glyph, 3, &tokens);
        assert_eq!(code, ErrorCode::Error);
        assert!(!manager.has_glyph(MaskFormat::A8, &glyph));
    }

    #[test]
    fn lcd_without_a565_lands_in_the_color_atlas() {
        let tokens = TokenTracker::new();
        let config = AtlasConfig {
            support_a565: false,
            ..AtlasConfig::default()
        };
        let mut manager = AtlasManager::new(config);
        let image = GlyphImage {
            width: 1,
            height: 1,
            format: MaskFormat::A565,
            data: 0xffff_u16.to_le_bytes().to_vec(),
        };
        let mut glyph = Glyph::new(PackedGlyphId::with_subpixel(1, 0, 0));
        assert_eq!(
            manager.add_glyph_to_atlas(&image, &mut glyph, 0, &tokens),
            ErrorCode::Succeeded
        );
        assert_eq!(manager.page_count(MaskFormat::Argb), 1);
        assert!(manager.has_glyph(MaskFormat::A565, &glyph));
        let uploads = manager.take_pending_uploads();
        assert_eq!(uploads[0].format, MaskFormat::Argb);
        assert_eq!(uploads[0].data, vec![0xff; 4]);
    }

    #[test]
    fn free_all_invalidates_glyphs() {
        let tokens = TokenTracker::new();
        let mut manager = AtlasManager::new(AtlasConfig::default());
        let mut glyph = Glyph::new(PackedGlyphId::with_subpixel(1, 0, 0));
        manager.add_glyph_to_atlas(&solid(3, 3), &mut glyph, 0, &tokens);
        let generation = manager.atlas_generation(MaskFormat::A8);
        manager.free_all();
        assert!(!manager.has_glyph(MaskFormat::A8, &glyph));
        assert_ne!(manager.atlas_generation(MaskFormat::A8), generation);
    }
}
