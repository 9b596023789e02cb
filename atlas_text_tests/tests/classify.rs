// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Which technique each glyph ends up drawn with.

use atlas_text::subrun::SubRunType;
use atlas_text::{Matrix, Paint, TextConfig};

use crate::util::{COLOR_GLYPH, DRAWABLE_GLYPH, TestEnv, kinds, no_sdft, small_sdft, text};

#[test]
fn classify_small_text_uses_direct_masks() {
    let env = TestEnv::new(no_sdft());
    let container = env.classify(&text(1, 12.0, &[1, 2, 3, 4, 5]), &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::DirectMask]);
    assert_eq!(container.glyph_count(), 5);
    assert!(container.has_direct_sub_runs());
}

#[test]
fn classify_blank_glyphs_are_dropped() {
    let env = TestEnv::new(no_sdft());
    let container = env.classify(&text(1, 12.0, &[0, 0, 1]), &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::DirectMask]);
    assert_eq!(container.glyph_count(), 1);
    assert_eq!(container.dropped_glyph_count(), 2);
}

#[test]
fn classify_default_keeps_small_text_in_masks() {
    let env = TestEnv::new(TextConfig::default());
    let small = env.classify(&text(1, 24.0, &[1, 2, 3]), &Matrix::IDENTITY);
    assert_eq!(kinds(&small), [SubRunType::DirectMask]);
    let large = env.classify(&text(2, 200.0, &[1, 2, 3]), &Matrix::IDENTITY);
    assert_eq!(kinds(&large), [SubRunType::Sdft]);
}

#[test]
fn classify_medium_text_uses_distance_fields() {
    let env = TestEnv::new(small_sdft());
    let container = env.classify(&text(1, 48.0, &[1, 2, 3]), &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::Sdft]);
    assert!(!container.has_direct_sub_runs());
}

#[test]
fn classify_color_glyphs_skip_distance_fields() {
    let env = TestEnv::new(small_sdft());
    let container = env.classify(&text(1, 48.0, &[1, COLOR_GLYPH, 2]), &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::Sdft, SubRunType::DirectMask]);
    assert_eq!(container.sub_runs()[0].glyph_count(), 2);
    assert_eq!(container.sub_runs()[1].glyph_count(), 1);
}

#[test]
fn classify_huge_text_draws_through_the_canvas() {
    let mut env = TestEnv::new(no_sdft());
    let list = text(1, 600.0, &[1, 2, DRAWABLE_GLYPH]);
    let container = env.classify(&list, &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::Drawable, SubRunType::Path]);

    let stats = env.draw(&list, &Paint::default(), &Matrix::IDENTITY);
    assert_eq!(stats.glyph_draws, 0, "nothing goes to the atlas");
    assert!(env.target.draws.is_empty());
    assert_eq!(env.canvas.paths().count(), 3);
    assert_eq!(env.canvas.save_count(), 0, "every save is restored");
}

#[test]
fn classify_huge_color_glyphs_are_scaled_into_the_atlas() {
    let mut env = TestEnv::new(no_sdft());
    let list = text(1, 1200.0, &[COLOR_GLYPH]);
    let container = env.classify(&list, &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::TransformedMask]);

    let stats = env.draw(&list, &Paint::default(), &Matrix::IDENTITY);
    assert_eq!(stats.glyph_draws, 1);
    assert_eq!(env.quads(), 1);
    let upload = &env.target.draws[0].uploads[0];
    assert!(upload.rect.width() <= 256 && upload.rect.height() <= 256);
}

#[test]
fn classify_scaled_view_changes_the_technique() {
    let env = TestEnv::new(no_sdft());
    let list = text(1, 12.0, &[1, 2]);
    assert_eq!(
        kinds(&env.classify(&list, &Matrix::IDENTITY)),
        [SubRunType::DirectMask]
    );
    assert_eq!(
        kinds(&env.classify(&list, &Matrix::scale(50.0, 50.0))),
        [SubRunType::Path]
    );
}
