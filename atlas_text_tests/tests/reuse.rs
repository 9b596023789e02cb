// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! When a cached blob is drawn again instead of classifying the text anew.

use atlas_text::color::palette::css::{BLUE, RED};
use atlas_text::{Matrix, Paint};

use crate::util::{COLOR_GLYPH, TestEnv, no_sdft, small_sdft, text};

#[test]
fn reuse_whole_pixel_translation() {
    let mut env = TestEnv::new(no_sdft());
    let list = text(1, 12.0, &[1, 2, 3]);
    let paint = Paint::default();

    let first = env.draw(&list, &paint, &Matrix::IDENTITY);
    assert!(!first.reused_blob);
    assert_eq!(env.uploads(), 3);
    let before = env.positions();

    let second = env.draw(&list, &paint, &Matrix::translate(7.0, -3.0));
    assert!(second.reused_blob);
    assert_eq!(env.uploads(), 0, "the glyphs are still resident");
    let after = env.positions();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!([b[0] + 7.0, b[1] - 3.0], *a);
    }
}

#[test]
fn reuse_distance_fields_within_their_scale_range() {
    let mut env = TestEnv::new(small_sdft());
    let list = text(1, 48.0, &[1, 2]);
    let paint = Paint::default();

    assert!(!env.draw(&list, &paint, &Matrix::IDENTITY).reused_blob);
    assert!(env.draw(&list, &paint, &Matrix::scale(1.25, 1.25)).reused_blob);
    assert!(
        !env.draw(&list, &paint, &Matrix::scale(2.0, 2.0)).reused_blob,
        "96px needs a larger distance field strike"
    );
    assert_eq!(
        env.context.blob_cache().blob_count(),
        1,
        "the rebuilt blob replaces the one with the same key"
    );
}

#[test]
fn reuse_distinguishes_luminance() {
    let mut env = TestEnv::new(no_sdft());
    let list = text(1, 12.0, &[1, 2]);
    assert!(!env.draw(&list, &Paint::new(RED), &Matrix::IDENTITY).reused_blob);
    assert!(!env.draw(&list, &Paint::new(BLUE), &Matrix::IDENTITY).reused_blob);
    assert!(env.draw(&list, &Paint::new(RED), &Matrix::IDENTITY).reused_blob);
    assert_eq!(env.context.blob_cache().blob_count(), 2);
}

#[test]
fn reuse_stops_after_purge() {
    let mut env = TestEnv::new(no_sdft());
    let list = text(9, 12.0, &[1, 2]);
    let paint = Paint::default();
    env.draw(&list, &paint, &Matrix::IDENTITY);
    env.context.purge_blobs_for_id(9);
    assert_eq!(env.context.blob_cache().blob_count(), 0);
    assert!(!env.draw(&list, &paint, &Matrix::IDENTITY).reused_blob);
}

#[test]
fn reuse_never_happens_for_uncacheable_text() {
    let mut env = TestEnv::new(no_sdft());
    let list = text(1, 12.0, &[1, 2]).with_can_cache(false);
    let paint = Paint::default();
    for _ in 0..2 {
        let stats = env.draw(&list, &paint, &Matrix::IDENTITY);
        assert!(!stats.reused_blob);
        assert_eq!(env.quads(), 2);
    }
    assert_eq!(env.context.blob_cache().blob_count(), 0);
}

#[test]
fn reuse_under_perspective_rebuilds_in_place() {
    let mut env = TestEnv::new(no_sdft());
    let perspective =
        Matrix::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.001, 0.0, 1.0]);
    let list = text(1, 24.0, &[COLOR_GLYPH]);
    let paint = Paint::default();
    for _ in 0..2 {
        let stats = env.draw(&list, &paint, &perspective);
        assert!(!stats.reused_blob, "perspective masks cannot be reused");
        assert_eq!(env.quads(), 1);
    }
    assert_eq!(
        env.context.blob_cache().blob_count(),
        1,
        "the key matches, so the rebuilt blob replaces the old one"
    );
}
