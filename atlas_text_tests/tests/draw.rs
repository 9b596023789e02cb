// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The geometry of recorded draws: device quads, clipping and perspective.

use std::sync::Arc;

use atlas_text::geom::IRect;
use atlas_text::glyph::MaskFormat;
use atlas_text::subrun::SubRunType;
use atlas_text::vertex::{Argb3DVertex, Mask2DVertex};
use atlas_text::{GlyphDrawList, Matrix, Paint, Point, Rect, TextConfig};

use crate::util::{COLOR_GLYPH, Overshoot, TestEnv, kinds, mask_positions, no_sdft, text};

#[test]
fn draw_twelve_glyphs_then_translate() {
    let mut env = TestEnv::new(TextConfig::default());
    let glyphs: Vec<u16> = (33..45).collect();
    let list = text(3, 24.0, &glyphs);
    let paint = Paint::default();

    let container = env.classify(&list, &Matrix::IDENTITY);
    assert_eq!(kinds(&container), [SubRunType::DirectMask]);
    assert_eq!(container.glyph_count(), 12);

    let stats = env.draw(&list, &paint, &Matrix::IDENTITY);
    assert_eq!(stats.glyph_draws, 1);
    assert_eq!(env.target.draws[0].mask_format, MaskFormat::A8);
    assert_eq!(env.target.draws[0].vertex_stride, size_of::<Mask2DVertex>());
    let before = env.positions();
    assert_eq!(before.len(), 48);

    let stats = env.draw(&list, &paint, &Matrix::translate(3.0, -2.0));
    assert!(stats.reused_blob);
    let after = env.positions();
    for (b, a) in before.iter().zip(&after) {
        assert_eq!([b[0] + 3.0, b[1] - 2.0], *a, "quads move by exactly the translation");
    }
}

#[test]
fn draw_reused_direct_quads_land_in_device_space() {
    let mut env = TestEnv::new(TextConfig::default());
    let list = text(1, 24.0, &[1, 2]);
    let paint = Paint::default();
    env.draw(&list, &paint, &Matrix::IDENTITY);

    let stats = env.draw(&list, &paint, &Matrix::translate(3.0, -2.0));
    assert!(stats.reused_blob);
    // 12px squares at (10, 44) and (34, 44), moved by (3, -2).
    let bounds = |quad: &[[f32; 2]]| {
        Rect::from_points(quad.iter().map(|p| Point::new(p[0], p[1])))
    };
    let positions = env.positions();
    assert_eq!(bounds(&positions[..4]), Rect::new(13.0, 30.0, 25.0, 42.0));
    assert_eq!(bounds(&positions[4..]), Rect::new(37.0, 30.0, 49.0, 42.0));
    assert_eq!(env.target.draws[0].device_bounds, Rect::new(13.0, 30.0, 49.0, 42.0));
}

#[test]
fn draw_transformed_quads_land_in_device_space() {
    let mut env = TestEnv::new(no_sdft());
    let view = Matrix::from_row_major([1.0, 0.0, 100.0, 0.0, 1.0, 50.0, 0.001, 0.0, 1.0]);
    let list = text(1, 24.0, &[COLOR_GLYPH]);
    env.draw(&list, &Paint::default(), &view);

    let draw = &env.target.draws[0];
    let projected: Vec<Point> = draw
        .vertices
        .chunks_exact(size_of::<Argb3DVertex>())
        .map(|chunk| {
            let [x, y, w] = bytemuck::pod_read_unaligned::<Argb3DVertex>(chunk).position;
            Point::new(x / w, y / w)
        })
        .collect();
    let quad = Rect::from_points(projected.iter().copied());
    let bounds = draw.device_bounds;
    assert!(
        quad.left >= bounds.left - 0.01
            && quad.top >= bounds.top - 0.01
            && quad.right <= bounds.right + 0.01
            && quad.bottom <= bounds.bottom + 0.01,
        "{quad:?} escapes {bounds:?}"
    );

    // The glyph square spans 10..22 by 32..44 before the view.
    let expected = view.map_xy(16.0, 38.0);
    let center = quad.center();
    assert!(
        (center.x - expected.x).abs() < 1.5 && (center.y - expected.y).abs() < 1.5,
        "{center:?} is not the projected glyph center {expected:?}"
    );
}

#[test]
fn draw_clip_trims_direct_quads() {
    let mut env = TestEnv::new(no_sdft());
    // Glyphs are 6px squares; the first covers x 10..16, the second 22..28.
    let list = text(1, 12.0, &[1, 2]);
    let mut target = GlyphDrawList::new();
    env.context.draw_glyph_run_list(
        &list,
        &Paint::default(),
        &Matrix::IDENTITY,
        Some(IRect::new(0, 0, 13, 100)),
        &mut env.canvas,
        &mut target,
    );
    let positions = mask_positions(&target.draws[0].vertices);
    assert_eq!(positions.len(), 8);

    let xs = |quad: &[[f32; 2]]| {
        let min = quad.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min);
        let max = quad.iter().map(|p| p[0]).fold(f32::NEG_INFINITY, f32::max);
        (min, max)
    };
    assert_eq!(xs(&positions[..4]), (10.0, 13.0), "the first quad is cut at the clip");
    assert!(
        positions[4..].iter().all(|p| *p == [0.0, 0.0]),
        "a quad outside the clip is degenerate"
    );
}

#[test]
fn draw_perspective_uses_homogeneous_vertices() {
    let mut env = TestEnv::new(no_sdft());
    let perspective =
        Matrix::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.001, 0.0, 1.0]);
    let list = text(1, 24.0, &[COLOR_GLYPH]);
    assert_eq!(
        kinds(&env.classify(&list, &perspective)),
        [SubRunType::TransformedMask]
    );

    let stats = env.draw(&list, &Paint::default(), &perspective);
    assert_eq!(stats.glyph_draws, 1);
    let draw = &env.target.draws[0];
    assert_eq!(draw.vertex_stride, size_of::<Argb3DVertex>());
    assert_eq!(draw.vertices.len(), 4 * draw.vertex_stride);
}

#[test]
fn draw_last_resort_converges_despite_rounding() {
    let mut env = TestEnv::with_rasterizer(Arc::new(Overshoot), no_sdft());
    let list = text(1, 1200.0, &[COLOR_GLYPH]);
    let stats = env.draw(&list, &Paint::default(), &Matrix::IDENTITY);
    assert_eq!(stats.dropped_glyphs, 0);
    assert_eq!(env.quads(), 1);

    let upload = &env.target.draws[0].uploads[0];
    let side = upload.rect.width().max(upload.rect.height());
    assert!(side <= 256, "254 pixels plus a one pixel border, got {side}");
    assert!(side > 200, "the glyph was not shrunk more than needed, got {side}");
}
