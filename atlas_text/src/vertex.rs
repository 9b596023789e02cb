// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vertex layouts and quad generation for atlas glyphs.
//!
//! Every glyph becomes one quad of four vertices in left-top, left-bottom,
//! right-top, right-bottom order, ready to be drawn as two triangles with a
//! shared index buffer. Mask formats carry a packed premultiplied color per
//! vertex; color glyphs take their color from the atlas and omit it.
//! Vertices are built into typed vectors and then appended to byte buffers
//! with `bytemuck`.

use bytemuck::{Pod, Zeroable};

use crate::atlas::AtlasLocator;
use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::color::{AlphaColor, Srgb};
use crate::error::{Error, ErrorKind};
use crate::geom::{GlyphRect, IRect, Matrix, Point, Rect};
use crate::glyph::MaskFormat;
use crate::math::FloatExt;
use crate::scaler::MaskGlyph;

/// A mask vertex with a 2D position.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Mask2DVertex {
    /// Device position.
    pub position: [f32; 2],
    /// Packed premultiplied RGBA8.
    pub color: u32,
    /// Atlas texture coordinate, page bits included.
    pub uv: [u16; 2],
}

/// A color glyph vertex with a 2D position.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Argb2DVertex {
    /// Device position.
    pub position: [f32; 2],
    /// Atlas texture coordinate, page bits included.
    pub uv: [u16; 2],
}

/// A mask vertex with a homogeneous position.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Mask3DVertex {
    /// Device position before the perspective divide.
    pub position: [f32; 3],
    /// Packed premultiplied RGBA8.
    pub color: u32,
    /// Atlas texture coordinate, page bits included.
    pub uv: [u16; 2],
}

/// A color glyph vertex with a homogeneous position.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Argb3DVertex {
    /// Device position before the perspective divide.
    pub position: [f32; 3],
    /// Atlas texture coordinate, page bits included.
    pub uv: [u16; 2],
}

/// A vertex with a 2D position.
pub trait Vertex2D: Pod {
    /// Build a vertex. Layouts without color ignore `color`.
    fn new(position: Point, color: u32, uv: [u16; 2]) -> Self;
}

/// A vertex with a homogeneous position.
pub trait Vertex3D: Pod {
    /// Build a vertex. Layouts without color ignore `color`.
    fn new(position: [f32; 3], color: u32, uv: [u16; 2]) -> Self;
}

impl Vertex2D for Mask2DVertex {
    fn new(position: Point, color: u32, uv: [u16; 2]) -> Self {
        Self {
            position: [position.x, position.y],
            color,
            uv,
        }
    }
}

impl Vertex2D for Argb2DVertex {
    fn new(position: Point, _color: u32, uv: [u16; 2]) -> Self {
        Self {
            position: [position.x, position.y],
            uv,
        }
    }
}

impl Vertex3D for Mask3DVertex {
    fn new(position: [f32; 3], color: u32, uv: [u16; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }
}

impl Vertex3D for Argb3DVertex {
    fn new(position: [f32; 3], _color: u32, uv: [u16; 2]) -> Self {
        Self { position, uv }
    }
}

/// Bytes per vertex for glyphs of `format`.
pub fn vertex_stride(format: MaskFormat, perspective: bool) -> usize {
    match (format.is_color(), perspective) {
        (false, false) => size_of::<Mask2DVertex>(),
        (true, false) => size_of::<Argb2DVertex>(),
        (false, true) => size_of::<Mask3DVertex>(),
        (true, true) => size_of::<Argb3DVertex>(),
    }
}

/// Pack a color as premultiplied RGBA8.
pub fn pack_color(color: AlphaColor<Srgb>) -> u32 {
    color.premultiply().to_rgba8().to_u32()
}

/// Whether glyphs rasterized under `initial` can be drawn under `new` by
/// translating their quads, and by how much.
///
/// This holds when the 2x2 parts are identical, neither matrix has
/// perspective, and the origin moved by whole pixels.
pub fn can_use_direct(initial: &Matrix, new: &Matrix) -> (bool, Point) {
    let translation = new.map_origin() - initial.map_origin();
    let compatible = initial.linear_eq(new)
        && !initial.has_perspective()
        && !new.has_perspective()
        && translation.x.is_integral()
        && translation.y.is_integral();
    (compatible, translation)
}

/// Append `vertices` to `dst` as bytes.
pub fn extend_bytes<V: Pod>(dst: &mut Vec<u8>, vertices: &[V]) {
    dst.extend_from_slice(bytemuck::cast_slice(vertices));
}

fn push_quad_2d<V: Vertex2D>(out: &mut Vec<V>, corners: [Point; 4], color: u32, uvs: [u16; 4]) {
    let [al, at, ar, ab] = uvs;
    let [lt, lb, rt, rb] = corners;
    out.extend([
        V::new(lt, color, [al, at]),
        V::new(lb, color, [al, ab]),
        V::new(rt, color, [ar, at]),
        V::new(rb, color, [ar, ab]),
    ]);
}

fn push_quad_3d<V: Vertex3D>(out: &mut Vec<V>, corners: [[f32; 3]; 4], color: u32, uvs: [u16; 4]) {
    let [al, at, ar, ab] = uvs;
    let [lt, lb, rt, rb] = corners;
    out.extend([
        V::new(lt, color, [al, at]),
        V::new(lb, color, [al, ab]),
        V::new(rt, color, [ar, at]),
        V::new(rb, color, [ar, ab]),
    ]);
}

/// Device rectangle of a direct glyph whose top left is at `left_top`.
fn direct_rect(locator: &AtlasLocator, left_top: Point) -> Rect {
    Rect::new(
        left_top.x,
        left_top.y,
        left_top.x + f32::from(locator.width()),
        left_top.y + f32::from(locator.height()),
    )
}

/// Quads for direct glyphs translated by a whole pixel `origin_offset`.
pub fn direct_2d<V: Vertex2D>(
    out: &mut Vec<V>,
    glyphs: &[(AtlasLocator, Point)],
    color: u32,
    origin_offset: Point,
) {
    out.reserve(glyphs.len() * 4);
    for (locator, left_top) in glyphs {
        let r = direct_rect(locator, *left_top + origin_offset);
        push_quad_2d(
            out,
            [
                Point::new(r.left, r.top),
                Point::new(r.left, r.bottom),
                Point::new(r.right, r.top),
                Point::new(r.right, r.bottom),
            ],
            color,
            locator.uvs(),
        );
    }
}

/// Like [`direct_2d`], clipping every quad to `clip`.
///
/// Clipped quads shrink their texture rectangle by the same number of
/// pixels, so the visible texels stay put. Quads entirely outside the clip
/// become degenerate all-zero quads.
#[expect(
    clippy::cast_possible_truncation,
    reason = "direct glyph positions are whole pixels well inside i32"
)]
pub fn generalized_direct_2d<V: Vertex2D>(
    out: &mut Vec<V>,
    glyphs: &[(AtlasLocator, Point)],
    color: u32,
    origin_offset: Point,
    clip: Option<&IRect>,
) {
    let Some(clip) = clip else {
        direct_2d(out, glyphs, color, origin_offset);
        return;
    };
    out.reserve(glyphs.len() * 4);
    for (locator, left_top) in glyphs {
        let r = direct_rect(locator, *left_top + origin_offset);
        let device = IRect::new(
            r.left as i32,
            r.top as i32,
            r.right as i32,
            r.bottom as i32,
        );
        let [al, at, ar, ab] = locator.uvs();
        let (rect, uvs) = if clip.contains(&device) {
            (device, [al, at, ar, ab])
        } else if let Some(clipped) = clip.intersect(&device) {
            let delta = |d: i32| u16::try_from(d).unwrap_or(0);
            (
                clipped,
                [
                    al + delta(clipped.left - device.left),
                    at + delta(clipped.top - device.top),
                    ar - delta(device.right - clipped.right),
                    ab - delta(device.bottom - clipped.bottom),
                ],
            )
        } else {
            out.extend([V::zeroed(); 4]);
            continue;
        };
        let r = rect.to_rect();
        push_quad_2d(
            out,
            [
                Point::new(r.left, r.top),
                Point::new(r.left, r.bottom),
                Point::new(r.right, r.top),
                Point::new(r.right, r.bottom),
            ],
            color,
            uvs,
        );
    }
}

/// Quads for direct glyphs mapped through `view_difference`, the change
/// from the rasterization matrix to the current one.
pub fn transformed_direct_2d<V: Vertex2D>(
    out: &mut Vec<V>,
    glyphs: &[(AtlasLocator, Point)],
    color: u32,
    view_difference: &Matrix,
) {
    out.reserve(glyphs.len() * 4);
    for (locator, left_top) in glyphs {
        let r = direct_rect(locator, *left_top);
        let m = view_difference;
        push_quad_2d(
            out,
            [
                m.map_xy(r.left, r.top),
                m.map_xy(r.left, r.bottom),
                m.map_xy(r.right, r.top),
                m.map_xy(r.right, r.bottom),
            ],
            color,
            locator.uvs(),
        );
    }
}

/// Like [`transformed_direct_2d`] for a view difference with perspective.
pub fn transformed_direct_3d<V: Vertex3D>(
    out: &mut Vec<V>,
    glyphs: &[(AtlasLocator, Point)],
    color: u32,
    view_difference: &Matrix,
) {
    out.reserve(glyphs.len() * 4);
    for (locator, left_top) in glyphs {
        let r = direct_rect(locator, *left_top);
        let m = view_difference;
        push_quad_3d(
            out,
            [
                m.map_homogeneous(r.left, r.top),
                m.map_homogeneous(r.left, r.bottom),
                m.map_homogeneous(r.right, r.top),
                m.map_homogeneous(r.right, r.bottom),
            ],
            color,
            locator.uvs(),
        );
    }
}

/// Quad geometry for glyphs rasterized at a strike size and drawn scaled
/// into source space, then through the position matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct TransformedMaskVertexFiller {
    format: MaskFormat,
    strike_to_source: f32,
    source_bounds: Rect,
    positions: Vec<Point>,
    glyph_rects: Vec<GlyphRect>,
}

impl TransformedMaskVertexFiller {
    /// Build from accepted glyphs. `dst_padding` is removed from every glyph
    /// rectangle to match the inset texture rectangle in the atlas.
    pub fn new(
        format: MaskFormat,
        dst_padding: i16,
        strike_to_source: f32,
        glyphs: &[MaskGlyph],
    ) -> Self {
        let glyph_rects: Vec<_> = glyphs.iter().map(|g| g.bounds.inset(dst_padding)).collect();
        let positions: Vec<_> = glyphs.iter().map(|g| g.position).collect();
        Self::from_parts(format, strike_to_source, positions, glyph_rects)
    }

    fn from_parts(
        format: MaskFormat,
        strike_to_source: f32,
        positions: Vec<Point>,
        glyph_rects: Vec<GlyphRect>,
    ) -> Self {
        let source_bounds = positions
            .iter()
            .zip(&glyph_rects)
            .map(|(pos, rect)| source_rect(*rect, strike_to_source, *pos))
            .fold(Rect::largest_inverted(), |acc, r| acc.join_possibly_empty(&r));
        Self {
            format,
            strike_to_source,
            source_bounds,
            positions,
            glyph_rects,
        }
    }

    /// Mask format of the glyphs.
    pub fn format(&self) -> MaskFormat {
        self.format
    }

    /// Number of glyphs.
    pub fn glyph_count(&self) -> usize {
        self.positions.len()
    }

    /// Scale from strike pixels to source units.
    pub fn strike_to_source(&self) -> f32 {
        self.strike_to_source
    }

    /// Union of every glyph rectangle in source space.
    pub fn source_bounds(&self) -> Rect {
        self.source_bounds
    }

    /// Device bounds under `position_matrix`.
    pub fn device_rect(&self, position_matrix: &Matrix) -> Rect {
        position_matrix.map_rect(&self.source_bounds)
    }

    /// Bytes per vertex under `position_matrix`.
    pub fn vertex_stride(&self, position_matrix: &Matrix) -> usize {
        vertex_stride(self.format, position_matrix.has_perspective())
    }

    /// Append quads for glyphs `offset..offset + locators.len()` to `dst`.
    pub fn fill_vertex_data(
        &self,
        dst: &mut Vec<u8>,
        offset: usize,
        locators: &[AtlasLocator],
        color: u32,
        position_matrix: &Matrix,
    ) {
        match (self.format.is_color(), position_matrix.has_perspective()) {
            (false, false) => self.fill_2d::<Mask2DVertex>(dst, offset, locators, color, position_matrix),
            (true, false) => self.fill_2d::<Argb2DVertex>(dst, offset, locators, color, position_matrix),
            (false, true) => self.fill_3d::<Mask3DVertex>(dst, offset, locators, color, position_matrix),
            (true, true) => self.fill_3d::<Argb3DVertex>(dst, offset, locators, color, position_matrix),
        }
    }

    fn quads<'a>(&'a self, offset: usize, locators: &'a [AtlasLocator]) -> impl Iterator<Item = (Rect, [u16; 4])> + 'a {
        let end = (offset + locators.len()).min(self.glyph_count());
        let begin = offset.min(end);
        self.positions[begin..end]
            .iter()
            .zip(&self.glyph_rects[begin..end])
            .zip(locators)
            .map(move |((pos, rect), locator)| {
                (source_rect(*rect, self.strike_to_source, *pos), locator.uvs())
            })
    }

    fn fill_2d<V: Vertex2D>(
        &self,
        dst: &mut Vec<u8>,
        offset: usize,
        locators: &[AtlasLocator],
        color: u32,
        m: &Matrix,
    ) {
        let mut out = Vec::with_capacity(locators.len() * 4);
        for (r, uvs) in self.quads(offset, locators) {
            push_quad_2d::<V>(
                &mut out,
                [
                    m.map_xy(r.left, r.top),
                    m.map_xy(r.left, r.bottom),
                    m.map_xy(r.right, r.top),
                    m.map_xy(r.right, r.bottom),
                ],
                color,
                uvs,
            );
        }
        extend_bytes(dst, &out);
    }

    fn fill_3d<V: Vertex3D>(
        &self,
        dst: &mut Vec<u8>,
        offset: usize,
        locators: &[AtlasLocator],
        color: u32,
        m: &Matrix,
    ) {
        let mut out = Vec::with_capacity(locators.len() * 4);
        for (r, uvs) in self.quads(offset, locators) {
            push_quad_3d::<V>(
                &mut out,
                [
                    m.map_homogeneous(r.left, r.top),
                    m.map_homogeneous(r.left, r.bottom),
                    m.map_homogeneous(r.right, r.top),
                    m.map_homogeneous(r.right, r.bottom),
                ],
                color,
                uvs,
            );
        }
        extend_bytes(dst, &out);
    }

    /// Serialize the geometry.
    pub fn flatten(&self, buffer: &mut WriteBuffer) {
        buffer.write_u8(self.format.to_u8());
        buffer.write_f32(self.strike_to_source);
        buffer.write_count(self.positions.len());
        for (pos, rect) in self.positions.iter().zip(&self.glyph_rects) {
            buffer.write_point(*pos);
            buffer.write_glyph_rect(*rect);
        }
    }

    /// Read geometry written by [`flatten`](Self::flatten).
    pub fn unflatten(buffer: &mut ReadBuffer<'_>) -> Result<Self, Error> {
        let raw_format = buffer.read_u8()?;
        let format = MaskFormat::from_u8(raw_format);
        buffer.validate_value(format.is_some(), ErrorKind::InvalidMaskFormat, u64::from(raw_format))?;
        let strike_to_source = buffer.read_f32()?;
        buffer.validate(
            strike_to_source.is_finite() && strike_to_source > 0.0,
            ErrorKind::InvalidScale,
        )?;
        // A point and a glyph rect per glyph.
        let count = buffer.check_glyph_count(8 + 8)?;
        let mut positions = Vec::with_capacity(count);
        let mut glyph_rects = Vec::with_capacity(count);
        for _ in 0..count {
            positions.push(buffer.read_point()?);
            glyph_rects.push(buffer.read_glyph_rect()?);
        }
        Ok(Self::from_parts(
            format.unwrap_or_default(),
            strike_to_source,
            positions,
            glyph_rects,
        ))
    }
}

fn source_rect(rect: GlyphRect, scale: f32, pos: Point) -> Rect {
    let r = rect.to_rect();
    Rect::new(
        r.left * scale + pos.x,
        r.top * scale + pos.y,
        r.right * scale + pos.x,
        r.bottom * scale + pos.y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::PlotLocator;
    use crate::color::palette::css::BLACK;
    use crate::glyph::PackedGlyphId;

    fn locator(l: i32, t: i32, w: i32, h: i32) -> AtlasLocator {
        let mut locator = AtlasLocator::default();
        locator.update_plot_locator(PlotLocator::new(0, 0, 1));
        locator.update_rect(IRect::new(l, t, l + w, t + h));
        locator
    }

    #[test]
    fn layouts_have_no_padding() {
        assert_eq!(size_of::<Mask2DVertex>(), 16);
        assert_eq!(size_of::<Argb2DVertex>(), 12);
        assert_eq!(size_of::<Mask3DVertex>(), 20);
        assert_eq!(size_of::<Argb3DVertex>(), 16);
    }

    #[test]
    fn black_packs_opaque() {
        assert_eq!(pack_color(BLACK).to_ne_bytes(), [0, 0, 0, 255]);
    }

    #[test]
    fn direct_quads_translate_exactly() {
        let glyphs = [(locator(4, 8, 10, 12), Point::new(20.0, -5.0))];
        let mut at_origin = Vec::<Mask2DVertex>::new();
        direct_2d(&mut at_origin, &glyphs, 7, Point::ZERO);
        let mut moved = Vec::<Mask2DVertex>::new();
        direct_2d(&mut moved, &glyphs, 7, Point::new(3.0, -2.0));

        assert_eq!(at_origin[0].position, [20.0, -5.0]);
        assert_eq!(at_origin[3].position, [30.0, 7.0]);
        assert_eq!(at_origin[1].uv, [4, 20]);
        for (a, b) in at_origin.iter().zip(&moved) {
            assert_eq!(b.position, [a.position[0] + 3.0, a.position[1] - 2.0]);
            assert_eq!(a.uv, b.uv);
        }
    }

    #[test]
    fn clipping_shrinks_texture_coordinates() {
        let glyphs = [(locator(100, 100, 10, 10), Point::new(0.0, 0.0))];
        let clip = IRect::new(2, 3, 8, 100);
        let mut out = Vec::<Argb2DVertex>::new();
        generalized_direct_2d(&mut out, &glyphs, 0, Point::ZERO, Some(&clip));
        assert_eq!(out[0].position, [2.0, 3.0]);
        assert_eq!(out[0].uv, [102, 103]);
        assert_eq!(out[3].position, [8.0, 10.0]);
        assert_eq!(out[3].uv, [108, 110]);

        let outside = IRect::new(50, 50, 60, 60);
        out.clear();
        generalized_direct_2d(&mut out, &glyphs, 0, Point::ZERO, Some(&outside));
        assert!(out.iter().all(|v| *v == Argb2DVertex::default()));
    }

    #[test]
    fn identity_view_difference_matches_direct() {
        let glyphs = [(locator(0, 0, 5, 6), Point::new(1.0, 2.0))];
        let mut direct = Vec::<Mask2DVertex>::new();
        direct_2d(&mut direct, &glyphs, 1, Point::ZERO);
        let mut transformed = Vec::<Mask2DVertex>::new();
        transformed_direct_2d(&mut transformed, &glyphs, 1, &Matrix::IDENTITY);
        assert_eq!(direct, transformed);

        let mut perspective = Vec::<Mask3DVertex>::new();
        transformed_direct_3d(&mut perspective, &glyphs, 1, &Matrix::IDENTITY);
        assert_eq!(perspective[0].position, [1.0, 2.0, 1.0]);
    }

    #[test]
    fn direct_compatibility_requires_whole_pixels() {
        let initial = Matrix::translate(0.25, 0.5);
        assert!(can_use_direct(&initial, &Matrix::translate(3.25, -1.5)).0);
        assert!(!can_use_direct(&initial, &Matrix::translate(3.5, -1.5)).0);
        assert!(!can_use_direct(&initial, &Matrix::scale(2.0, 2.0)).0);
        let (_, translation) = can_use_direct(&initial, &Matrix::translate(3.25, -1.5));
        assert_eq!(translation, Point::new(3.0, -2.0));
    }

    #[test]
    fn filler_scales_strike_rects() {
        let glyph = MaskGlyph {
            packed_id: PackedGlyphId::new(1),
            bounds: GlyphRect::new(0, -10, 10, 0),
            format: MaskFormat::A8,
            position: Point::new(5.0, 20.0),
        };
        let filler = TransformedMaskVertexFiller::new(MaskFormat::A8, 0, 0.5, &[glyph]);
        assert_eq!(filler.source_bounds(), Rect::new(5.0, 15.0, 10.0, 20.0));
        let m = Matrix::scale(2.0, 2.0);
        assert_eq!(filler.device_rect(&m), Rect::new(10.0, 30.0, 20.0, 40.0));

        let mut bytes = Vec::new();
        filler.fill_vertex_data(&mut bytes, 0, &[locator(0, 0, 10, 10)], 9, &m);
        let vertices: Vec<Mask2DVertex> = bytes
            .chunks_exact(size_of::<Mask2DVertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[0].position, [10.0, 30.0]);
        assert_eq!(vertices[3].position, [20.0, 40.0]);

        let mut buffer = WriteBuffer::new();
        filler.flatten(&mut buffer);
        let bytes = buffer.into_bytes();
        let read = TransformedMaskVertexFiller::unflatten(&mut ReadBuffer::new(&bytes)).unwrap();
        assert_eq!(read, filler);
    }
}
