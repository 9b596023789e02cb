// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Signed distance fields from 8-bit coverage masks.
//!
//! Edge texels are seeded with an anti-aliased distance estimate (Gustavson
//! 2011) and the distances are then propagated with Danielsson's 8SSEDT.

use bitflags::bitflags;

use crate::geom::Point;
use crate::math::pin;

/// Distances are clamped to `(-MAGNITUDE, MAGNITUDE]` texels.
pub const DISTANCE_FIELD_MAGNITUDE: f32 = 4.0;

/// Texels added on each side of a glyph so the field can reach
/// [`DISTANCE_FIELD_MAGNITUDE`] away from any edge.
pub const DISTANCE_FIELD_PAD: usize = 4;

/// Amount distance field quads are inset when drawn, in texels.
pub const DISTANCE_FIELD_INSET: i16 = 2;

const FAR_AWAY_SQ: f32 = 2_000_000.0;
const FAR_AWAY: Point = Point::new(1000.0, 1000.0);

#[derive(Copy, Clone, Debug)]
struct Cell {
    alpha: f32,
    dist_sq: f32,
    dist_vector: Point,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            alpha: 0.0,
            dist_sq: FAR_AWAY_SQ,
            dist_vector: FAR_AWAY,
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct Neighbors: u8 {
        const LEFT = 0x01;
        const RIGHT = 0x02;
        const TOP_LEFT = 0x04;
        const TOP = 0x08;
        const TOP_RIGHT = 0x10;
        const BOTTOM_LEFT = 0x20;
        const BOTTOM = 0x40;
        const BOTTOM_RIGHT = 0x80;
    }
}

const NEIGHBOR_OFFSETS: [(Neighbors, isize, isize); 8] = [
    (Neighbors::LEFT, -1, 0),
    (Neighbors::RIGHT, 1, 0),
    (Neighbors::TOP_LEFT, -1, -1),
    (Neighbors::TOP, 0, -1),
    (Neighbors::TOP_RIGHT, 1, -1),
    (Neighbors::BOTTOM_LEFT, -1, 1),
    (Neighbors::BOTTOM, 0, 1),
    (Neighbors::BOTTOM_RIGHT, 1, 1),
];

/// An edge is where coverage crosses 128, or where two partially covered
/// texels below 128 touch.
fn found_edge(image: &[u8], width: usize, x: usize, y: usize, neighbors: Neighbors) -> bool {
    let current = image[y * width + x];
    let current_inside = current >> 7;
    NEIGHBOR_OFFSETS
        .iter()
        .filter(|(flag, _, _)| neighbors.contains(*flag))
        .any(|&(_, dx, dy)| {
            let nx = x.wrapping_add_signed(dx);
            let ny = y.wrapping_add_signed(dy);
            let neighbor = image[ny * width + nx];
            let neighbor_inside = neighbor >> 7;
            current_inside != neighbor_inside
                || (current_inside == 0 && current != 0 && neighbor != 0)
        })
}

/// Distance to an edge from a texel with coverage `alpha`, given the unit
/// edge normal `direction`.
fn edge_distance(direction: Point, alpha: f32) -> f32 {
    let (mut dx, mut dy) = (direction.x, direction.y);
    if dx.abs() < f32::EPSILON || dy.abs() < f32::EPSILON {
        return 0.5 - alpha;
    }
    // Fold into the first octant.
    dx = dx.abs();
    dy = dy.abs();
    if dx < dy {
        core::mem::swap(&mut dx, &mut dy);
    }
    let a1_num = 0.5 * dy;
    if alpha * dx < a1_num {
        0.5 * (dx + dy) - (2.0 * dx * dy * alpha).sqrt()
    } else if alpha * dx < dx - a1_num {
        (0.5 - alpha) * dx
    } else {
        -0.5 * (dx + dy) + (2.0 * dx * dy * (1.0 - alpha)).sqrt()
    }
}

fn normalize(v: Point) -> Point {
    let len = (v.x * v.x + v.y * v.y).sqrt();
    if len > f32::EPSILON {
        Point::new(v.x / len, v.y / len)
    } else {
        Point::ZERO
    }
}

struct Grid {
    cells: Vec<Cell>,
    edges: Vec<bool>,
    width: usize,
    height: usize,
}

impl Grid {
    fn at(&self, x: usize, y: usize) -> &Cell {
        &self.cells[y * self.width + x]
    }

    /// Relax `(x, y)` against the neighbor at `(nx, ny)`.
    ///
    /// `step` is the offset from the neighbor to the current texel.
    fn relax(&mut self, x: usize, y: usize, nx: usize, ny: usize, step: (f32, f32)) {
        let check = *self.at(nx, ny);
        let v = check.dist_vector;
        let candidate = Point::new(v.x + step.0, v.y + step.1);
        let dist_sq = check.dist_sq
            + 2.0 * (v.x * step.0 + v.y * step.1)
            + step.0 * step.0
            + step.1 * step.1;
        let current = &mut self.cells[y * self.width + x];
        if dist_sq < current.dist_sq {
            current.dist_sq = dist_sq;
            current.dist_vector = candidate;
        }
    }

    fn forward_left_to_right(&mut self, x: usize, y: usize) {
        self.relax(x, y, x - 1, y - 1, (-1.0, -1.0));
        self.relax(x, y, x, y - 1, (0.0, -1.0));
        self.relax(x, y, x + 1, y - 1, (1.0, -1.0));
        self.relax(x, y, x - 1, y, (-1.0, 0.0));
    }

    fn forward_right_to_left(&mut self, x: usize, y: usize) {
        self.relax(x, y, x + 1, y, (1.0, 0.0));
    }

    fn backward_left_to_right(&mut self, x: usize, y: usize) {
        self.relax(x, y, x - 1, y, (-1.0, 0.0));
    }

    fn backward_right_to_left(&mut self, x: usize, y: usize) {
        self.relax(x, y, x + 1, y, (1.0, 0.0));
        self.relax(x, y, x - 1, y + 1, (-1.0, 1.0));
        self.relax(x, y, x, y + 1, (0.0, 1.0));
        self.relax(x, y, x + 1, y + 1, (1.0, 1.0));
    }
}

/// Convert a signed distance into a byte with zero at 128.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the value is pinned into [0, 255.5) before rounding"
)]
fn pack_distance(dist: f32) -> u8 {
    let m = DISTANCE_FIELD_MAGNITUDE;
    // 128 values lie below zero but only 127 above it.
    let dist = pin(-dist, -m, m * 127.0 / 128.0) + m;
    (dist / (2.0 * m) * 256.0).round() as u8
}

/// Build a distance field from a `width` x `height` A8 mask.
///
/// The result is `(width + 2 * PAD) x (height + 2 * PAD)` bytes. Inside texels
/// are above 128.
pub fn generate_distance_field(mask: &[u8], width: usize, height: usize) -> Vec<u8> {
    let out_width = width + 2 * DISTANCE_FIELD_PAD;
    let out_height = height + 2 * DISTANCE_FIELD_PAD;
    if mask.len() < width * height {
        return vec![0; out_width * out_height];
    }

    // The mask gets a one texel zero border so edge detection sees the outside.
    let copy_width = width + 2;
    let copy_height = height + 2;
    let mut copy = vec![0_u8; copy_width * copy_height];
    for (row, src) in mask.chunks_exact(width.max(1)).take(height).enumerate() {
        let start = (row + 1) * copy_width + 1;
        copy[start..start + width].copy_from_slice(src);
    }

    // One more texel around the output acts as "infinitely far" scan padding.
    let pad = DISTANCE_FIELD_PAD + 1;
    let data_width = width + 2 * pad;
    let data_height = height + 2 * pad;
    let mut grid = Grid {
        cells: vec![Cell::default(); data_width * data_height],
        edges: vec![false; data_width * data_height],
        width: data_width,
        height: data_height,
    };

    // Copy coverage and mark edges. The padded copy starts at `PAD`.
    let origin = DISTANCE_FIELD_PAD;
    for y in 0..copy_height {
        for x in 0..copy_width {
            let mut neighbors = Neighbors::all();
            if x == 0 {
                neighbors -= Neighbors::LEFT | Neighbors::TOP_LEFT | Neighbors::BOTTOM_LEFT;
            }
            if x == copy_width - 1 {
                neighbors -= Neighbors::RIGHT | Neighbors::TOP_RIGHT | Neighbors::BOTTOM_RIGHT;
            }
            if y == 0 {
                neighbors -= Neighbors::TOP_LEFT | Neighbors::TOP | Neighbors::TOP_RIGHT;
            }
            if y == copy_height - 1 {
                neighbors -= Neighbors::BOTTOM_LEFT | Neighbors::BOTTOM | Neighbors::BOTTOM_RIGHT;
            }
            let index = (y + origin) * data_width + x + origin;
            let value = copy[y * copy_width + x];
            grid.cells[index].alpha = f32::from(value) / 255.0;
            grid.edges[index] = found_edge(&copy, copy_width, x, y, neighbors);
        }
    }

    // Seed edge texels from the local coverage gradient, which points from
    // low to high coverage.
    for y in 1..data_height - 1 {
        for x in 1..data_width - 1 {
            let index = y * data_width + x;
            if !grid.edges[index] {
                continue;
            }
            let a = |dx: isize, dy: isize| {
                grid.at(x.wrapping_add_signed(dx), y.wrapping_add_signed(dy))
                    .alpha
            };
            let sqrt2 = core::f32::consts::SQRT_2;
            let gradient = Point::new(
                a(1, -1) - a(-1, -1) + (a(1, 0) - a(-1, 0)) * sqrt2 + a(1, 1) - a(-1, 1),
                a(-1, 1) - a(-1, -1) + (a(0, 1) - a(0, -1)) * sqrt2 + a(1, 1) - a(1, -1),
            );
            let direction = normalize(gradient);
            let dist = edge_distance(direction, grid.cells[index].alpha);
            let cell = &mut grid.cells[index];
            cell.dist_vector = direction * dist;
            cell.dist_sq = dist * dist;
        }
    }

    // Forward in y.
    for y in 1..data_height - 1 {
        for x in 1..data_width - 1 {
            if !grid.edges[y * data_width + x] {
                grid.forward_left_to_right(x, y);
            }
        }
        for x in (1..data_width - 1).rev() {
            if !grid.edges[y * data_width + x] {
                grid.forward_right_to_left(x, y);
            }
        }
    }
    // Backward in y.
    for y in (1..data_height - 1).rev() {
        for x in 1..data_width - 1 {
            if !grid.edges[y * data_width + x] {
                grid.backward_left_to_right(x, y);
            }
        }
        for x in (1..data_width - 1).rev() {
            if !grid.edges[y * data_width + x] {
                grid.backward_right_to_left(x, y);
            }
        }
    }

    let mut field = Vec::with_capacity(out_width * out_height);
    for y in 1..grid.height - 1 {
        for x in 1..grid.width - 1 {
            let cell = grid.at(x, y);
            let dist = if cell.alpha > 0.5 {
                -cell.dist_sq.sqrt()
            } else {
                cell.dist_sq.sqrt()
            };
            field.push(pack_distance(dist));
        }
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_distance_centers_on_128() {
        assert_eq!(pack_distance(0.0), 128);
        assert_eq!(pack_distance(100.0), 0, "far outside clamps to zero");
        assert_eq!(pack_distance(-100.0), 255, "far inside clamps below 256");
    }

    #[test]
    fn field_is_padded_and_signed() {
        let (w, h) = (8, 8);
        let mut mask = vec![0_u8; w * h];
        for y in 2..6 {
            for x in 2..6 {
                mask[y * w + x] = 255;
            }
        }
        let field = generate_distance_field(&mask, w, h);
        let fw = w + 2 * DISTANCE_FIELD_PAD;
        assert_eq!(field.len(), fw * (h + 2 * DISTANCE_FIELD_PAD));
        let center = field[(4 + DISTANCE_FIELD_PAD) * fw + 4 + DISTANCE_FIELD_PAD];
        let corner = field[0];
        assert!(center > 128, "inside is above 128, got {center}");
        assert!(corner < 128, "outside is below 128, got {corner}");
    }

    #[test]
    fn edge_distance_of_axis_aligned_edge() {
        assert_eq!(edge_distance(Point::new(1.0, 0.0), 0.5), 0.0);
        assert_eq!(edge_distance(Point::new(0.0, 1.0), 0.0), 0.5);
    }
}
