// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The canvas interface path and drawable sub-runs draw through.
//!
//! Atlas sub-runs produce vertex data, but glyphs too large for the atlas
//! are drawn as paths or drawables with ordinary canvas calls. The
//! [`CanvasRecorder`] captures those calls for deferred replay, the same way
//! atlas glyph draws are collected for later submission.

use crate::geom::{Matrix, Rect};
use crate::kurbo::BezPath;
use crate::paint::Paint;

/// The canvas operations text drawing needs.
pub trait TextCanvas {
    /// Push the current matrix.
    fn save(&mut self);

    /// Pop the matrix and any layer pushed since the matching save.
    fn restore(&mut self);

    /// Apply `matrix` before the current matrix.
    fn concat(&mut self, matrix: &Matrix);

    /// Push a layer composited with `paint` on restore.
    fn save_layer(&mut self, bounds: Option<Rect>, paint: &Paint);

    /// Draw `path` under the current matrix.
    fn draw_path(&mut self, path: &BezPath, paint: &Paint);
}

/// A recorded canvas call.
#[derive(Clone, Debug)]
pub enum CanvasCommand {
    /// [`TextCanvas::save`].
    Save,
    /// [`TextCanvas::restore`].
    Restore,
    /// [`TextCanvas::concat`].
    Concat(Matrix),
    /// [`TextCanvas::save_layer`].
    SaveLayer {
        /// Layer bounds in the current space.
        bounds: Option<Rect>,
        /// Compositing paint.
        paint: Paint,
    },
    /// [`TextCanvas::draw_path`].
    DrawPath {
        /// The path.
        path: BezPath,
        /// The paint.
        paint: Paint,
        /// The matrix in effect when the path was drawn.
        matrix: Matrix,
    },
}

/// Records canvas calls, tracking the current matrix.
#[derive(Clone, Debug, Default)]
pub struct CanvasRecorder {
    /// The recorded commands.
    pub commands: Vec<CanvasCommand>,
    matrix: Matrix,
    stack: Vec<Matrix>,
}

impl CanvasRecorder {
    /// Create a recorder whose initial matrix is `matrix`.
    pub fn new(matrix: Matrix) -> Self {
        Self {
            commands: Vec::new(),
            matrix,
            stack: Vec::new(),
        }
    }

    /// The current matrix.
    pub fn total_matrix(&self) -> Matrix {
        self.matrix
    }

    /// Number of unmatched saves.
    pub fn save_count(&self) -> usize {
        self.stack.len()
    }

    /// The recorded paths with the matrix each was drawn under.
    pub fn paths(&self) -> impl Iterator<Item = (&BezPath, &Matrix)> + '_ {
        self.commands.iter().filter_map(|command| match command {
            CanvasCommand::DrawPath { path, matrix, .. } => Some((path, matrix)),
            _ => None,
        })
    }

    /// Replay every command into `canvas`.
    pub fn replay(&self, canvas: &mut dyn TextCanvas) {
        for command in &self.commands {
            match command {
                CanvasCommand::Save => canvas.save(),
                CanvasCommand::Restore => canvas.restore(),
                CanvasCommand::Concat(matrix) => canvas.concat(matrix),
                CanvasCommand::SaveLayer { bounds, paint } => canvas.save_layer(*bounds, paint),
                CanvasCommand::DrawPath { path, paint, .. } => canvas.draw_path(path, paint),
            }
        }
    }
}

impl TextCanvas for CanvasRecorder {
    fn save(&mut self) {
        self.stack.push(self.matrix);
        self.commands.push(CanvasCommand::Save);
    }

    fn restore(&mut self) {
        if let Some(matrix) = self.stack.pop() {
            self.matrix = matrix;
            self.commands.push(CanvasCommand::Restore);
        }
    }

    fn concat(&mut self, matrix: &Matrix) {
        self.matrix = self.matrix * *matrix;
        self.commands.push(CanvasCommand::Concat(*matrix));
    }

    fn save_layer(&mut self, bounds: Option<Rect>, paint: &Paint) {
        self.stack.push(self.matrix);
        self.commands.push(CanvasCommand::SaveLayer {
            bounds,
            paint: paint.clone(),
        });
    }

    fn draw_path(&mut self, path: &BezPath, paint: &Paint) {
        self.commands.push(CanvasCommand::DrawPath {
            path: path.clone(),
            paint: paint.clone(),
            matrix: self.matrix,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kurbo::{Rect as KurboRect, Shape};

    #[test]
    fn restore_pops_the_matrix() {
        let mut canvas = CanvasRecorder::new(Matrix::translate(10.0, 0.0));
        canvas.save();
        canvas.concat(&Matrix::scale(2.0, 2.0));
        let path = KurboRect::new(0.0, 0.0, 1.0, 1.0).to_path(0.1);
        canvas.draw_path(&path, &Paint::default());
        canvas.restore();
        canvas.restore();

        assert_eq!(canvas.total_matrix(), Matrix::translate(10.0, 0.0));
        assert_eq!(canvas.save_count(), 0);
        let (_, matrix) = canvas.paths().next().unwrap();
        assert_eq!(matrix.map_xy(1.0, 1.0).x, 12.0);
        assert_eq!(canvas.commands.len(), 4, "unbalanced restore is ignored");

        let mut copy = CanvasRecorder::default();
        canvas.replay(&mut copy);
        assert_eq!(copy.commands.len(), 4);
    }
}
