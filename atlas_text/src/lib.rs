// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Atlas Text turns positioned glyph runs into GPU-ready text draws.
//!
//! A [`GlyphRunList`] is classified into sub-runs, each drawn with one
//! technique: device-sized masks in a glyph atlas, transformed masks, signed
//! distance fields, outlines, or self-drawing glyphs. Sub-runs are kept in a
//! [`TextBlob`] that is reused across frames while the paint and matrix stay
//! compatible, and their atlas-backed glyphs are (re)uploaded on demand.
//!
//! The entry point is [`TextContext`], which owns the strike caches, the glyph
//! atlases and the blob cache. Actual rasterization is behind
//! [`GlyphRasterizer`](scaler::GlyphRasterizer) and actual drawing is behind
//! [`MeshDrawTarget`] and [`TextCanvas`].
//!
//! ## Features
//!
//! - `vello_cpu` (enabled by default): provides
//!   [`FontRasterizer`](scaler::FontRasterizer), which renders outline glyphs
//!   of real fonts with skrifa and Vello CPU.

// LINEBENDER LINT SET - lib.rs - v3
// See https://linebender.org/wiki/canonical-lints/
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
// END LINEBENDER LINT SET
#![cfg_attr(docsrs, feature(doc_cfg))]

use foldhash::fast::FixedState;

pub use vello_common::{color, kurbo, peniko};

pub mod atlas;
pub mod blob;
pub mod buffer;
pub mod canvas;
pub mod config;
pub mod container;
pub mod context;
pub mod error;
pub mod geom;
pub mod glyph;
pub mod glyph_run;
pub mod glyph_vector;
mod math;
pub mod op;
pub mod paint;
pub mod scaler;
pub mod sdft;
pub mod strike;
pub mod subrun;
pub mod vertex;

pub use blob::{TextBlob, TextBlobCache, TextBlobKey};
pub use canvas::{CanvasCommand, CanvasRecorder, TextCanvas};
pub use config::TextConfig;
pub use container::SubRunContainer;
pub use context::TextContext;
pub use error::{Error, ErrorKind};
pub use geom::{Matrix, Point, Rect};
pub use glyph_run::{GlyphRun, GlyphRunList};
pub use op::{GlyphDraw, GlyphDrawList, MeshDrawTarget};
pub use paint::{Font, Paint, TypefaceId};
pub use subrun::SubRun;

pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, FixedState>;

pub(crate) fn new_map<K, V>() -> HashMap<K, V> {
    HashMap::with_hasher(FixedState::with_seed(0))
}
