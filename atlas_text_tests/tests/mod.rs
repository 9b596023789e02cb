// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! This crate contains the integration test suite for `atlas_text`.
//!
//! - The `util` module holds a synthetic rasterizer and a test environment
//!   that owns a context, a canvas recorder and a draw list.
//! - We do not use the default Rust test harness, but instead use this `mod.rs` file as the
//!   entry point to run all other tests, so that the utilities are shared.
//! - Put new tests into the module of their topic and start the test name with that topic,
//!   e.g. `reuse_whole_pixel_translation` rather than `whole_pixel_translation_reuse`.

#![allow(missing_docs, reason = "we don't need docs for testing")]
#![allow(clippy::cast_possible_truncation, reason = "not critical for testing")]

mod classify;
mod draw;
mod reuse;
mod util;
