// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Little-endian byte buffers for flattening sub-runs.
//!
//! [`ReadBuffer`] is sticky: after the first failed read or validation every
//! later read fails with the same error, so callers can decode a whole record
//! and check once, or bail early with `?`.

use crate::error::{Error, ErrorKind};
use crate::geom::{GlyphRect, Matrix, Point, Rect};

/// Accumulates flattened data.
#[derive(Clone, Debug, Default)]
pub struct WriteBuffer {
    data: Vec<u8>,
}

impl WriteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.data.len()
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Write one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.data.push(v);
    }

    /// Write a bool as one byte.
    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    /// Write a `u16`.
    pub fn write_u16(&mut self, v: u16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `i16`.
    pub fn write_i16(&mut self, v: i16) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Write an `f32` by its bit pattern.
    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    /// Write a count as `u32`, saturating.
    pub fn write_count(&mut self, n: usize) {
        self.write_u32(u32::try_from(n).unwrap_or(u32::MAX));
    }

    /// Write a point.
    pub fn write_point(&mut self, p: Point) {
        self.write_f32(p.x);
        self.write_f32(p.y);
    }

    /// Write a rectangle.
    pub fn write_rect(&mut self, r: &Rect) {
        self.write_f32(r.left);
        self.write_f32(r.top);
        self.write_f32(r.right);
        self.write_f32(r.bottom);
    }

    /// Write glyph bounds.
    pub fn write_glyph_rect(&mut self, r: GlyphRect) {
        self.write_i16(r.left);
        self.write_i16(r.top);
        self.write_i16(r.right);
        self.write_i16(r.bottom);
    }

    /// Write all nine matrix elements.
    pub fn write_matrix(&mut self, m: &Matrix) {
        for v in m.as_row_major() {
            self.write_f32(v);
        }
    }
}

/// Reads flattened data, remembering the first failure.
#[derive(Clone, Debug)]
pub struct ReadBuffer<'a> {
    data: &'a [u8],
    pos: usize,
    error: Option<Error>,
}

impl<'a> ReadBuffer<'a> {
    /// Read from `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            error: None,
        }
    }

    /// Current read offset.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether no read has failed yet.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The first failure, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Mark the buffer invalid with `kind` unless `cond` holds.
    pub fn validate(&mut self, cond: bool, kind: ErrorKind) -> Result<(), Error> {
        self.check()?;
        if cond {
            Ok(())
        } else {
            Err(self.fail(Error::new(kind, self.pos)))
        }
    }

    /// Like [`validate`](Self::validate), recording the offending value.
    pub fn validate_value(&mut self, cond: bool, kind: ErrorKind, value: u64) -> Result<(), Error> {
        self.check()?;
        if cond {
            Ok(())
        } else {
            Err(self.fail(Error::with_value(kind, self.pos, value)))
        }
    }

    /// Read a glyph count and check it is positive and that `bytes_per_glyph`
    /// bytes for each glyph are still available.
    pub fn check_glyph_count(&mut self, bytes_per_glyph: usize) -> Result<usize, Error> {
        let count = self.read_u32()?;
        let n = count as usize;
        let plausible = n > 0
            && n.checked_mul(bytes_per_glyph)
                .is_some_and(|bytes| bytes <= self.available());
        self.validate_value(plausible, ErrorKind::InvalidGlyphCount, u64::from(count))?;
        Ok(n)
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take::<1>()?[0])
    }

    /// Read a bool.
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a `u16`.
    pub fn read_u16(&mut self) -> Result<u16, Error> {
        self.take().map(u16::from_le_bytes)
    }

    /// Read an `i16`.
    pub fn read_i16(&mut self) -> Result<i16, Error> {
        self.take().map(i16::from_le_bytes)
    }

    /// Read a `u32`.
    pub fn read_u32(&mut self) -> Result<u32, Error> {
        self.take().map(u32::from_le_bytes)
    }

    /// Read an `i32`.
    pub fn read_i32(&mut self) -> Result<i32, Error> {
        self.take().map(i32::from_le_bytes)
    }

    /// Read an `f32`.
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read a point.
    pub fn read_point(&mut self) -> Result<Point, Error> {
        Ok(Point::new(self.read_f32()?, self.read_f32()?))
    }

    /// Read a rectangle.
    pub fn read_rect(&mut self) -> Result<Rect, Error> {
        Ok(Rect::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Read glyph bounds.
    pub fn read_glyph_rect(&mut self) -> Result<GlyphRect, Error> {
        Ok(GlyphRect::new(
            self.read_i16()?,
            self.read_i16()?,
            self.read_i16()?,
            self.read_i16()?,
        ))
    }

    /// Read a matrix.
    pub fn read_matrix(&mut self) -> Result<Matrix, Error> {
        let mut m = [0.0; 9];
        for v in &mut m {
            *v = self.read_f32()?;
        }
        Ok(Matrix::from_row_major(m))
    }

    fn check(&self) -> Result<(), Error> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.error = Some(err.clone());
        err
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        self.check()?;
        let Some(bytes) = self
            .data
            .get(self.pos..self.pos + N)
            .and_then(|s| <[u8; N]>::try_from(s).ok())
        else {
            return Err(self.fail(Error::new(ErrorKind::Truncated, self.pos)));
        };
        self.pos += N;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_round_trip_little_endian() {
        let mut w = WriteBuffer::new();
        w.write_u16(0x0102);
        w.write_f32(-1.5);
        w.write_bool(true);
        assert_eq!(&w.as_bytes()[..2], &[0x02, 0x01], "u16 is little endian");

        let mut r = ReadBuffer::new(w.as_bytes());
        assert_eq!(r.read_u16(), Ok(0x0102));
        assert_eq!(r.read_f32(), Ok(-1.5));
        assert_eq!(r.read_bool(), Ok(true));
        assert_eq!(r.available(), 0);
    }

    #[test]
    fn failure_is_sticky() {
        let bytes = [1_u8, 2, 3];
        let mut r = ReadBuffer::new(&bytes);
        let err = r.read_u32().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
        assert!(!r.is_valid());
        assert_eq!(r.read_u8().unwrap_err(), err, "later reads report the first error");
    }

    #[test]
    fn glyph_count_checks_remaining_bytes() {
        let mut w = WriteBuffer::new();
        w.write_u32(2);
        w.write_u32(0);
        w.write_u32(0);
        let mut r = ReadBuffer::new(w.as_bytes());
        assert_eq!(r.check_glyph_count(4), Ok(2));

        let mut r = ReadBuffer::new(w.as_bytes());
        let err = r.check_glyph_count(8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGlyphCount);
        assert_eq!(err.value(), Some(2));

        let mut zero = WriteBuffer::new();
        zero.write_u32(0);
        let mut r = ReadBuffer::new(zero.as_bytes());
        assert!(r.check_glyph_count(1).is_err(), "zero glyphs is never plausible");
    }
}
