// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reading flattened sub-runs.

/// Error produced when reading a flattened sub-run container.
///
/// Carries a non-exhaustive [`ErrorKind`] plus the byte offset of the read
/// that failed. A failed read invalidates the whole buffer; no partially
/// decoded container is ever returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// The non-exhaustive category describing this error.
    kind: ErrorKind,

    /// Byte offset into the buffer where the failure was detected.
    offset: usize,

    /// The value that failed validation, when there is one.
    value: Option<u64>,
}

impl Error {
    /// The machine-readable category for this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Byte offset into the buffer where the failure was detected.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The rejected value, if the error concerns one.
    pub fn value(&self) -> Option<u64> {
        self.value
    }

    pub(crate) fn new(kind: ErrorKind, offset: usize) -> Self {
        Self {
            kind,
            offset,
            value: None,
        }
    }

    pub(crate) fn with_value(kind: ErrorKind, offset: usize, value: u64) -> Self {
        Self {
            kind,
            offset,
            value: Some(value),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let what = match self.kind {
            ErrorKind::Truncated => "buffer ended early",
            ErrorKind::InvalidGlyphCount => "implausible glyph count",
            ErrorKind::InvalidTag => "sub-run tag out of range",
            ErrorKind::InvalidMaskFormat => "unknown mask format",
            ErrorKind::InvalidPadding => "invalid atlas padding",
            ErrorKind::InvalidScale => "non-positive strike to source scale",
            ErrorKind::UnknownStrike => "strike descriptor does not resolve",
            ErrorKind::GlyphCountMismatch => "glyph and position counts differ",
            ErrorKind::InvalidSubRunCount => "container has no sub-runs",
            ErrorKind::InvalidDescriptor => "malformed strike descriptor",
            ErrorKind::MissingGlyphData => "glyph has no path or drawable",
        };
        match self.value {
            Some(value) => write!(f, "{what} ({value}) at byte {}", self.offset),
            None => write!(f, "{what} at byte {}", self.offset),
        }
    }
}

impl core::error::Error for Error {}

/// The non-exhaustive category of an [`Error`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Fewer bytes remained than the read required.
    Truncated,

    /// A glyph count was zero or larger than the remaining bytes allow.
    InvalidGlyphCount,

    /// A sub-run type tag was outside the known set.
    InvalidTag,

    /// A mask format byte did not name a format.
    InvalidMaskFormat,

    /// An atlas padding value was outside `0..=2`.
    InvalidPadding,

    /// A strike to source scale was zero, negative or not finite.
    InvalidScale,

    /// A strike descriptor did not resolve to a strike.
    UnknownStrike,

    /// Per-glyph arrays disagreed in length, or a glyph lacked its path.
    GlyphCountMismatch,

    /// The sub-run count was zero.
    InvalidSubRunCount,

    /// A strike descriptor field was out of range.
    InvalidDescriptor,

    /// A path or drawable glyph no longer has its path or drawable.
    MissingGlyphData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offset_and_value() {
        let err = Error::with_value(ErrorKind::InvalidTag, 12, 9);
        assert_eq!(err.to_string(), "sub-run tag out of range (9) at byte 12");
        let err = Error::new(ErrorKind::Truncated, 3);
        assert_eq!(err.to_string(), "buffer ended early at byte 3");
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }
}
