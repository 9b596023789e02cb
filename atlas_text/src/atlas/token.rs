// Copyright 2025 the Parley Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draw tokens order atlas uses against flushes.

/// Identifies one recorded draw. Tokens increase monotonically.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DrawToken(u64);

impl DrawToken {
    /// A token older than every issued token.
    pub const ALREADY_FLUSHED: Self = Self(0);

    /// The token after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Issues draw tokens and tracks which of them have been flushed.
///
/// A plot whose last use is before [`next_flush_token`](Self::next_flush_token)
/// is not referenced by any unflushed draw and may be evicted.
#[derive(Clone, Debug, Default)]
pub struct TokenTracker {
    current_draw: DrawToken,
    current_flush: DrawToken,
}

impl TokenTracker {
    /// Create a tracker with nothing issued.
    pub fn new() -> Self {
        Self::default()
    }

    /// The token the next recorded draw will receive.
    pub fn next_draw_token(&self) -> DrawToken {
        self.current_draw.next()
    }

    /// Record a draw, returning its token.
    pub fn issue_draw_token(&mut self) -> DrawToken {
        self.current_draw = self.current_draw.next();
        self.current_draw
    }

    /// The first token that has not been flushed.
    pub fn next_flush_token(&self) -> DrawToken {
        self.current_flush.next()
    }

    /// Mark every issued draw as flushed.
    pub fn flush(&mut self) {
        self.current_flush = self.current_draw;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_releases_issued_draws() {
        let mut tracker = TokenTracker::new();
        let token = tracker.issue_draw_token();
        assert!(token >= tracker.next_flush_token(), "draw is still pending");
        tracker.flush();
        assert!(token < tracker.next_flush_token(), "draw was flushed");
        assert_eq!(tracker.next_draw_token(), token.next());
    }
}
