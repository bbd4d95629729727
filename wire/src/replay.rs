// SPDX-License-Identifier: BSD-3-Clause

//! Anti-replay window, per spec §4.3.
//!
//! Purely in-memory, owned by the dispatcher, and empty at every engage.
//! A lazy sweep on insert is sufficient to bound memory; there is no
//! background reaper.

use std::collections::HashMap;

/// Tolerance, in milliseconds, for `|now - ts|`.
pub const WINDOW_MS: u64 = 120_000;

/// Hard cap on the number of `(principal, nonce)` pairs held at once. The
/// time-based sweep bounds memory in the common case; this is the backstop
/// spec §5 requires ("implementations MUST cap... replay-window
/// cardinality") against a flood of distinct nonces within one window.
pub const MAX_ENTRIES: usize = 100_000;

#[derive(Debug, PartialEq, Eq)]
pub enum Rejection {
    /// `|now_ms - ts_ms| > WINDOW_MS`.
    OutOfSkew,
    /// This `(principal, nonce)` pair was already seen inside the window.
    DuplicateNonce,
    /// The window is at [`MAX_ENTRIES`] even after sweeping expired entries.
    CapacityExceeded,
}

#[derive(Default)]
pub struct ReplayWindow {
    seen: HashMap<(Vec<u8>, Vec<u8>), u64>,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks and, on success, records `(principal, nonce)` at `ts_ms`.
    pub fn check(
        &mut self,
        principal: &[u8],
        nonce: &[u8],
        ts_ms: u64,
        now_ms: u64,
    ) -> Result<(), Rejection> {
        let skew = now_ms.abs_diff(ts_ms);
        if skew > WINDOW_MS {
            return Err(Rejection::OutOfSkew);
        }

        self.sweep(now_ms);

        let key = (principal.to_vec(), nonce.to_vec());
        if self.seen.contains_key(&key) {
            return Err(Rejection::DuplicateNonce);
        }

        if self.seen.len() >= MAX_ENTRIES {
            return Err(Rejection::CapacityExceeded);
        }

        self.seen.insert(key, ts_ms);
        Ok(())
    }

    /// Drops entries older than `WINDOW_MS` relative to `now_ms`.
    fn sweep(&mut self, now_ms: u64) {
        self.seen
            .retain(|_, &mut ts| now_ms.abs_diff(ts) <= WINDOW_MS);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
