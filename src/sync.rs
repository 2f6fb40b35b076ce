// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The per-bucket shared/exclusive lock.
//!
//! The whole lock is one word. The low bits are flags, the rest counts
//! shared holders:
//!
//! - `WRITER`: held exclusively. Shared acquirers wait while it is set.
//! - `UPGRADING`: one shared holder is waiting to become exclusive. Only
//!   one upgrade may be pending; a second `try_upgrade` fails at once so
//!   that two upgraders never wait on each other.
//! - `SEALED`: the bucket has been replaced in its parent. Holders that
//!   find it set must go back and reload the parent slot.
//! - `RETIRED`: the bucket is unreachable. Whoever observes `RETIRED`
//!   together with zero holders frees it.
//!
//! Shared acquisition does not wait for a pending upgrade. A thread that
//! already holds a bucket (through a cursor, say) can therefore always
//! take it again, at the price of letting readers delay an upgrader.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::Backoff;

const WRITER: usize = 1;
const UPGRADING: usize = 1 << 1;
const SEALED: usize = 1 << 2;
const RETIRED: usize = 1 << 3;
const READER: usize = 1 << 4;
const READER_MASK: usize = !(READER - 1);

pub(crate) struct BucketLock {
    state: AtomicUsize,
}

impl BucketLock {
    pub(crate) const fn new() -> Self {
        BucketLock {
            state: AtomicUsize::new(0),
        }
    }

    pub(crate) fn lock_shared(&self) {
        let backoff = Backoff::new();
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            debug_assert!(state & RETIRED == 0, "acquired a retired bucket");
            if state & WRITER != 0 {
                backoff.snooze();
                state = self.state.load(Ordering::Relaxed);
                continue;
            }
            match self.state.compare_exchange_weak(
                state,
                state + READER,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    state = actual;
                    backoff.spin();
                }
            }
        }
    }

    /// Give up a shared hold. Returns `true` when the bucket was retired
    /// and the caller was its last holder, in which case the caller must
    /// free it.
    pub(crate) fn unlock_shared(&self) -> bool {
        let prev = self.state.fetch_sub(READER, Ordering::AcqRel);
        debug_assert!(prev & READER_MASK != 0, "shared unlock without a shared hold");
        let now = prev - READER;
        now & RETIRED != 0 && now & (READER_MASK | WRITER) == 0
    }

    /// Try to turn the caller's shared hold into an exclusive one.
    ///
    /// Returns `false` without waiting when another upgrade is already
    /// pending; the caller keeps its shared hold and should release it
    /// before retrying. Otherwise waits for the other shared holders to
    /// leave and returns `true`.
    pub(crate) fn try_upgrade(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & (UPGRADING | WRITER) != 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                state,
                state | UPGRADING,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => state = actual,
            }
        }
        let backoff = Backoff::new();
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if state & READER_MASK == READER {
                let exclusive = ((state - READER) & !UPGRADING) | WRITER;
                if self
                    .state
                    .compare_exchange_weak(state, exclusive, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return true;
                }
            } else {
                backoff.snooze();
            }
        }
    }

    /// Turn an exclusive hold into a shared one without letting another
    /// writer in between.
    pub(crate) fn downgrade(&self) {
        // WRITER is the lowest bit, so adding `READER - WRITER` clears it
        // and counts one reader in a single step.
        let prev = self.state.fetch_add(READER - WRITER, Ordering::Release);
        debug_assert!(prev & WRITER != 0, "downgrade without an exclusive hold");
    }

    /// Mark the bucket as replaced. Only called under an exclusive hold.
    pub(crate) fn seal(&self) {
        self.state.fetch_or(SEALED, Ordering::Release);
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.state.load(Ordering::Acquire) & SEALED != 0
    }

    /// Mark the bucket as unreachable. Returns `true` when nobody holds
    /// it, in which case the caller must free it.
    pub(crate) fn retire(&self) -> bool {
        let prev = self.state.fetch_or(RETIRED, Ordering::AcqRel);
        debug_assert!(prev & RETIRED == 0, "bucket retired twice");
        prev & (READER_MASK | WRITER) == 0
    }

    #[cfg(test)]
    pub(crate) fn holders(&self) -> usize {
        self.state.load(Ordering::Relaxed) / READER
    }
}
