// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Every codebase needs a `util` module.

use std::hash::{BuildHasher, Hash};

use crate::config::{
    COLLISION_LIST_WIDTH, DEFAULT_EXPECTED_CAPACITY, DEFAULT_MAX_DEPTH, DEFAULT_MAX_LIST_WIDTH,
    PRIME_LADDER,
};
use crate::error::Error;

pub(crate) fn hash_key<K: Hash + ?Sized, S: BuildHasher>(bh: &S, key: &K) -> u64 {
    bh.hash_one(key)
}

/// The level widths a map was built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Ladder {
    start: usize,
    max_depth: usize,
    max_list_width: usize,
}

impl Ladder {
    pub(crate) fn new(
        expected_capacity: usize,
        max_depth: usize,
        max_list_width: usize,
    ) -> Result<Self, Error> {
        if max_depth == 0 {
            return Err(Error::InvalidDepth);
        }
        let start = PRIME_LADDER
            .iter()
            .position(|&prime| prime >= expected_capacity)
            .ok_or(Error::CapacityExceeded)?;
        if start + max_depth > PRIME_LADDER.len() {
            return Err(Error::CapacityExceeded);
        }
        Ok(Ladder {
            start,
            max_depth,
            max_list_width: max_list_width.max(COLLISION_LIST_WIDTH),
        })
    }

    const DEFAULT_START: usize = Ladder::start_for(DEFAULT_EXPECTED_CAPACITY);

    const fn start_for(expected_capacity: usize) -> usize {
        let mut start = 0;
        while PRIME_LADDER[start] < expected_capacity {
            start += 1;
        }
        start
    }

    #[inline]
    pub(crate) fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[inline]
    pub(crate) fn max_list_width(&self) -> usize {
        self.max_list_width
    }

    /// Width of the trie level at `depth`.
    #[inline]
    pub(crate) fn width(&self, depth: usize) -> usize {
        debug_assert!(depth < self.max_depth);
        PRIME_LADDER[self.start + depth]
    }

    /// What is left of `hash` once the levels above `depth` have each
    /// consumed their radix.
    pub(crate) fn residual(&self, hash: u64, depth: usize) -> u64 {
        (0..depth).fold(hash, |residual, level| {
            residual / self.width(level) as u64
        })
    }
}

impl Default for Ladder {
    fn default() -> Self {
        Ladder {
            start: Ladder::DEFAULT_START,
            max_depth: DEFAULT_MAX_DEPTH,
            max_list_width: DEFAULT_MAX_LIST_WIDTH,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn is_prime(n: usize) -> bool {
        n >= 2 && (2..).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    #[test]
    fn ladder_is_prime_and_roughly_doubling() {
        for pair in PRIME_LADDER.windows(2) {
            assert!(is_prime(pair[0]) && is_prime(pair[1]));
            assert!(pair[1] > pair[0] * 3 / 2 && pair[1] < pair[0] * 3);
        }
    }

    #[test]
    fn start_is_smallest_prime_not_below_capacity() {
        assert_eq!(2, Ladder::new(0, 3, 0).unwrap().width(0));
        assert_eq!(23, Ladder::new(16, 3, 0).unwrap().width(0));
        assert_eq!(53, Ladder::new(16, 3, 0).unwrap().width(1));
        assert_eq!(97, Ladder::new(97, 1, 0).unwrap().width(0));
    }

    #[test]
    fn rejects_configurations_past_the_ladder() {
        assert_eq!(Err(Error::InvalidDepth), Ladder::new(16, 0, 0));
        assert_eq!(Err(Error::CapacityExceeded), Ladder::new(usize::MAX, 1, 0));
        let last = PRIME_LADDER.len() - 1;
        assert!(Ladder::new(PRIME_LADDER[last], 1, 0).is_ok());
        assert_eq!(
            Err(Error::CapacityExceeded),
            Ladder::new(PRIME_LADDER[last], 2, 0)
        );
    }

    #[test]
    fn default_matches_explicit_configuration() {
        assert_eq!(
            Ok(Ladder::default()),
            Ladder::new(
                DEFAULT_EXPECTED_CAPACITY,
                DEFAULT_MAX_DEPTH,
                DEFAULT_MAX_LIST_WIDTH
            )
        );
    }

    #[test]
    fn residual_peels_each_level() {
        let ladder = Ladder::new(16, 3, 0).unwrap();
        let hash = 23 * 53 * 5 + 23 * 7 + 3;
        assert_eq!(hash, ladder.residual(hash, 0));
        assert_eq!(3, ladder.residual(hash, 0) % 23);
        assert_eq!(7, ladder.residual(hash, 1) % 53);
        assert_eq!(5, ladder.residual(hash, 2));
    }
}
