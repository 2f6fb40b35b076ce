// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// Widths of successive trie levels.
///
/// Each entry is prime and roughly double its predecessor. A map picks
/// its root width as the smallest entry no smaller than the expected
/// capacity, and each deeper level takes the next entry.
pub(crate) const PRIME_LADDER: [usize; 30] = [
    2, 5, 11, 23, 53, 97, 193, 389, 769, 1543, 3079, 6151, 12289, 24593, 49157, 98317, 196613,
    393241, 786433, 1572869, 3145739, 6291469, 12582917, 25165843, 50331653, 100663319,
    201326611, 402653189, 805306457, 1610612741,
];

/// Depth at which the trie degrades into a collision list.
pub(crate) const DEFAULT_MAX_DEPTH: usize = 3;

/// Expected capacity used by `TrieMap::new`.
pub(crate) const DEFAULT_EXPECTED_CAPACITY: usize = 64;

/// Width of a freshly promoted collision list.
#[cfg(feature = "small-chunks")]
pub(crate) const COLLISION_LIST_WIDTH: usize = 2;
#[cfg(not(feature = "small-chunks"))]
pub(crate) const COLLISION_LIST_WIDTH: usize = 4;

/// Number of times a collision list may double before inserts fail.
pub(crate) const LIST_GROWTH_LIMIT: u32 = 16;

/// Default bound on the width of a collision list.
pub(crate) const DEFAULT_MAX_LIST_WIDTH: usize = COLLISION_LIST_WIDTH << LIST_GROWTH_LIMIT;
