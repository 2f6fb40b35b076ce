// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! # A concurrent hash trie for Rust
//!
//! This library provides [`TrieMap`], a hash map that many threads can
//! read and write at once through a shared reference.
//!
//! ## How it works
//!
//! The map is a trie of buckets. Each bucket is an array of slots, and
//! each slot is empty, holds an entry, or points at a child bucket. The
//! bucket widths come from a fixed ladder of primes, each roughly double
//! the last: the root is as wide as the first prime no smaller than the
//! capacity you ask for, and every level below takes the next one. A key
//! picks its slot at each level from what remains of its hash after the
//! levels above have taken theirs.
//!
//! When two keys want the same slot, the one already there is pushed
//! down into a new child bucket. After a configurable number of levels
//! the trie stops splitting, and keys that still collide share a
//! *collision list*, which doubles in width whenever it fills up.
//!
//! Lookups, insertions into free slots, replacements and removals all
//! work by compare-and-swap on a single slot while holding the bucket's
//! lock in shared mode. Adding a new key to a collision list is the only
//! operation that takes a bucket exclusively.
//!
//! ## Handles, not references
//!
//! Entries are reference counted. [`TrieMap::get`] returns a [`Shared`]
//! handle that keeps the key and value alive for as long as you hold it,
//! even if the entry is replaced or removed in the meantime, or the
//! whole map is cleared or dropped. Values are never changed in place:
//! [`TrieMap::assign`] installs a new entry, and holders of the old one
//! keep seeing the old value.
//!
//! ## Iteration
//!
//! [`TrieMap::iter`] walks the map while other threads modify it. Every
//! entry that stays in the map for the whole walk is seen exactly once;
//! entries added or removed during the walk may or may not be. For
//! stepping backwards as well as forwards, use [`TrieMap::cursor`].
//!
//! ```
//! # use primetrie::TrieMap;
//! use std::thread;
//!
//! let map = TrieMap::new();
//! thread::scope(|scope| {
//!     for t in 0..4 {
//!         let map = &map;
//!         scope.spawn(move || {
//!             for i in 0..100 {
//!                 map.assign(t * 100 + i, i).unwrap();
//!             }
//!         });
//!     }
//! });
//! assert_eq!(400, map.len());
//! assert_eq!(400, map.iter().count());
//! ```
//!
//! ## Errors
//!
//! Contention is never an error; operations that lose a race retry on
//! their own. What can fail is configuration, and insertion into a
//! collision list that is full and already at its width bound. See
//! [`Error`].
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! | ------- | ----------- |
//! | [`proptest`](https://crates.io/crates/proptest) | Strategies for all `primetrie` datatypes under a `proptest` namespace, eg. `primetrie::proptest::trie_map` |
//! | [`serde`](https://crates.io/crates/serde) | [`Serialize`](https://docs.rs/serde/latest/serde/trait.Serialize.html) and [`Deserialize`](https://docs.rs/serde/latest/serde/trait.Deserialize.html) implementations for [`TrieMap`] |
//! | [`rayon`](https://crates.io/crates/rayon) | Parallel insertion with [`TrieMap::par_try_extend`] |
//! | [`arbitrary`](https://crates.io/crates/arbitrary/) | [`arbitrary::Arbitrary`](https://docs.rs/arbitrary/latest/arbitrary/trait.Arbitrary.html) implementation for [`TrieMap`] |
//! | `debug` | Exposes `TrieMap::check_invariants` |
//! | `small-chunks` | Starts collision lists at width 2, so that growth is exercised early |

#![forbid(rust_2018_idioms)]
#![deny(nonstandard_style)]
#![warn(unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod nodes;
mod shared_ptr;
mod sync;
mod util;

mod hash {
    pub(crate) mod cursor;
    pub(crate) mod map;

    #[cfg(any(test, feature = "rayon"))]
    pub(crate) mod rayon;
}

pub mod triemap {
    //! A concurrent hash trie map.
    //!
    //! See [`TrieMap`] for the details.

    pub use crate::hash::cursor::{Cursor, Iter};
    pub use crate::hash::map::{Builder, Stats, TrieMap};
}

#[cfg(any(test, feature = "proptest"))]
#[cfg_attr(docsrs, doc(cfg(feature = "proptest")))]
pub mod proptest;

#[cfg(any(test, feature = "serde"))]
#[doc(hidden)]
pub mod ser;

#[cfg(feature = "arbitrary")]
#[doc(hidden)]
pub mod arbitrary;

pub use crate::error::Error;
pub use crate::shared_ptr::Shared;
pub use crate::triemap::{Builder, Cursor, Iter, Stats, TrieMap};

#[cfg(test)]
mod test;
