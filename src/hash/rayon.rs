// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parallel insertion.
//!
//! These are only available when using the `rayon` feature flag.

use ::rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::hash::{BuildHasher, Hash};

use crate::error::Error;
use crate::hash::map::TrieMap;

impl<K, V, S> TrieMap<K, V, S>
where
    K: Hash + Eq + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Sync,
{
    /// Assign every pair from a parallel iterator, using rayon's worker
    /// threads to insert concurrently.
    ///
    /// Stops early on the first error; pairs assigned by then stay in
    /// the map.
    ///
    /// # Examples
    ///
    /// ```
    /// # use primetrie::TrieMap;
    /// use rayon::prelude::*;
    ///
    /// let map = TrieMap::new();
    /// map.par_try_extend((0..1000).into_par_iter().map(|i| (i, i * 2))).unwrap();
    /// assert_eq!(1000, map.len());
    /// ```
    pub fn par_try_extend<I>(&self, iter: I) -> Result<(), Error>
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        iter.into_par_iter()
            .try_for_each(|(key, value)| self.assign(key, value).map(|_| ()))
    }
}
