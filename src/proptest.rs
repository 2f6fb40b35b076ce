// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Proptest strategies.
//!
//! These are only available when using the `proptest` feature flag.

use ::proptest::collection::{vec, SizeRange};
use ::proptest::strategy::{Strategy, ValueTree};
use std::fmt::Debug;
use std::hash::Hash;

use crate::hash::map::TrieMap;

/// A strategy for a [`TrieMap`] of a given size.
///
/// Duplicate keys in the generated pairs collapse, so the map may come
/// out smaller than `size`.
///
/// # Examples
///
/// ```rust,no_run
/// # use ::proptest::proptest;
/// proptest! {
///     #[test]
///     fn proptest_works(ref m in primetrie::proptest::trie_map(0..9999, ".*", 10..100)) {
///         assert!(m.len() < 100);
///     }
/// }
/// ```
pub fn trie_map<K: Strategy + 'static, V: Strategy + 'static>(
    key: K,
    value: V,
    size: impl Into<SizeRange>,
) -> impl Strategy<Value = TrieMap<<K::Tree as ValueTree>::Value, <V::Tree as ValueTree>::Value>>
where
    <K::Tree as ValueTree>::Value: Hash + Eq + Debug,
    <V::Tree as ValueTree>::Value: Debug,
{
    vec((key, value), size).prop_filter_map("collision list overflowed", |pairs| {
        let map = TrieMap::new();
        map.try_extend(pairs).ok()?;
        Some(map)
    })
}
