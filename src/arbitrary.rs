// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use arbitrary::{size_hint, Arbitrary, Error, Result, Unstructured};
use std::hash::{BuildHasher, Hash};

use crate::hash::map::TrieMap;

fn fill<K, V, S, I>(pairs: I) -> Result<TrieMap<K, V, S>>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
    I: Iterator<Item = Result<(K, V)>>,
{
    let map = TrieMap::default();
    for pair in pairs {
        let (key, value) = pair?;
        // A full collision list means the input cannot become a map.
        map.assign(key, value).map_err(|_| Error::IncorrectFormat)?;
    }
    Ok(map)
}

impl<'a, K, V, S> Arbitrary<'a> for TrieMap<K, V, S>
where
    K: Arbitrary<'a> + Hash + Eq,
    V: Arbitrary<'a>,
    S: BuildHasher + Default,
{
    fn arbitrary(u: &mut Unstructured<'a>) -> Result<Self> {
        fill(u.arbitrary_iter()?)
    }

    fn arbitrary_take_rest(u: Unstructured<'a>) -> Result<Self> {
        fill(u.arbitrary_take_rest_iter()?)
    }

    fn size_hint(depth: usize) -> (usize, Option<usize>) {
        size_hint::recursion_guard(depth, |depth| {
            size_hint::and(<usize as Arbitrary>::size_hint(depth), (0, None))
        })
    }
}
