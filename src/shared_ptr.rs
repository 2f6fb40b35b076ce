// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Shared handles to map entries.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::nodes::entry::Entry;

/// A reference-counted handle to one entry of a [`TrieMap`][crate::TrieMap].
///
/// The handle keeps its key and value alive after the entry has been
/// erased from the map or replaced by [`assign`][crate::TrieMap::assign],
/// so readers never observe a value changing under them.
///
/// Dereferences to the value.
///
/// # Examples
///
/// ```
/// # use primetrie::TrieMap;
/// let map = TrieMap::new();
/// map.assign("answer", 42).unwrap();
/// let shared = map.get("answer").unwrap();
/// map.erase("answer");
/// assert_eq!(42, *shared);
/// assert_eq!(&"answer", shared.key());
/// ```
pub struct Shared<K, V> {
    entry: Arc<Entry<K, V>>,
}

impl<K, V> Shared<K, V> {
    #[inline]
    pub(crate) fn new(entry: Arc<Entry<K, V>>) -> Self {
        Shared { entry }
    }

    /// The entry's key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &K {
        &self.entry.key
    }

    /// The entry's value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &V {
        &self.entry.value
    }

    /// Both halves of the entry.
    #[inline]
    #[must_use]
    pub fn pair(&self) -> (&K, &V) {
        (&self.entry.key, &self.entry.value)
    }

    /// Test whether two handles refer to the same entry, rather than to
    /// equal ones.
    #[inline]
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.entry, &other.entry)
    }

    /// The number of live references to this entry, including the one
    /// held by the map if the entry is still installed.
    #[must_use]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.entry)
    }

    /// Take the key and value out of the entry if this is the only
    /// reference left, or get the handle back otherwise.
    pub fn try_unwrap(this: Self) -> Result<(K, V), Self> {
        match Arc::try_unwrap(this.entry) {
            Ok(entry) => Ok((entry.key, entry.value)),
            Err(entry) => Err(Shared { entry }),
        }
    }
}

impl<K, V> Clone for Shared<K, V> {
    #[inline]
    fn clone(&self) -> Self {
        Shared {
            entry: self.entry.clone(),
        }
    }
}

impl<K, V> Deref for Shared<K, V> {
    type Target = V;

    #[inline]
    fn deref(&self) -> &V {
        &self.entry.value
    }
}

impl<K, V> AsRef<V> for Shared<K, V> {
    #[inline]
    fn as_ref(&self) -> &V {
        &self.entry.value
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Shared<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared")
            .field(&self.entry.key)
            .field(&self.entry.value)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use std::cell::Cell;

    assert_impl_all!(Shared<i32, String>: Send, Sync, Clone);
    assert_not_impl_any!(Shared<i32, Cell<i32>>: Sync);

    #[test]
    fn unwrap_only_when_unique() {
        let shared = Shared::new(Entry::new("k", 1, 0));
        let other = shared.clone();
        assert!(Shared::ptr_eq(&shared, &other));
        assert_eq!(2, Shared::strong_count(&shared));
        let shared = Shared::try_unwrap(shared).unwrap_err();
        drop(other);
        assert_eq!(Ok(("k", 1)), Shared::try_unwrap(shared).map_err(|_| ()));
    }

    #[test]
    fn debug_shows_pair() {
        let shared = Shared::new(Entry::new(1, "one", 0));
        assert_eq!("Shared(1, \"one\")", format!("{:?}", shared));
    }
}
