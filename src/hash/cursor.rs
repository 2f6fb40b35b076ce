// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cursors and iterators over a [`TrieMap`].
//!
//! A cursor holds every bucket on the path from the root down to the
//! entry it rests on, plus a reference to that entry. Holding the path
//! fixes the shape of the trie around the cursor: collision lists on the
//! path cannot be grown out from under it, and walking back up never
//! has to revisit a bucket that may have been freed.
//!
//! Slots are only read while pinned to the map's collector, and the pin
//! is dropped before a move returns. A resting cursor therefore holds up
//! no garbage but the buckets on its path and its own entry.

use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Formatter};
use std::iter::FusedIterator;
use std::ptr::NonNull;
use std::sync::Arc;

use crossbeam_epoch::Guard;

use crate::error::Error;
use crate::hash::map::TrieMap;
use crate::nodes::bucket::{Bucket, BucketGuard};
use crate::nodes::entry::{self, Entry};
use crate::nodes::slot::Slot;
use crate::shared_ptr::Shared;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    BeforeFirst,
    At,
    AfterLast,
}

enum Found<K, V> {
    Entry(usize, Arc<Entry<K, V>>),
    Child(BucketGuard<K, V>),
}

/// Look at one slot of a held bucket. Sealed children are skipped over
/// by reloading the slot, which by then points at their replacement.
fn visit<K, V>(bucket: &Bucket<K, V>, index: usize, _pin: &Guard) -> Option<Found<K, V>> {
    loop {
        match bucket.load(index) {
            Slot::Empty => return None,
            Slot::Entry(ptr) => {
                return Some(Found::Entry(index, unsafe { entry::clone_raw(ptr) }));
            }
            Slot::Child(child) => {
                let guard = unsafe { BucketGuard::acquire(NonNull::new_unchecked(child)) };
                if !guard.is_sealed() {
                    return Some(Found::Child(guard));
                }
            }
        }
    }
}

/// A bidirectional cursor over a map's entries.
///
/// A fresh cursor sits before the first entry. Entries come out in
/// trie order, which depends on the hasher and is not stable across
/// modifications.
///
/// A cursor never blocks lookups, replacements or removals. Adding a new
/// key to a collision list, however, takes the whole list exclusively,
/// whether or not the list has a free slot. While a cursor rests inside a
/// collision list, every insertion of a new key into that list waits
/// until the cursor moves on or is dropped. Don't do that from the thread
/// that owns the cursor.
///
/// # Examples
///
/// ```
/// # use primetrie::{Error, TrieMap};
/// let map = TrieMap::new();
/// map.assign(1, "one").unwrap();
///
/// let mut cursor = map.cursor();
/// assert!(cursor.get().is_none());
/// assert_eq!(Ok(true), cursor.move_next());
/// assert_eq!("one", **cursor.get().unwrap());
/// assert_eq!(Ok(false), cursor.move_next());
/// assert_eq!(Err(Error::PastEndIteration), cursor.move_next());
/// assert_eq!(Ok(true), cursor.move_prev());
/// assert_eq!(&1, cursor.get().unwrap().key());
/// ```
pub struct Cursor<'a, K, V, S = RandomState> {
    map: &'a TrieMap<K, V, S>,
    // Root first. Empty unless the cursor rests on an entry.
    path: Vec<BucketGuard<K, V>>,
    index: usize,
    current: Option<Shared<K, V>>,
    state: State,
}

impl<'a, K, V, S> Cursor<'a, K, V, S> {
    pub(crate) fn new(map: &'a TrieMap<K, V, S>) -> Self {
        Cursor {
            map,
            path: Vec::new(),
            index: 0,
            current: None,
            state: State::BeforeFirst,
        }
    }

    /// The entry the cursor rests on, if any.
    #[must_use]
    pub fn get(&self) -> Option<&Shared<K, V>> {
        self.current.as_ref()
    }

    /// Move to the next entry. Returns `Ok(false)` when there is none,
    /// leaving the cursor past the end.
    ///
    /// Fails with [`Error::PastEndIteration`] if the cursor is already
    /// past the end.
    pub fn move_next(&mut self) -> Result<bool, Error> {
        let pin = self.map.pin();
        let from = match self.state {
            State::AfterLast => return Err(Error::PastEndIteration),
            State::BeforeFirst => {
                self.path.push(self.map.hold_root(&pin));
                0
            }
            State::At => self.index + 1,
        };
        self.current = None;
        Ok(self.seek_forward(from, &pin))
    }

    /// Move to the previous entry. Returns `Ok(false)` when there is
    /// none, leaving the cursor before the first entry.
    ///
    /// Fails with [`Error::PastEndIteration`] if the cursor is already
    /// before the first entry.
    pub fn move_prev(&mut self) -> Result<bool, Error> {
        let pin = self.map.pin();
        let upto = match self.state {
            State::BeforeFirst => return Err(Error::PastEndIteration),
            State::AfterLast => {
                let root = self.map.hold_root(&pin);
                let width = root.width();
                self.path.push(root);
                width
            }
            State::At => self.index,
        };
        self.current = None;
        Ok(self.seek_backward(upto, &pin))
    }

    fn seek_forward(&mut self, mut from: usize, pin: &Guard) -> bool {
        loop {
            let Some(bucket) = self.path.last() else {
                self.state = State::AfterLast;
                return false;
            };
            match (from..bucket.width()).find_map(|index| visit(bucket, index, pin)) {
                Some(Found::Entry(index, entry)) => return self.land(index, entry),
                Some(Found::Child(child)) => {
                    self.path.push(child);
                    from = 0;
                }
                None => from = self.climb() + 1,
            }
        }
    }

    fn seek_backward(&mut self, mut upto: usize, pin: &Guard) -> bool {
        loop {
            let Some(bucket) = self.path.last() else {
                self.state = State::BeforeFirst;
                return false;
            };
            match (0..upto).rev().find_map(|index| visit(bucket, index, pin)) {
                Some(Found::Entry(index, entry)) => return self.land(index, entry),
                Some(Found::Child(child)) => {
                    upto = child.width();
                    self.path.push(child);
                }
                None => upto = self.climb(),
            }
        }
    }

    fn land(&mut self, index: usize, entry: Arc<Entry<K, V>>) -> bool {
        self.index = index;
        self.current = Some(Shared::new(entry));
        self.state = State::At;
        true
    }

    /// Let go of the deepest bucket, returning its slot in its parent.
    fn climb(&mut self) -> usize {
        self.path
            .pop()
            .map_or(0, |bucket| bucket.parent_index())
    }
}

impl<'a, K, V, S> Drop for Cursor<'a, K, V, S> {
    fn drop(&mut self) {
        // Leaf first, so no bucket is let go before the ones below it.
        while self.path.pop().is_some() {}
    }
}

impl<'a, K, V, S> Debug for Cursor<'a, K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("depth", &self.path.len())
            .field("current", &self.current)
            .finish()
    }
}

/// An iterator over the entries of a [`TrieMap`].
///
/// Every entry present for the iterator's whole lifetime is yielded
/// exactly once. Entries inserted or erased meanwhile may or may not be.
pub struct Iter<'a, K, V, S = RandomState> {
    cursor: Cursor<'a, K, V, S>,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    pub(crate) fn new(cursor: Cursor<'a, K, V, S>) -> Self {
        Iter { cursor }
    }
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = Shared<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.move_next() {
            Ok(true) => self.cursor.get().cloned(),
            _ => None,
        }
    }
}

impl<'a, K, V, S> FusedIterator for Iter<'a, K, V, S> {}

impl<'a, K, V, S> IntoIterator for &'a TrieMap<K, V, S> {
    type Item = Shared<K, V>;
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
