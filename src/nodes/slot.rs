// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tagged slot words.
//!
//! A slot is an `AtomicUsize` holding zero (empty), an entry pointer, or
//! a bucket pointer with the low bit set. Both pointee types are aligned
//! to at least two bytes, so the low bit of a real pointer is always
//! clear.

use std::fmt;

use super::bucket::Bucket;
use super::entry::Entry;

const TAG_CHILD: usize = 1;

pub(crate) const EMPTY: usize = 0;

pub(crate) enum Slot<K, V> {
    Empty,
    Entry(*const Entry<K, V>),
    Child(*mut Bucket<K, V>),
}

impl<K, V> Slot<K, V> {
    #[inline]
    pub(crate) fn decode(word: usize) -> Self {
        if word == EMPTY {
            Slot::Empty
        } else if word & TAG_CHILD != 0 {
            Slot::Child((word & !TAG_CHILD) as *mut Bucket<K, V>)
        } else {
            Slot::Entry(word as *const Entry<K, V>)
        }
    }
}

#[inline]
pub(crate) fn entry_word<K, V>(ptr: *const Entry<K, V>) -> usize {
    let word = ptr as usize;
    debug_assert!(word != EMPTY && word & TAG_CHILD == 0, "misaligned entry");
    word
}

#[inline]
pub(crate) fn child_word<K, V>(ptr: *mut Bucket<K, V>) -> usize {
    let word = ptr as usize;
    debug_assert!(word != EMPTY && word & TAG_CHILD == 0, "misaligned bucket");
    word | TAG_CHILD
}

impl<K, V> fmt::Debug for Slot<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Empty => write!(f, "Empty"),
            Slot::Entry(ptr) => write!(f, "Entry({:p})", ptr),
            Slot::Child(ptr) => write!(f, "Child({:p})", ptr),
        }
    }
}
