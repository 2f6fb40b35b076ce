// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;

/// An immutable key/value pair, shared between the slot that holds it
/// and any handles given out for it.
///
/// The strong count of the surrounding `Arc` is the entry's reference
/// count: a slot owns one reference, and every [`Shared`][crate::Shared]
/// handle or cursor position owns another. The weak count is unused.
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: V, hash: u64) -> Arc<Self> {
        Arc::new(Entry { key, value, hash })
    }
}

/// Give up ownership of one strong reference, returning the raw pointer
/// that slots store.
#[inline]
pub(crate) fn into_raw<K, V>(entry: Arc<Entry<K, V>>) -> *const Entry<K, V> {
    Arc::into_raw(entry)
}

/// Take back a strong reference previously given up with [`into_raw`].
///
/// # Safety
///
/// `ptr` must come from `into_raw`, and the reference it stands for must
/// not be reclaimed twice.
#[inline]
pub(crate) unsafe fn from_raw<K, V>(ptr: *const Entry<K, V>) -> Arc<Entry<K, V>> {
    unsafe { Arc::from_raw(ptr) }
}

/// Mint a new strong reference to an entry that a slot points at.
///
/// # Safety
///
/// The caller must hold the lock of the bucket the pointer was loaded
/// from; that keeps the slot's own reference from being dropped.
#[inline]
pub(crate) unsafe fn clone_raw<K, V>(ptr: *const Entry<K, V>) -> Arc<Entry<K, V>> {
    unsafe {
        Arc::increment_strong_count(ptr);
        Arc::from_raw(ptr)
    }
}
