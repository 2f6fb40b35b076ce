// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::Guard;

use super::entry::{self, Entry};
use super::slot::{Slot, EMPTY};
use crate::sync::BucketLock;

/// How a bucket maps a hash onto one of its slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Indexing {
    /// A trie level: the slot is the residual hash modulo the divisor,
    /// which equals the width.
    Radix(u64),
    /// A collision list: every slot is scanned.
    Linear,
}

/// An array of slots plus the lock that guards structural changes to it.
pub(crate) struct Bucket<K, V> {
    lock: BucketLock,
    parent: *const Bucket<K, V>,
    parent_index: usize,
    depth: usize,
    indexing: Indexing,
    occupancy: AtomicUsize,
    // Only maintained on roots.
    elements: AtomicUsize,
    slots: Box<[AtomicUsize]>,
    phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new(
        width: usize,
        indexing: Indexing,
        depth: usize,
        parent: *const Bucket<K, V>,
        parent_index: usize,
    ) -> Box<Self> {
        Box::new(Bucket {
            lock: BucketLock::new(),
            parent,
            parent_index,
            depth,
            indexing,
            occupancy: AtomicUsize::new(0),
            elements: AtomicUsize::new(0),
            slots: (0..width).map(|_| AtomicUsize::new(EMPTY)).collect(),
            phantom: PhantomData,
        })
    }

    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub(crate) fn indexing(&self) -> Indexing {
        self.indexing
    }

    #[inline]
    pub(crate) fn is_list(&self) -> bool {
        self.indexing == Indexing::Linear
    }

    #[inline]
    pub(crate) fn parent(&self) -> *const Bucket<K, V> {
        self.parent
    }

    #[inline]
    pub(crate) fn parent_index(&self) -> usize {
        self.parent_index
    }

    #[inline]
    pub(crate) fn occupancy(&self) -> &AtomicUsize {
        &self.occupancy
    }

    #[inline]
    pub(crate) fn elements(&self) -> &AtomicUsize {
        &self.elements
    }

    #[inline]
    pub(crate) fn is_sealed(&self) -> bool {
        self.lock.is_sealed()
    }

    #[inline]
    pub(crate) fn load_word(&self, index: usize) -> usize {
        self.slots[index].load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn load(&self, index: usize) -> Slot<K, V> {
        Slot::decode(self.load_word(index))
    }

    /// Compare-and-swap one slot. On failure returns the word found.
    #[inline]
    pub(crate) fn cas(&self, index: usize, current: usize, new: usize) -> Result<(), usize> {
        self.slots[index]
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Write a slot of a bucket nobody else can see yet, or of one held
    /// exclusively.
    #[inline]
    pub(crate) fn store(&self, index: usize, word: usize) {
        self.slots[index].store(word, Ordering::Release);
    }

    /// Mark a bucket unreachable, freeing it now if nobody holds it.
    ///
    /// # Safety
    ///
    /// `bucket` must be unreachable from every slot, and no thread may be
    /// able to acquire it anew.
    pub(crate) unsafe fn retire(bucket: NonNull<Self>) {
        unsafe {
            if bucket.as_ref().lock.retire() {
                drop(Box::from_raw(bucket.as_ptr()));
            }
        }
    }

    /// Give up a shared hold, freeing the bucket if it was retired and
    /// this was the last hold on it.
    ///
    /// # Safety
    ///
    /// The caller must hold `bucket` shared and must not touch it again.
    unsafe fn release_shared(bucket: NonNull<Self>) {
        let this = unsafe { bucket.as_ref() };
        if this.lock.unlock_shared() {
            let depth = this.depth;
            drop(unsafe { Box::from_raw(bucket.as_ptr()) });
            tracing::trace!(depth, "freed retired bucket on release");
        }
    }
}

impl<K, V> Drop for Bucket<K, V> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            match Slot::<K, V>::decode(*slot.get_mut()) {
                Slot::Empty => {}
                Slot::Entry(ptr) => drop(unsafe { entry::from_raw(ptr) }),
                Slot::Child(child) => unsafe { Bucket::retire(NonNull::new_unchecked(child)) },
            }
        }
    }
}

/// A shared hold on a bucket, released on drop.
pub(crate) struct BucketGuard<K, V> {
    bucket: NonNull<Bucket<K, V>>,
}

impl<K, V> BucketGuard<K, V> {
    /// # Safety
    ///
    /// `bucket` must stay allocated until the lock is taken: either it
    /// was loaded while the caller was pinned or held the bucket whose
    /// slot it came from, or it is a bucket the caller owns outright.
    pub(crate) unsafe fn acquire(bucket: NonNull<Bucket<K, V>>) -> Self {
        unsafe { bucket.as_ref() }.lock.lock_shared();
        BucketGuard { bucket }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut Bucket<K, V> {
        self.bucket.as_ptr()
    }

    /// Try to hold the bucket exclusively. `None` means another thread
    /// is already upgrading; the caller should let go and start over.
    pub(crate) fn try_upgrade(&self) -> Option<Upgraded<'_, K, V>> {
        if self.lock.try_upgrade() {
            Some(Upgraded { guard: self })
        } else {
            None
        }
    }
}

impl<K, V> Deref for BucketGuard<K, V> {
    type Target = Bucket<K, V>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { self.bucket.as_ref() }
    }
}

impl<K, V> Drop for BucketGuard<K, V> {
    fn drop(&mut self) {
        unsafe { Bucket::release_shared(self.bucket) }
    }
}

/// An exclusive hold obtained by upgrading a [`BucketGuard`]. Dropping
/// it downgrades back to the shared hold.
pub(crate) struct Upgraded<'g, K, V> {
    guard: &'g BucketGuard<K, V>,
}

impl<'g, K, V> Upgraded<'g, K, V> {
    /// Mark the bucket as replaced in its parent.
    pub(crate) fn seal(&self) {
        self.guard.lock.seal();
    }

    /// Empty every slot without touching the references they held. Used
    /// once those references have moved to a replacement bucket.
    pub(crate) fn forget_slots(&self) {
        for slot in self.guard.slots.iter() {
            slot.store(EMPTY, Ordering::Release);
        }
        self.guard.occupancy.store(0, Ordering::Release);
    }
}

impl<'g, K, V> Deref for Upgraded<'g, K, V> {
    type Target = Bucket<K, V>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.guard
    }
}

impl<'g, K, V> Drop for Upgraded<'g, K, V> {
    fn drop(&mut self) {
        self.guard.lock.downgrade();
    }
}

/// A reference that left a slot. Threads pinned before it left may
/// still be about to use it, so it is only let go once they unpin.
pub(crate) enum Garbage<K, V> {
    Entry(Arc<Entry<K, V>>),
    Bucket(NonNull<Bucket<K, V>>),
}

impl<K, V> Garbage<K, V> {
    /// Hand the reference to the collector `pin` belongs to.
    ///
    /// The collector must be dropped before `K` and `V` go out of scope:
    /// the map owns its collector for that reason.
    pub(crate) fn defer(self, pin: &Guard) {
        unsafe { pin.defer_unchecked(move || self.dispose()) }
    }

    fn dispose(self) {
        match self {
            Garbage::Entry(entry) => drop(entry),
            // Unlinked before it was deferred, so nobody can acquire it
            // anew once every earlier pin is gone.
            Garbage::Bucket(bucket) => unsafe { Bucket::retire(bucket) },
        }
    }
}
