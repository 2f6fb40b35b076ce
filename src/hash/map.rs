// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A concurrent hash trie map.
//!
//! Every level of the trie is an array of slots whose width is taken
//! from a ladder of primes. A key's slot at a given level is what is
//! left of its hash once the levels above have divided their widths out
//! of it, modulo the level's own width. Once the trie is `max_depth`
//! levels deep, keys that still collide share a collision list, which
//! is scanned linearly and doubles in width when it fills up.
//!
//! Slots are updated with compare-and-swap while their bucket is held
//! shared. The only exclusive holds are taken to add a new key to a
//! collision list, so lookups, updates and erasures never wait for each
//! other.
//!
//! Entries are reference counted: a lookup hands out a [`Shared`] handle
//! which keeps its key and value alive no matter what happens to the map
//! afterwards. A reference that leaves a slot is handed to the map's
//! epoch collector, and dropped as soon as every operation that might
//! have loaded it has finished.

use std::borrow::Borrow;
use std::collections::hash_map::RandomState;
use std::fmt::{Debug, Formatter};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{Collector, Guard};
use crossbeam_utils::Backoff;

use crate::config::{
    COLLISION_LIST_WIDTH, DEFAULT_EXPECTED_CAPACITY, DEFAULT_MAX_DEPTH, DEFAULT_MAX_LIST_WIDTH,
};
use crate::error::Error;
use crate::hash::cursor::{Cursor, Iter};
use crate::nodes::bucket::{Bucket, BucketGuard, Garbage, Indexing};
use crate::nodes::entry::{self, Entry};
use crate::nodes::slot::{child_word, entry_word, Slot, EMPTY};
use crate::shared_ptr::Shared;
use crate::util::{hash_key, Ladder};

/// A concurrent hash map built as a trie of prime-width levels.
///
/// All operations take `&self`; share the map between threads with an
/// [`Arc`] or a scoped borrow.
///
/// # Examples
///
/// ```
/// # use primetrie::TrieMap;
/// let map = TrieMap::new();
/// let (first, inserted) = map.insert_if_absent(1, || "one").unwrap();
/// assert!(inserted);
/// assert_eq!("one", *first);
///
/// let (again, inserted) = map.insert_if_absent(1, || unreachable!()).unwrap();
/// assert!(!inserted);
/// assert_eq!("one", *again);
///
/// map.assign(1, "uno").unwrap();
/// assert_eq!("uno", *map.get(&1).unwrap());
/// // Handles taken earlier keep the value they saw.
/// assert_eq!("one", *first);
/// ```
pub struct TrieMap<K, V, S = RandomState> {
    root: AtomicPtr<Bucket<K, V>>,
    ladder: Ladder,
    hasher: S,
    // Garbage goes to a collector owned by the map rather than the global
    // one, so that it is all dropped by the time the map is, and keys and
    // values need not be 'static.
    collector: Collector,
}

// The map hands out entries to other threads and drops them on
// whichever thread lets go last, hence the `Sync` bounds on `Send`.
unsafe impl<K: Send + Sync, V: Send + Sync, S: Send> Send for TrieMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for TrieMap<K, V, S> {}

/// Configure a [`TrieMap`] before building it.
///
/// # Examples
///
/// ```
/// # use primetrie::TrieMap;
/// let map: TrieMap<u64, String> = TrieMap::builder()
///     .expected_capacity(1000)
///     .max_depth(2)
///     .build()
///     .unwrap();
/// assert_eq!(1543, map.root_width());
/// assert_eq!(2, map.max_depth());
/// ```
pub struct Builder<K, V, S = RandomState> {
    expected_capacity: usize,
    max_depth: usize,
    max_list_width: usize,
    hasher: S,
    phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Builder<K, V, RandomState> {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Builder {
            expected_capacity: DEFAULT_EXPECTED_CAPACITY,
            max_depth: DEFAULT_MAX_DEPTH,
            max_list_width: DEFAULT_MAX_LIST_WIDTH,
            hasher: RandomState::new(),
            phantom: PhantomData,
        }
    }
}

impl<K, V> Default for Builder<K, V, RandomState> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Builder<K, V, S> {
    /// The number of keys the root level should be able to spread out
    /// without collisions. The root width is the smallest ladder prime
    /// not below it.
    #[must_use]
    pub fn expected_capacity(mut self, expected_capacity: usize) -> Self {
        self.expected_capacity = expected_capacity;
        self
    }

    /// The number of trie levels, the root included, before keys fall
    /// into collision lists.
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// The widest a collision list may grow. Inserting into a full list
    /// of this width fails with [`Error::CapacityExceeded`].
    #[must_use]
    pub fn max_list_width(mut self, max_list_width: usize) -> Self {
        self.max_list_width = max_list_width;
        self
    }

    /// Use a different hasher.
    #[must_use]
    pub fn hasher<S2>(self, hasher: S2) -> Builder<K, V, S2> {
        Builder {
            expected_capacity: self.expected_capacity,
            max_depth: self.max_depth,
            max_list_width: self.max_list_width,
            hasher,
            phantom: PhantomData,
        }
    }

    /// Build an empty map.
    ///
    /// Fails with [`Error::InvalidDepth`] for a depth of zero, and with
    /// [`Error::CapacityExceeded`] when the levels would run off the end
    /// of the prime ladder.
    pub fn build(self) -> Result<TrieMap<K, V, S>, Error> {
        let ladder = Ladder::new(self.expected_capacity, self.max_depth, self.max_list_width)?;
        Ok(TrieMap::from_parts(ladder, self.hasher))
    }
}

impl<K, V, S: Clone> Clone for Builder<K, V, S> {
    fn clone(&self) -> Self {
        Builder {
            expected_capacity: self.expected_capacity,
            max_depth: self.max_depth,
            max_list_width: self.max_list_width,
            hasher: self.hasher.clone(),
            phantom: PhantomData,
        }
    }
}

impl<K, V, S: Debug> Debug for Builder<K, V, S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("expected_capacity", &self.expected_capacity)
            .field("max_depth", &self.max_depth)
            .field("max_list_width", &self.max_list_width)
            .field("hasher", &self.hasher)
            .finish()
    }
}

/// A snapshot of a map's shape, for tuning and for tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Entries found.
    pub entries: usize,
    /// Number of buckets at each depth, the root first. Collision lists
    /// are counted at the depth they sit at.
    pub buckets_per_depth: Vec<usize>,
    /// Number of collision lists.
    pub collision_lists: usize,
    /// Entries found in collision lists.
    pub list_entries: usize,
    /// Width of the widest collision list, or zero.
    pub widest_list: usize,
}

enum Mode {
    KeepExisting,
    Replace,
}

struct Outcome<K, V> {
    entry: Arc<Entry<K, V>>,
    inserted: bool,
    replaced: Option<Arc<Entry<K, V>>>,
}

/// The entry an insertion wants to install. The value is only built once
/// a slot is actually about to receive it.
struct Candidate<K, V, F> {
    hash: u64,
    state: CandidateState<K, V, F>,
}

enum CandidateState<K, V, F> {
    Lazy(K, F),
    Ready(Arc<Entry<K, V>>),
    Spent,
}

impl<K, V, F: FnOnce() -> V> Candidate<K, V, F> {
    fn lazy(hash: u64, key: K, make: F) -> Self {
        Candidate {
            hash,
            state: CandidateState::Lazy(key, make),
        }
    }

    fn key(&self) -> &K {
        match &self.state {
            CandidateState::Lazy(key, _) => key,
            CandidateState::Ready(entry) => &entry.key,
            CandidateState::Spent => unreachable!("candidate used after its value panicked"),
        }
    }

    /// A new reference to the candidate entry, building it on first use.
    fn materialize(&mut self) -> Arc<Entry<K, V>> {
        if let CandidateState::Lazy(..) = self.state {
            if let CandidateState::Lazy(key, make) =
                mem::replace(&mut self.state, CandidateState::Spent)
            {
                self.state = CandidateState::Ready(Entry::new(key, make(), self.hash));
            }
        }
        match &self.state {
            CandidateState::Ready(entry) => entry.clone(),
            _ => unreachable!("candidate used after its value panicked"),
        }
    }
}

impl<K, V> Candidate<K, V, fn() -> V> {
    fn ready(hash: u64, key: K, value: V) -> Self {
        Candidate {
            hash,
            state: CandidateState::Ready(Entry::new(key, value, hash)),
        }
    }
}

/// An operation on its way down the trie.
///
/// The walk is hand over hand: a child is held before its parent is let
/// go, except that a collision list's parent stays held, since growing
/// the list rewrites the parent's slot. The root the operation started
/// from is only pinned, which keeps it allocated for counting.
// Field order is release order: bucket holds first, the pin last.
struct Descent<K, V> {
    here: BucketGuard<K, V>,
    upper: Option<BucketGuard<K, V>>,
    root: NonNull<Bucket<K, V>>,
    residual: u64,
    pin: Guard,
}

impl<K, V> Descent<K, V> {
    fn bucket(&self) -> &Bucket<K, V> {
        &self.here
    }

    /// The element count of the root this operation started from.
    fn count(&self) -> &AtomicUsize {
        // Retired roots are only freed once every pin taken before the
        // swap is gone.
        unsafe { self.root.as_ref() }.elements()
    }

    /// Step into a child loaded from the current bucket. Leaves the
    /// descent where it was if the child turns out to be sealed; the
    /// caller then reloads the slot.
    fn enter(&mut self, child: *mut Bucket<K, V>) {
        // Loaded while pinned and holding its parent.
        let guard = unsafe { BucketGuard::acquire(NonNull::new_unchecked(child)) };
        if guard.is_sealed() {
            return;
        }
        if let Indexing::Radix(divisor) = self.here.indexing() {
            self.residual /= divisor;
        }
        let parent = mem::replace(&mut self.here, guard);
        if self.here.is_list() {
            self.upper = Some(parent);
        }
    }
}

impl<K, V> TrieMap<K, V, RandomState> {
    /// Construct an empty map with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Construct an empty map sized for `expected_capacity` keys at the
    /// root, with `max_depth` trie levels above the collision lists.
    ///
    /// # Examples
    ///
    /// ```
    /// # use primetrie::{Error, TrieMap};
    /// let map = TrieMap::<u32, u32>::with_config(16, 3).unwrap();
    /// assert_eq!(23, map.root_width());
    /// assert_eq!(
    ///     Some(Error::InvalidDepth),
    ///     TrieMap::<u32, u32>::with_config(16, 0).err()
    /// );
    /// ```
    pub fn with_config(expected_capacity: usize, max_depth: usize) -> Result<Self, Error> {
        Self::builder()
            .expected_capacity(expected_capacity)
            .max_depth(max_depth)
            .build()
    }

    /// Start configuring a map.
    #[must_use]
    pub fn builder() -> Builder<K, V> {
        Builder::new()
    }
}

impl<K, V, S> TrieMap<K, V, S> {
    /// Construct an empty map with the default configuration and the
    /// given hasher.
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        Self::from_parts(Ladder::default(), hasher)
    }

    fn from_parts(ladder: Ladder, hasher: S) -> Self {
        TrieMap {
            root: AtomicPtr::new(Self::new_root(&ladder)),
            ladder,
            hasher,
            collector: Collector::new(),
        }
    }

    fn new_root(ladder: &Ladder) -> *mut Bucket<K, V> {
        let width = ladder.width(0);
        Box::into_raw(Bucket::new(
            width,
            Indexing::Radix(width as u64),
            0,
            ptr::null(),
            0,
        ))
    }

    /// A fresh bucket to hang below slot `parent_index` of `parent`.
    fn new_child(&self, parent: &Bucket<K, V>, parent_index: usize) -> Box<Bucket<K, V>> {
        let depth = parent.depth() + 1;
        if depth < self.ladder.max_depth() {
            let width = self.ladder.width(depth);
            Bucket::new(width, Indexing::Radix(width as u64), depth, parent, parent_index)
        } else {
            Bucket::new(COLLISION_LIST_WIDTH, Indexing::Linear, depth, parent, parent_index)
        }
    }

    /// Pin the current thread to the map's collector. Nothing loaded out
    /// of a slot while pinned is freed before the pin is dropped.
    pub(crate) fn pin(&self) -> Guard {
        self.collector.register().pin()
    }

    fn current_root(&self, _pin: &Guard) -> NonNull<Bucket<K, V>> {
        // Never null: roots are only ever swapped for fresh ones.
        unsafe { NonNull::new_unchecked(self.root.load(Ordering::Acquire)) }
    }

    /// Hold the current root.
    pub(crate) fn hold_root(&self, pin: &Guard) -> BucketGuard<K, V> {
        unsafe { BucketGuard::acquire(self.current_root(pin)) }
    }

    fn descend(&self, hash: u64) -> Descent<K, V> {
        let pin = self.pin();
        let root = self.current_root(&pin);
        Descent {
            here: unsafe { BucketGuard::acquire(root) },
            upper: None,
            root,
            residual: hash,
            pin,
        }
    }

    /// Get the number of entries in the map.
    ///
    /// Under concurrent modification this is a snapshot that may already
    /// be stale.
    #[must_use]
    pub fn len(&self) -> usize {
        let pin = self.pin();
        unsafe { self.current_root(&pin).as_ref() }
            .elements()
            .load(Ordering::Acquire)
    }

    /// Test whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a reference to the map's [`BuildHasher`].
    #[must_use]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// The number of trie levels above the collision lists.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.ladder.max_depth()
    }

    /// The number of slots in the root level.
    #[must_use]
    pub fn root_width(&self) -> usize {
        self.ladder.width(0)
    }

    /// The widest a collision list may grow.
    #[must_use]
    pub fn max_list_width(&self) -> usize {
        self.ladder.max_list_width()
    }

    /// Get an iterator over the map's entries.
    ///
    /// The iterator holds every bucket between the root and its position,
    /// so the entries it has yet to reach cannot be moved behind it. It
    /// does not block lookups, replacements or removals anywhere, and it
    /// keeps no removed entry alive except the one it rests on.
    ///
    /// Adding a new key to a collision list takes the list exclusively,
    /// even when the list has a free slot. While the iterator rests inside
    /// a collision list, every insertion of a new key into that list waits
    /// until the iterator moves on or is dropped. Doing that from the
    /// thread that owns the iterator never returns.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter::new(self.cursor())
    }

    /// Get a cursor positioned before the first entry.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_, K, V, S> {
        Cursor::new(self)
    }

    /// Discard every entry.
    ///
    /// The map switches over to a fresh root at once. Operations already
    /// under way finish against the old one, which is torn down after
    /// the last of them lets go. Handles to entries stay valid.
    pub fn clear(&self) {
        let pin = self.pin();
        let old = self.root.swap(Self::new_root(&self.ladder), Ordering::AcqRel);
        // Unreachable from now on; freed once earlier pins and holds are gone.
        Garbage::Bucket(unsafe { NonNull::new_unchecked(old) }).defer(&pin);
        tracing::debug!("cleared map");
    }

    /// Count the buckets and entries the map is made of.
    ///
    /// Takes no exclusive holds; under concurrent modification the
    /// result mixes states from different moments.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let pin = self.pin();
        let root = self.hold_root(&pin);
        let mut stats = Stats::default();
        collect_stats(&root, &mut stats);
        stats
    }
}

fn collect_stats<K, V>(bucket: &Bucket<K, V>, stats: &mut Stats) {
    let depth = bucket.depth();
    if stats.buckets_per_depth.len() <= depth {
        stats.buckets_per_depth.resize(depth + 1, 0);
    }
    stats.buckets_per_depth[depth] += 1;
    if bucket.is_list() {
        stats.collision_lists += 1;
        stats.widest_list = stats.widest_list.max(bucket.width());
    }
    for index in 0..bucket.width() {
        loop {
            match bucket.load(index) {
                Slot::Empty => {}
                Slot::Entry(_) => {
                    stats.entries += 1;
                    if bucket.is_list() {
                        stats.list_entries += 1;
                    }
                }
                Slot::Child(child) => {
                    let child = unsafe { BucketGuard::acquire(NonNull::new_unchecked(child)) };
                    if child.is_sealed() {
                        continue;
                    }
                    collect_stats(&child, stats);
                }
            }
            break;
        }
    }
}

/// Find `key` in a collision list. Returns the slot, the word found in
/// it and the entry pointer.
fn find_in_list<K, V, Q>(
    list: &Bucket<K, V>,
    hash: u64,
    key: &Q,
) -> Option<(usize, usize, *const Entry<K, V>)>
where
    K: Borrow<Q>,
    Q: Eq + ?Sized,
{
    (0..list.width()).find_map(|index| {
        let word = list.load_word(index);
        match Slot::<K, V>::decode(word) {
            Slot::Entry(ptr) => {
                let entry = unsafe { &*ptr };
                (entry.hash == hash && entry.key.borrow() == key).then_some((index, word, ptr))
            }
            _ => None,
        }
    })
}

/// Deal with an insertion that found its key at `index`. `None` means
/// the slot changed under us and the caller must look again.
#[allow(clippy::too_many_arguments)]
fn settle<K, V, F>(
    bucket: &Bucket<K, V>,
    index: usize,
    word: usize,
    ptr: *const Entry<K, V>,
    candidate: &mut Candidate<K, V, F>,
    mode: &Mode,
    pin: &Guard,
) -> Option<Outcome<K, V>>
where
    F: FnOnce() -> V,
{
    match mode {
        Mode::KeepExisting => Some(Outcome {
            entry: unsafe { entry::clone_raw(ptr) },
            inserted: false,
            replaced: None,
        }),
        Mode::Replace => {
            let entry = candidate.materialize();
            let new = entry::into_raw(entry.clone());
            match bucket.cas(index, word, entry_word(new)) {
                Ok(()) => {
                    let old = unsafe { entry::from_raw(ptr) };
                    let replaced = old.clone();
                    Garbage::Entry(old).defer(pin);
                    Some(Outcome {
                        entry,
                        inserted: false,
                        replaced: Some(replaced),
                    })
                }
                Err(_) => {
                    drop(unsafe { entry::from_raw(new) });
                    None
                }
            }
        }
    }
}

impl<K, V, S> TrieMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Look up a key, returning a handle to its entry.
    ///
    /// # Examples
    ///
    /// ```
    /// # use primetrie::TrieMap;
    /// let map = TrieMap::new();
    /// map.assign(String::from("k"), 1).unwrap();
    /// assert_eq!(Some(1), map.get("k").map(|v| *v));
    /// assert!(map.get("missing").is_none());
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<Shared<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(&self.hasher, key);
        let mut at = self.descend(hash);
        loop {
            let bucket = at.bucket();
            let Indexing::Radix(divisor) = bucket.indexing() else {
                return find_in_list(bucket, hash, key)
                    .map(|(_, _, ptr)| Shared::new(unsafe { entry::clone_raw(ptr) }));
            };
            match bucket.load((at.residual % divisor) as usize) {
                Slot::Empty => return None,
                Slot::Entry(ptr) => {
                    let entry = unsafe { &*ptr };
                    return (entry.hash == hash && entry.key.borrow() == key)
                        .then(|| Shared::new(unsafe { entry::clone_raw(ptr) }));
                }
                Slot::Child(child) => at.enter(child),
            }
        }
    }

    /// Test whether a key is present.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Insert a key unless it is already present.
    ///
    /// Returns a handle to the entry now in the map, and whether it is
    /// the one this call inserted. `make_value` runs at most once, and
    /// only when the key was missing. When several threads race to
    /// insert the same key, exactly one of them wins and the others get
    /// the winner's entry.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the key falls into a
    /// collision list that is full and already as wide as it may grow.
    pub fn insert_if_absent<F>(&self, key: K, make_value: F) -> Result<(Shared<K, V>, bool), Error>
    where
        F: FnOnce() -> V,
    {
        let hash = hash_key(&self.hasher, &key);
        let outcome = self.upsert(Candidate::lazy(hash, key, make_value), Mode::KeepExisting)?;
        Ok((Shared::new(outcome.entry), outcome.inserted))
    }

    /// Insert a key, replacing any entry it already has.
    ///
    /// Returns the replaced entry. Handles to it stay valid and keep
    /// showing the old value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use primetrie::TrieMap;
    /// let map = TrieMap::new();
    /// assert!(map.assign("k", 1).unwrap().is_none());
    /// let old = map.assign("k", 2).unwrap().unwrap();
    /// assert_eq!(1, *old);
    /// assert_eq!(2, *map.get("k").unwrap());
    /// ```
    pub fn assign(&self, key: K, value: V) -> Result<Option<Shared<K, V>>, Error> {
        let hash = hash_key(&self.hasher, &key);
        let outcome = self.upsert(Candidate::ready(hash, key, value), Mode::Replace)?;
        Ok(outcome.replaced.map(Shared::new))
    }

    /// Remove a key. Returns whether it was present.
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Remove a key, returning a handle to the entry it had.
    pub fn remove<Q>(&self, key: &Q) -> Option<Shared<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = hash_key(&self.hasher, key);
        let mut at = self.descend(hash);
        loop {
            let bucket = at.bucket();
            let (index, word, ptr) = match bucket.indexing() {
                Indexing::Linear => find_in_list(bucket, hash, key)?,
                Indexing::Radix(divisor) => {
                    let index = (at.residual % divisor) as usize;
                    let word = bucket.load_word(index);
                    match Slot::<K, V>::decode(word) {
                        Slot::Empty => return None,
                        Slot::Entry(ptr) => {
                            let entry = unsafe { &*ptr };
                            if entry.hash != hash || entry.key.borrow() != key {
                                return None;
                            }
                            (index, word, ptr)
                        }
                        Slot::Child(child) => {
                            at.enter(child);
                            continue;
                        }
                    }
                }
            };
            if bucket.cas(index, word, EMPTY).is_ok() {
                bucket.occupancy().fetch_sub(1, Ordering::AcqRel);
                at.count().fetch_sub(1, Ordering::AcqRel);
                let old = unsafe { entry::from_raw(ptr) };
                let removed = old.clone();
                Garbage::Entry(old).defer(&at.pin);
                return Some(Shared::new(removed));
            }
        }
    }

    /// Assign every pair from an iterator, stopping at the first error.
    pub fn try_extend<I>(&self, iter: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in iter {
            self.assign(key, value)?;
        }
        Ok(())
    }

    fn upsert<F>(&self, mut candidate: Candidate<K, V, F>, mode: Mode) -> Result<Outcome<K, V>, Error>
    where
        F: FnOnce() -> V,
    {
        let hash = candidate.hash;
        let backoff = Backoff::new();
        'restart: loop {
            let mut at = self.descend(hash);
            loop {
                let bucket = at.bucket();
                let Indexing::Radix(divisor) = bucket.indexing() else {
                    match self.upsert_in_list(&at, &mut candidate, &mode)? {
                        Some(outcome) => return Ok(outcome),
                        None => {
                            drop(at);
                            backoff.snooze();
                            continue 'restart;
                        }
                    }
                };
                let index = (at.residual % divisor) as usize;
                let word = bucket.load_word(index);
                match Slot::<K, V>::decode(word) {
                    Slot::Empty => {
                        let entry = candidate.materialize();
                        let new = entry::into_raw(entry.clone());
                        if bucket.cas(index, EMPTY, entry_word(new)).is_ok() {
                            bucket.occupancy().fetch_add(1, Ordering::AcqRel);
                            at.count().fetch_add(1, Ordering::AcqRel);
                            return Ok(Outcome {
                                entry,
                                inserted: true,
                                replaced: None,
                            });
                        }
                        drop(unsafe { entry::from_raw(new) });
                    }
                    Slot::Entry(ptr) => {
                        let current = unsafe { &*ptr };
                        if current.hash == hash && current.key == *candidate.key() {
                            if let Some(outcome) =
                                settle(bucket, index, word, ptr, &mut candidate, &mode, &at.pin)
                            {
                                return Ok(outcome);
                            }
                        } else {
                            self.promote(bucket, index, word, ptr, &at.pin);
                        }
                    }
                    Slot::Child(child) => at.enter(child),
                }
            }
        }
    }

    /// Push the entry in slot `index` of a trie bucket down into a new
    /// child, so that a different key can share the slot. Losing the race
    /// for the slot is harmless: the caller reloads it either way.
    fn promote(
        &self,
        bucket: &Bucket<K, V>,
        index: usize,
        word: usize,
        ptr: *const Entry<K, V>,
        pin: &Guard,
    ) {
        let child = self.new_child(bucket, index);
        let occupant = unsafe { &*ptr };
        let slot = match child.indexing() {
            Indexing::Radix(divisor) => {
                (self.ladder.residual(occupant.hash, child.depth()) % divisor) as usize
            }
            Indexing::Linear => 0,
        };
        // The child gets its own reference; the slot's old one is
        // retired below once the swap succeeds.
        let moved = unsafe { entry::clone_raw(ptr) };
        child.store(slot, entry_word(entry::into_raw(moved)));
        child.occupancy().store(1, Ordering::Release);
        let depth = child.depth();
        let list = child.is_list();
        let child = Box::into_raw(child);
        match bucket.cas(index, word, child_word(child)) {
            Ok(()) => {
                Garbage::Entry(unsafe { entry::from_raw(ptr) }).defer(pin);
                tracing::trace!(depth, index, list, "promoted colliding entry");
            }
            // Never published: dropping it releases the moved reference.
            Err(_) => drop(unsafe { Box::from_raw(child) }),
        }
    }

    /// The collision list part of [`upsert`](Self::upsert). `Ok(None)`
    /// means another thread is busy adding to the list and the caller
    /// must let go of everything and start over.
    fn upsert_in_list<F>(
        &self,
        at: &Descent<K, V>,
        candidate: &mut Candidate<K, V, F>,
        mode: &Mode,
    ) -> Result<Option<Outcome<K, V>>, Error>
    where
        F: FnOnce() -> V,
    {
        let hash = candidate.hash;
        let list = &at.here;
        let Some(parent) = at.upper.as_deref() else {
            return Err(Error::InvariantViolation("collision list held without its parent"));
        };
        while let Some((index, word, ptr)) = find_in_list(list, hash, candidate.key()) {
            if let Some(outcome) = settle(list, index, word, ptr, candidate, mode, &at.pin) {
                return Ok(Some(outcome));
            }
        }

        // A new key. Holding the list exclusively is what keeps two
        // threads from adding the same key to two different free slots.
        let Some(exclusive) = list.try_upgrade() else {
            return Ok(None);
        };
        if let Some((index, word, ptr)) = find_in_list(&exclusive, hash, candidate.key()) {
            return Ok(settle(&exclusive, index, word, ptr, candidate, mode, &at.pin));
        }
        let free = (0..exclusive.width()).find(|&index| exclusive.load_word(index) == EMPTY);
        if let Some(index) = free {
            let entry = candidate.materialize();
            exclusive.store(index, entry_word(entry::into_raw(entry.clone())));
            exclusive.occupancy().fetch_add(1, Ordering::AcqRel);
            at.count().fetch_add(1, Ordering::AcqRel);
            return Ok(Some(Outcome {
                entry,
                inserted: true,
                replaced: None,
            }));
        }

        // Full: move everything into a list twice the width.
        let old_width = exclusive.width();
        let new_width = old_width * 2;
        if new_width > self.ladder.max_list_width() {
            tracing::warn!(
                width = old_width,
                limit = self.ladder.max_list_width(),
                "collision list is full"
            );
            return Err(Error::CapacityExceeded);
        }
        let parent_index = exclusive.parent_index();
        if !ptr::eq(parent, exclusive.parent()) {
            return Err(Error::InvariantViolation("collision list held without its parent"));
        }
        let grown = Bucket::new(
            new_width,
            Indexing::Linear,
            exclusive.depth(),
            parent,
            parent_index,
        );
        for index in 0..old_width {
            grown.store(index, exclusive.load_word(index));
        }
        let entry = candidate.materialize();
        grown.store(old_width, entry_word(entry::into_raw(entry.clone())));
        grown.occupancy().store(old_width + 1, Ordering::Release);
        let grown = Box::into_raw(grown);

        if parent
            .cas(parent_index, child_word(list.as_ptr()), child_word(grown))
            .is_err()
        {
            // Hand the moved references back to the old list before
            // dropping the copy.
            let grown = unsafe { Box::from_raw(grown) };
            for index in 0..old_width {
                grown.store(index, EMPTY);
            }
            drop(grown);
            return Err(Error::InvariantViolation("collision list replaced while held"));
        }
        exclusive.forget_slots();
        exclusive.seal();
        // Unreachable from now on; freed once earlier pins are gone and
        // the last holder of the old list lets go.
        Garbage::Bucket(unsafe { NonNull::new_unchecked(list.as_ptr()) }).defer(&at.pin);
        at.count().fetch_add(1, Ordering::AcqRel);
        tracing::debug!(old_width, new_width, "grew collision list");
        Ok(Some(Outcome {
            entry,
            inserted: true,
            replaced: None,
        }))
    }

    /// Walk the whole map checking its structural invariants.
    ///
    /// Only meaningful while no other thread is modifying the map.
    #[cfg(any(test, feature = "debug"))]
    pub fn check_invariants(&self) -> Result<(), Error> {
        let pin = self.pin();
        let root = self.hold_root(&pin);
        if root.width() != self.ladder.width(0) || root.depth() != 0 {
            return Err(Error::InvariantViolation("root has the wrong shape"));
        }
        let mut entries = Vec::new();
        self.check_bucket(&root, &mut entries)?;
        if entries.len() != root.elements().load(Ordering::Acquire) {
            return Err(Error::InvariantViolation("element count disagrees with the trie"));
        }
        let mut keys = std::collections::HashSet::with_capacity(entries.len());
        if !entries.iter().all(|entry| keys.insert(&entry.key)) {
            return Err(Error::InvariantViolation("key present twice"));
        }
        Ok(())
    }

    #[cfg(any(test, feature = "debug"))]
    fn check_bucket(
        &self,
        bucket: &Bucket<K, V>,
        entries: &mut Vec<Arc<Entry<K, V>>>,
    ) -> Result<(), Error> {
        let depth = bucket.depth();
        match bucket.indexing() {
            Indexing::Radix(divisor) => {
                if depth >= self.ladder.max_depth()
                    || bucket.width() != self.ladder.width(depth)
                    || divisor != bucket.width() as u64
                {
                    return Err(Error::InvariantViolation("trie bucket has the wrong shape"));
                }
            }
            Indexing::Linear => {
                if depth != self.ladder.max_depth()
                    || bucket.width() > self.ladder.max_list_width()
                {
                    return Err(Error::InvariantViolation("collision list has the wrong shape"));
                }
            }
        }
        let mut occupied = 0;
        for index in 0..bucket.width() {
            match bucket.load(index) {
                Slot::Empty => {}
                Slot::Entry(ptr) => {
                    occupied += 1;
                    let entry = unsafe { entry::clone_raw(ptr) };
                    if let Indexing::Radix(divisor) = bucket.indexing() {
                        let home = self.ladder.residual(entry.hash, depth) % divisor;
                        if home != index as u64 {
                            return Err(Error::InvariantViolation("entry outside its home slot"));
                        }
                    }
                    entries.push(entry);
                }
                Slot::Child(child) => {
                    occupied += 1;
                    if bucket.is_list() {
                        return Err(Error::InvariantViolation("collision list has a child"));
                    }
                    let child = unsafe { BucketGuard::acquire(NonNull::new_unchecked(child)) };
                    if child.is_sealed()
                        || !ptr::eq(child.parent(), bucket)
                        || child.parent_index() != index
                        || child.depth() != depth + 1
                    {
                        return Err(Error::InvariantViolation("child is not linked to its parent"));
                    }
                    self.check_bucket(&child, entries)?;
                }
            }
        }
        if occupied != bucket.occupancy().load(Ordering::Acquire) {
            return Err(Error::InvariantViolation("occupancy disagrees with the slots"));
        }
        Ok(())
    }
}

impl<K, V, S> Default for TrieMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> Drop for TrieMap<K, V, S> {
    fn drop(&mut self) {
        // Cursors borrow the map, so nothing holds the root any more.
        // Earlier roots and lists run with the collector right after.
        let root = *self.root.get_mut();
        unsafe { Bucket::retire(NonNull::new_unchecked(root)) }
    }
}

impl<K, V, S> Debug for TrieMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let entries: Vec<_> = self.iter().collect();
        f.debug_map()
            .entries(entries.iter().map(Shared::pair))
            .finish()
    }
}

// Tests
