#![no_main]

use std::collections::HashMap as NatMap;
use std::fmt::Debug;
use std::hash::{BuildHasherDefault, Hasher};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use primetrie::{Error, TrieMap};

// Keeps only a handful of hash bits so that promotion and collision
// list growth happen constantly.
#[derive(Default)]
struct NarrowHasher(u64);

impl Hasher for NarrowHasher {
    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(u64::from(*byte));
        }
    }

    fn finish(&self) -> u64 {
        self.0 & 0x1f
    }
}

#[derive(Arbitrary, Debug)]
enum Action<K, V> {
    Assign(K, V),
    InsertIfAbsent(K, V),
    Erase(K),
    Clear,
}

fuzz_target!(|actions: Vec<Action<u16, u32>>| {
    let map: TrieMap<u16, u32, BuildHasherDefault<NarrowHasher>> = TrieMap::builder()
        .expected_capacity(2)
        .max_depth(2)
        .max_list_width(64)
        .hasher(Default::default())
        .build()
        .unwrap();
    let mut nat = NatMap::new();
    for action in actions {
        match action {
            Action::Assign(key, value) => match map.assign(key, value) {
                Ok(old) => assert_eq!(nat.insert(key, value), old.map(|v| *v)),
                Err(Error::CapacityExceeded) => assert!(!nat.contains_key(&key)),
                Err(other) => panic!("unexpected error {:?}", other),
            },
            Action::InsertIfAbsent(key, value) => match map.insert_if_absent(key, || value) {
                Ok((entry, inserted)) => {
                    assert_eq!(!nat.contains_key(&key), inserted);
                    assert_eq!(*nat.entry(key).or_insert(value), *entry);
                }
                Err(Error::CapacityExceeded) => assert!(!nat.contains_key(&key)),
                Err(other) => panic!("unexpected error {:?}", other),
            },
            Action::Erase(key) => assert_eq!(nat.remove(&key).is_some(), map.erase(&key)),
            Action::Clear => {
                map.clear();
                nat.clear();
            }
        }
        assert_eq!(nat.len(), map.len());
    }
    map.check_invariants().unwrap();
    assert_eq!(nat.len(), map.iter().count());
    for entry in map.iter() {
        assert_eq!(nat.get(entry.key()), Some(entry.value()));
    }
});
