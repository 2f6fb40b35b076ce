#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use primetrie::{Error, TrieMap};

#[derive(Arbitrary, Debug)]
enum Step {
    Next,
    Prev,
}

#[derive(Arbitrary, Debug)]
struct Input {
    keys: Vec<u8>,
    steps: Vec<Step>,
}

fuzz_target!(|input: Input| {
    let map = TrieMap::with_config(2, 2).unwrap();
    for key in &input.keys {
        map.assign(*key, ()).unwrap();
    }
    let order: Vec<u8> = map.iter().map(|entry| *entry.key()).collect();
    assert_eq!(
        input.keys.iter().collect::<HashSet<_>>().len(),
        order.len()
    );

    // Position -1 is before the first entry, order.len() is past the end.
    let mut position: isize = -1;
    let mut cursor = map.cursor();
    for step in input.steps {
        let end = order.len() as isize;
        match step {
            Step::Next => match cursor.move_next() {
                Ok(found) => {
                    position += 1;
                    assert_eq!(position < end, found);
                }
                Err(Error::PastEndIteration) => assert_eq!(end, position),
                Err(other) => panic!("unexpected error {:?}", other),
            },
            Step::Prev => match cursor.move_prev() {
                Ok(found) => {
                    position -= 1;
                    assert_eq!(position >= 0, found);
                }
                Err(Error::PastEndIteration) => assert_eq!(-1, position),
                Err(other) => panic!("unexpected error {:?}", other),
            },
        }
        match cursor.get() {
            Some(entry) => assert_eq!(order[position as usize], *entry.key()),
            None => assert!(position < 0 || position >= order.len() as isize),
        }
    }
});
