// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::hash::Hasher;

/// A hasher that sends every key to the same place.
#[derive(Default)]
pub(crate) struct ZeroHasher;

impl Hasher for ZeroHasher {
    fn write(&mut self, _bytes: &[u8]) {}

    fn finish(&self) -> u64 {
        0
    }
}

/// A hasher with only 64 possible outputs, so that keys pile up in
/// collision lists while still spreading over several trie paths.
#[derive(Default)]
pub(crate) struct LolHasher {
    state: u64,
}

impl Hasher for LolHasher {
    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state = self.state.wrapping_mul(31).wrapping_add(u64::from(*byte));
        }
    }

    fn finish(&self) -> u64 {
        self.state & 0x3f
    }
}
