// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;

/// Errors reported by [`TrieMap`][crate::TrieMap] and its cursors.
///
/// Contention between threads is never reported as an error: it is
/// resolved internally by retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The prime ladder cannot supply enough levels for the requested
    /// configuration, or a collision list is already at its width bound.
    CapacityExceeded,
    /// A cursor was advanced past its end, or moved back before its start.
    PastEndIteration,
    /// A map was configured with a maximum depth of zero.
    InvalidDepth,
    /// A structural invariant check failed.
    InvariantViolation(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded => write!(f, "trie capacity exceeded"),
            Error::PastEndIteration => write!(f, "cursor moved past the end of the map"),
            Error::InvalidDepth => write!(f, "maximum trie depth must be at least 1"),
            Error::InvariantViolation(what) => write!(f, "invariant violated: {}", what),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_is_lowercase_and_specific() {
        assert_eq!("trie capacity exceeded", Error::CapacityExceeded.to_string());
        assert_eq!(
            "invariant violated: occupancy",
            Error::InvariantViolation("occupancy").to_string()
        );
    }
}
