// Copyright (c) 2016 Amanieu d'Antras
// SPDX-License-Identifier: MIT

// Modifications Copyright (c) KTH Royal Institute of Technology
// SPDX-License-Identifier: MIT

//! Hashing. Both `HashMap` and `HashSet` default to `fxhash`, as most keys
//! in practice are small fixed-size values where fxhash's multiply-xor
//! mixing outperforms a cryptographic or DoS-resistant hasher.

use std::hash::{BuildHasher, Hash, Hasher};

/// Default `BuildHasher` for both [`crate::HashMap`] and [`crate::HashSet`].
pub type DefaultHashBuilder = fxhash::FxBuildHasher;

#[inline]
pub(crate) fn make_hash<K: Hash + ?Sized>(hash_builder: &impl BuildHasher, val: &K) -> u64 {
    let mut state = hash_builder.build_hasher();
    val.hash(&mut state);
    state.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_hash() {
        let b = DefaultHashBuilder::default();
        assert_eq!(make_hash(&b, "hello"), make_hash(&b, "hello"));
    }

    #[test]
    fn different_keys_usually_differ() {
        let b = DefaultHashBuilder::default();
        assert_ne!(make_hash(&b, "hello"), make_hash(&b, "world"));
    }
}
