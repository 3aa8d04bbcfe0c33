// Copyright (c) 2016 Amanieu d'Antras
// SPDX-License-Identifier: MIT

// Modifications Copyright (c) KTH Royal Institute of Technology
// SPDX-License-Identifier: MIT

//! A tombstone-free hash set, built directly on the same raw table as
//! [`crate::HashMap`] but over a key-only bucket payload.

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::iter::FromIterator;

use crate::error::Result;
use crate::hash::{make_hash, DefaultHashBuilder};
use crate::raw::{Entry as RawEntry, RawIntoIter, RawIter, RawTable};

const DEFAULT_MAX_LOAD_FACTOR: f32 = 0.875;

pub(crate) struct SetEntry<K> {
    key: K,
    hash: u64,
}

impl<K> RawEntry for SetEntry<K> {
    #[inline]
    fn stored_hash(&self) -> u64 {
        self.hash
    }
}

/// A hash set with no value-returning operations: membership is all this
/// type tracks, so there is nothing to return on insertion or removal
/// beyond whether the key was already present.
pub struct HashSet<K, S = DefaultHashBuilder> {
    hash_builder: S,
    table: RawTable<SetEntry<K>>,
}

impl<K> HashSet<K, DefaultHashBuilder> {
    #[inline]
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }
}

impl<K> Default for HashSet<K, DefaultHashBuilder> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> HashSet<K, S> {
    #[inline]
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            hash_builder,
            table: RawTable::new(DEFAULT_MAX_LOAD_FACTOR),
        }
    }

    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Result<Self> {
        Ok(Self {
            hash_builder,
            table: RawTable::with_capacity(capacity, DEFAULT_MAX_LOAD_FACTOR)?,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.table.bucket_count()
    }

    #[inline]
    pub fn set_max_load_factor(&mut self, factor: f32) {
        self.table.set_max_load_factor(factor);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            inner: self.table.iter(),
            marker: std::marker::PhantomData,
        }
    }
}

impl<K, S> HashSet<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn hasher_fn(&self) -> impl Fn(&SetEntry<K>) -> u64 + '_ {
        move |entry: &SetEntry<K>| make_hash(&self.hash_builder, &entry.key)
    }

    /// Inserts `key`, returning `true` if it was newly added.
    pub fn insert(&mut self, key: K) -> Result<bool> {
        let hash = make_hash(&self.hash_builder, &key);
        if unsafe { self.table.find(hash, |e| e.key == key) }.is_some() {
            return Ok(false);
        }
        let hasher = self.hasher_fn();
        self.table.insert_unique(hash, SetEntry { key, hash }, &hasher)?;
        Ok(true)
    }

    pub fn contains<Q: ?Sized>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash(&self.hash_builder, key);
        unsafe { self.table.find(hash, |e| key.eq(e.key.borrow())) }.is_some()
    }

    /// Removes `key`, returning `true` if it was present.
    pub fn remove<Q: ?Sized>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq,
    {
        let hash = make_hash(&self.hash_builder, key);
        unsafe { self.table.remove_entry(hash, |e| key.eq(e.key.borrow())) }.is_some()
    }

    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let hasher = self.hasher_fn();
        self.table.reserve(additional, &hasher)
    }

    pub fn shrink_to_fit(&mut self) -> Result<()> {
        let hasher = self.hasher_fn();
        self.table.shrink_to_fit(&hasher)
    }
}

impl<K, S> Clone for HashSet<K, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher + Clone,
{
    fn clone(&self) -> Self {
        let hasher = self.hasher_fn();
        let table = self
            .table
            .try_clone(&hasher, |e| SetEntry {
                key: e.key.clone(),
                hash: e.hash,
            })
            .expect("cloning an existing allocation should not fail");
        Self {
            hash_builder: self.hash_builder.clone(),
            table,
        }
    }
}

impl<K, S> fmt::Debug for HashSet<K, S>
where
    K: fmt::Debug + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K, S> Extend<K> for HashSet<K, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<T: IntoIterator<Item = K>>(&mut self, iter: T) {
        for k in iter {
            let _ = self.insert(k);
        }
    }
}

impl<K> FromIterator<K> for HashSet<K, DefaultHashBuilder>
where
    K: Hash + Eq,
{
    fn from_iter<T: IntoIterator<Item = K>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

pub struct Iter<'a, K> {
    inner: RawIter<SetEntry<K>>,
    marker: std::marker::PhantomData<&'a K>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|b| unsafe { &b.as_ref().key })
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
impl<'a, K> ExactSizeIterator for Iter<'a, K> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}
impl<'a, K> std::iter::FusedIterator for Iter<'a, K> {}

pub struct IntoIter<K> {
    inner: RawIntoIter<SetEntry<K>>,
}

impl<K> Iterator for IntoIter<K> {
    type Item = K;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|e| e.key)
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
impl<K> ExactSizeIterator for IntoIter<K> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}
impl<K> std::iter::FusedIterator for IntoIter<K> {}

impl<K, S> IntoIterator for HashSet<K, S> {
    type Item = K;
    type IntoIter = IntoIter<K>;
    fn into_iter(self) -> IntoIter<K> {
        IntoIter {
            inner: RawIntoIter::new(self.table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_remove() {
        let mut s: HashSet<i32> = HashSet::new();
        assert!(s.insert(1).unwrap());
        assert!(!s.insert(1).unwrap());
        assert!(s.contains(&1));
        assert!(s.remove(&1));
        assert!(!s.contains(&1));
    }

    #[test]
    fn iter_visits_every_member() {
        let mut s: HashSet<i32> = HashSet::new();
        for i in 0..40 {
            s.insert(i).unwrap();
        }
        let mut seen: Vec<_> = s.iter().copied().collect();
        seen.sort();
        assert_eq!(seen, (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn has_no_value_returning_api() {
        // HashSet tracks membership only: `get`/`insert` returning an
        // overwritten value would have no meaning here.
        let mut s: HashSet<&str> = HashSet::new();
        assert!(s.insert("a").unwrap());
        assert_eq!(s.len(), 1);
    }
}
