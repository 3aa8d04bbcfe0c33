// Copyright (c) 2016 Amanieu d'Antras
// SPDX-License-Identifier: MIT

// Modifications Copyright (c) KTH Royal Institute of Technology
// SPDX-License-Identifier: MIT

//! The raw table: layout, allocation, lookup, insertion, eviction, deletion
//! and rehash. `RawTable<T>` knows nothing about keys or values beyond what
//! `Entry` exposes (the cached hash); `crate::map`/`crate::set` supply the
//! key equality closures and the per-bucket hashing callback.

use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::NonNull;

use super::bucket::Bucket;
use super::iter::RawIter;
use super::meta;
use super::Entry;
use crate::error::{Error, Result};

/// Smallest bucket count a non-empty table allocates. Also the canonical
/// group width's common multiple (16 % 4 == 0, 16 % 8 == 0), so the group
/// scan in `RawIter` never has to special-case small tables.
pub(crate) const MIN_BUCKETS: usize = 16;

/// Trailing metadata words past the logical end of the array, guaranteeing
/// at least one non-zero "stop" word for a branchless group read at the
/// tail. `RawIter` still bounds-checks explicitly (see its module docs), so
/// these slots are a safety margin rather than load-bearing in this
/// implementation, but are allocated and initialized exactly as specified.
const SENTINEL_WORDS: usize = 4;

static EMPTY_META: [u16; SENTINEL_WORDS] = [0; SENTINEL_WORDS];

/// Internal-only control-flow signal produced by the insertion/eviction
/// engines when no empty slot is reachable within the displacement range.
/// Never implements `std::error::Error` and never crosses the public API;
/// the rehash loop is the only thing that observes it.
pub(crate) enum InsertError {
    GrowNeeded,
}

fn calculate_layout<T>(buckets: usize) -> Option<(Layout, usize)> {
    let buckets_layout = Layout::array::<T>(buckets).ok()?;
    let meta_layout = Layout::array::<u16>(buckets + SENTINEL_WORDS).ok()?;
    buckets_layout.extend(meta_layout).ok()
}

unsafe fn dealloc_block<T>(buckets_ptr: NonNull<T>, buckets: usize) {
    if let Some((layout, _)) = calculate_layout::<T>(buckets) {
        alloc::dealloc(buckets_ptr.as_ptr() as *mut u8, layout);
    }
}

/// Smallest power-of-two bucket count, at least `MIN_BUCKETS`, whose
/// capacity (under `max_load_factor`) is at least `need`.
fn bucket_count_for(need: usize, max_load_factor: f32) -> usize {
    let mut buckets = MIN_BUCKETS;
    while ((buckets as f32) * max_load_factor).floor() < need as f32 {
        buckets *= 2;
    }
    buckets
}

pub(crate) struct RawTable<T> {
    /// `bucket_count - 1` once allocated; `0` for the unallocated empty table.
    bucket_mask: usize,
    buckets: NonNull<T>,
    meta: NonNull<u16>,
    len: usize,
    max_load_factor: f32,
    marker: PhantomData<T>,
}

unsafe impl<T: Send> Send for RawTable<T> {}

impl<T: Entry> RawTable<T> {
    pub(crate) fn new(max_load_factor: f32) -> Self {
        Self {
            bucket_mask: 0,
            buckets: NonNull::dangling(),
            meta: unsafe { NonNull::new_unchecked(EMPTY_META.as_ptr() as *mut u16) },
            len: 0,
            max_load_factor,
            marker: PhantomData,
        }
    }

    pub(crate) fn with_capacity(capacity: usize, max_load_factor: f32) -> Result<Self> {
        let mut table = Self::new(max_load_factor);
        if capacity > 0 {
            let buckets = bucket_count_for(capacity, max_load_factor);
            unsafe { table.alloc_buckets(buckets)? };
        }
        Ok(table)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        if self.bucket_mask == 0 {
            0
        } else {
            self.bucket_mask + 1
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        if self.bucket_mask == 0 {
            0
        } else {
            ((self.bucket_count() as f32) * self.max_load_factor).floor() as usize
        }
    }

    #[inline]
    pub(crate) fn max_load_factor(&self) -> f32 {
        self.max_load_factor
    }

    pub(crate) fn set_max_load_factor(&mut self, f: f32) {
        self.max_load_factor = f.clamp(0.1, 0.99);
    }

    #[inline]
    fn home_of(&self, hash: u64) -> usize {
        (hash as usize) & self.bucket_mask
    }

    /// Forward distance, modulo `bucket_count`, from `from` to `to`.
    #[inline]
    fn forward_offset(&self, from: usize, to: usize) -> usize {
        to.wrapping_sub(from) & self.bucket_mask
    }

    #[inline]
    unsafe fn bucket(&self, index: usize) -> Bucket<T> {
        Bucket::from_base_index(self.buckets, index)
    }

    #[inline]
    unsafe fn meta(&self, index: usize) -> u16 {
        *self.meta.as_ptr().add(index)
    }

    #[inline]
    unsafe fn set_meta(&self, index: usize, value: u16) {
        *self.meta.as_ptr().add(index) = value;
    }

    unsafe fn alloc_buckets(&mut self, buckets: usize) -> Result<()> {
        debug_assert!(buckets.is_power_of_two() && buckets >= MIN_BUCKETS);
        let (layout, meta_offset) =
            calculate_layout::<T>(buckets).ok_or_else(|| Error::AllocationFailed(Layout::new::<T>()))?;
        let ptr = alloc::alloc(layout);
        if ptr.is_null() {
            return Err(Error::AllocationFailed(layout));
        }
        let meta_ptr = ptr.add(meta_offset) as *mut u16;
        std::ptr::write_bytes(meta_ptr, 0, buckets + SENTINEL_WORDS);
        // Canonical non-zero sentinel: guarantees an always-valid, always-terminating
        // group read for a branchless tail scan, matching the design's EMPTY=0 packing.
        *meta_ptr.add(buckets) = 0x0001;

        self.buckets = NonNull::new_unchecked(ptr as *mut T);
        self.meta = NonNull::new_unchecked(meta_ptr);
        self.bucket_mask = buckets - 1;
        Ok(())
    }

    /// Lookup (§4.2): hash to home, bail if no chain starts there, else walk
    /// the chain with fragment pre-filtering.
    pub(crate) unsafe fn find(&self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<Bucket<T>> {
        if self.bucket_mask == 0 {
            return None;
        }
        let home = self.home_of(hash);
        let mut m = self.meta(home);
        if !meta::has_home_flag(m) {
            return None;
        }
        let frag = meta::fragment_of_hash(hash);
        let mut b = home;
        loop {
            if meta::fragment(m) == frag {
                let bucket = self.bucket(b);
                if bucket.as_ref().stored_hash() == hash && eq(bucket.as_ref()) {
                    return Some(bucket);
                }
            }
            if meta::is_chain_end(m) {
                return None;
            }
            b = (home + meta::displacement(m) as usize) & self.bucket_mask;
            m = self.meta(b);
        }
    }

    /// Linear probe for the first empty slot at displacement `d >= 1` from
    /// `home`, per Phase B / eviction (§4.3 / §4.5).
    unsafe fn probe_empty(&self, home: usize) -> core::result::Result<usize, InsertError> {
        let mut d: u16 = 1;
        loop {
            if d > meta::MAX_DISPLACEMENT {
                return Err(InsertError::GrowNeeded);
            }
            let slot = (home + d as usize) & self.bucket_mask;
            if meta::is_empty(self.meta(slot)) {
                return Ok(slot);
            }
            d += 1;
        }
    }

    /// Splices a new link at `target` (displacement `d` from `home`) into
    /// `home`'s chain, keeping the chain displacement-sorted (§4.3 Phase B).
    unsafe fn splice_into_chain(&self, home: usize, frag: u16, target: usize, d: u16) {
        let mut prev = home;
        let mut prev_meta = self.meta(prev);
        while !meta::is_chain_end(prev_meta) && meta::displacement(prev_meta) <= d {
            prev = (home + meta::displacement(prev_meta) as usize) & self.bucket_mask;
            prev_meta = self.meta(prev);
        }
        let inherited_next = meta::displacement(prev_meta);
        self.set_meta(target, meta::link_word(frag, inherited_next));
        self.set_meta(prev, meta::with_displacement(prev_meta, d));
    }

    /// Dislodges the non-home occupant of `home` into its own chain so the
    /// rightful chain head can be installed there (§4.5).
    unsafe fn evict(&mut self, home: usize, hasher: &dyn Fn(&T) -> u64) -> core::result::Result<(), InsertError> {
        let home_meta = self.meta(home);
        let occupant_hash = hasher(self.bucket(home).as_ref());
        let o_home = self.home_of(occupant_hash);
        let occupant_frag = meta::fragment(home_meta);

        let mut p = o_home;
        let mut p_meta = self.meta(p);
        while (p + meta::displacement(p_meta) as usize) & self.bucket_mask != home {
            p = (p + meta::displacement(p_meta) as usize) & self.bucket_mask;
            p_meta = self.meta(p);
        }
        self.set_meta(p, meta::with_displacement(p_meta, meta::displacement(home_meta)));

        let e = self.probe_empty(o_home)?;
        let d = self.forward_offset(o_home, e) as u16;
        self.splice_into_chain(o_home, occupant_frag, e, d);

        let payload = self.bucket(home).read();
        self.bucket(e).write(payload);
        Ok(())
    }

    /// Places a key known (by the caller) not to already exist, without
    /// writing its payload. Returns the bucket index to write into.
    fn try_insert_slot(&mut self, hash: u64, hasher: &dyn Fn(&T) -> u64) -> core::result::Result<usize, InsertError> {
        if self.len + 1 > self.capacity() {
            return Err(InsertError::GrowNeeded);
        }
        let home = self.home_of(hash);
        let frag = meta::fragment_of_hash(hash);
        unsafe {
            let home_meta = self.meta(home);
            if !meta::has_home_flag(home_meta) {
                // Phase A: chain head is free (possibly occupied by an interloper).
                if !meta::is_empty(home_meta) {
                    self.evict(home, hasher)?;
                }
                self.set_meta(home, meta::head_word(frag));
                return Ok(home);
            }

            // Phase B: chain exists; find an empty slot and splice it in.
            let empty = self.probe_empty(home)?;
            let d = self.forward_offset(home, empty) as u16;
            self.splice_into_chain(home, frag, empty, d);
            Ok(empty)
        }
    }

    /// Inserts `value`, which the caller has already established has no
    /// duplicate key in the table, growing as many times as needed.
    pub(crate) fn insert_unique(&mut self, hash: u64, value: T, hasher: &dyn Fn(&T) -> u64) -> Result<Bucket<T>> {
        loop {
            match self.try_insert_slot(hash, hasher) {
                Ok(index) => {
                    let bucket = unsafe { self.bucket(index) };
                    unsafe { bucket.write(value) };
                    self.len += 1;
                    return Ok(bucket);
                }
                Err(InsertError::GrowNeeded) => self.grow(hasher)?,
            }
        }
    }

    /// Deletion (§4.4): tombstone-free three-case unlink.
    pub(crate) unsafe fn remove_entry(&mut self, hash: u64, mut eq: impl FnMut(&T) -> bool) -> Option<T> {
        if self.bucket_mask == 0 {
            return None;
        }
        let home = self.home_of(hash);
        let home_meta = self.meta(home);
        if !meta::has_home_flag(home_meta) {
            return None;
        }
        let frag = meta::fragment_of_hash(hash);

        let mut b = home;
        let mut m = home_meta;
        loop {
            if meta::fragment(m) == frag {
                let bucket = self.bucket(b);
                if bucket.as_ref().stored_hash() == hash && eq(bucket.as_ref()) {
                    break;
                }
            }
            if meta::is_chain_end(m) {
                return None;
            }
            b = (home + meta::displacement(m) as usize) & self.bucket_mask;
            m = self.meta(b);
        }

        self.len -= 1;
        let b_meta = m;

        // Case A: sole member of its chain.
        if meta::has_home_flag(b_meta) && meta::is_chain_end(b_meta) {
            let removed = self.bucket(b).read();
            self.set_meta(b, meta::EMPTY);
            return Some(removed);
        }

        let chain_home = if meta::has_home_flag(b_meta) { b } else { home };

        // Case B: tail of a multi-member chain.
        if meta::is_chain_end(b_meta) {
            let mut p = chain_home;
            let mut p_meta = self.meta(p);
            while (p + meta::displacement(p_meta) as usize) & self.bucket_mask != b {
                p = (p + meta::displacement(p_meta) as usize) & self.bucket_mask;
                p_meta = self.meta(p);
            }
            self.set_meta(p, meta::with_displacement(p_meta, meta::END_OF_CHAIN));
            let removed = self.bucket(b).read();
            self.set_meta(b, meta::EMPTY);
            return Some(removed);
        }

        // Case C: interior member. Swap the tail's payload into b, then erase the tail.
        let mut last = b;
        let mut last_meta = b_meta;
        while !meta::is_chain_end(last_meta) {
            last = (chain_home + meta::displacement(last_meta) as usize) & self.bucket_mask;
            last_meta = self.meta(last);
        }
        let mut p = chain_home;
        let mut p_meta = self.meta(p);
        while (p + meta::displacement(p_meta) as usize) & self.bucket_mask != last {
            p = (p + meta::displacement(p_meta) as usize) & self.bucket_mask;
            p_meta = self.meta(p);
        }

        let removed = self.bucket(b).read();
        let last_payload = self.bucket(last).read();
        self.bucket(b).write(last_payload);

        if p == b {
            // `last` directly followed `b`: both pending updates land on the
            // same word, so fold them into a single write.
            let combined =
                meta::with_fragment(meta::with_displacement(b_meta, meta::END_OF_CHAIN), meta::fragment(last_meta));
            self.set_meta(b, combined);
        } else {
            self.set_meta(b, meta::with_fragment(b_meta, meta::fragment(last_meta)));
            self.set_meta(p, meta::with_displacement(p_meta, meta::END_OF_CHAIN));
        }
        self.set_meta(last, meta::EMPTY);
        Some(removed)
    }

    pub(crate) fn clear(&mut self) {
        if self.bucket_mask == 0 {
            return;
        }
        unsafe {
            for idx in 0..=self.bucket_mask {
                if !meta::is_empty(self.meta(idx)) {
                    self.bucket(idx).drop();
                    self.set_meta(idx, meta::EMPTY);
                }
            }
        }
        self.len = 0;
    }

    pub(crate) fn iter(&self) -> RawIter<T> {
        if self.bucket_mask == 0 {
            return RawIter::empty();
        }
        unsafe { RawIter::new(self.meta.as_ptr(), self.buckets, self.bucket_count(), self.len) }
    }

    /// Builds a freshly-allocated table with the same entries rehashed over
    /// `target_buckets` (doubling further on internal displacement
    /// overflow), without mutating `self`. The caller decides how to
    /// dispose of `self`'s old allocation once this returns successfully.
    fn rehash_to(&self, mut target_buckets: usize, hasher: &dyn Fn(&T) -> u64) -> Result<Self> {
        loop {
            let mut fresh = Self::new(self.max_load_factor);
            unsafe { fresh.alloc_buckets(target_buckets)? };
            let mut overflowed = false;

            if self.bucket_mask != 0 {
                unsafe {
                    for idx in 0..=self.bucket_mask {
                        let m = self.meta(idx);
                        if meta::is_empty(m) {
                            continue;
                        }
                        let item_ref = self.bucket(idx).as_ref();
                        let h = hasher(item_ref);
                        match fresh.try_insert_slot(h, hasher) {
                            Ok(slot) => {
                                let copy = self.bucket(idx).read();
                                fresh.bucket(slot).write(copy);
                                fresh.len += 1;
                            }
                            Err(InsertError::GrowNeeded) => {
                                overflowed = true;
                                break;
                            }
                        }
                    }
                }
            }

            if overflowed {
                log::debug!(
                    "rehash: displacement overflow at {} buckets, retrying at {}",
                    target_buckets,
                    target_buckets * 2
                );
                drop(fresh);
                target_buckets *= 2;
                continue;
            }
            return Ok(fresh);
        }
    }

    fn install(&mut self, fresh: Self) {
        let old_buckets = self.buckets;
        let old_bucket_count = self.bucket_count();
        let was_allocated = self.bucket_mask != 0;
        // `fresh` owns independently-copied payloads for every live key; `self`'s
        // original bytes were only ever read non-destructively, so freeing its
        // raw block here (without dropping T) does not double-free anything.
        *self = fresh;
        if was_allocated {
            unsafe { dealloc_block::<T>(old_buckets, old_bucket_count) };
        }
    }

    /// Rehash engine (§4.6): doubles bucket count and reinstalls.
    fn grow(&mut self, hasher: &dyn Fn(&T) -> u64) -> Result<()> {
        let target = if self.bucket_mask == 0 {
            MIN_BUCKETS
        } else {
            self.bucket_count() * 2
        };
        log::debug!("growing from {} to {} buckets", self.bucket_count(), target);
        let fresh = self.rehash_to(target, hasher)?;
        self.install(fresh);
        Ok(())
    }

    pub(crate) fn reserve(&mut self, additional: usize, hasher: &dyn Fn(&T) -> u64) -> Result<()> {
        let need = self.len + additional;
        if need <= self.capacity() {
            return Ok(());
        }
        let target = bucket_count_for(need, self.max_load_factor).max(self.bucket_count());
        let fresh = self.rehash_to(target, hasher)?;
        self.install(fresh);
        Ok(())
    }

    pub(crate) fn shrink_to_fit(&mut self, hasher: &dyn Fn(&T) -> u64) -> Result<()> {
        let target = bucket_count_for(self.len, self.max_load_factor);
        if target >= self.bucket_count() {
            return Ok(());
        }
        log::debug!("shrinking from {} to {} buckets", self.bucket_count(), target);
        let fresh = self.rehash_to(target, hasher)?;
        self.install(fresh);
        Ok(())
    }

    /// Deep copy, used by the public `Clone` impl. `clone_entry` copies a
    /// single live payload (e.g. cloning `K`/`V` for map entries).
    pub(crate) fn try_clone(&self, hasher: &dyn Fn(&T) -> u64, mut clone_entry: impl FnMut(&T) -> T) -> Result<Self> {
        let mut out = Self::new(self.max_load_factor);
        if self.bucket_mask == 0 {
            return Ok(out);
        }
        unsafe {
            out.alloc_buckets(self.bucket_count())?;
            for idx in 0..=self.bucket_mask {
                let m = self.meta(idx);
                out.set_meta(idx, m);
                if !meta::is_empty(m) {
                    let cloned = clone_entry(self.bucket(idx).as_ref());
                    out.bucket(idx).write(cloned);
                }
            }
        }
        out.len = self.len;
        let _ = hasher; // layout is copied verbatim; hashing is only needed if re-derived.
        Ok(out)
    }
}

impl<T> RawTable<T> {
    /// Frees the backing allocation without dropping any occupied slot's
    /// payload. Callers must have already moved out or dropped every live
    /// entry (used by `RawIntoIter`, whose own `Drop` has already done so).
    pub(crate) unsafe fn dealloc_without_drop(&mut self) {
        if self.bucket_mask != 0 {
            dealloc_block::<T>(self.buckets, self.bucket_mask + 1);
            self.bucket_mask = 0;
        }
    }
}

impl<T> Drop for RawTable<T> {
    fn drop(&mut self) {
        if self.bucket_mask == 0 {
            return;
        }
        unsafe {
            for idx in 0..=self.bucket_mask {
                if !meta::is_empty(*self.meta.as_ptr().add(idx)) {
                    Bucket::<T>::from_base_index(self.buckets, idx).drop();
                }
            }
            dealloc_block::<T>(self.buckets, self.bucket_mask + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct TestEntry {
        key: u64,
        hash: u64,
    }

    impl Entry for TestEntry {
        fn stored_hash(&self) -> u64 {
            self.hash
        }
    }

    fn identity_hash(e: &TestEntry) -> u64 {
        e.hash
    }

    fn entry(key: u64) -> TestEntry {
        TestEntry { key, hash: key }
    }

    #[test]
    fn insert_then_find() {
        let mut t: RawTable<TestEntry> = RawTable::with_capacity(4, 0.875).unwrap();
        let hasher = identity_hash;
        t.insert_unique(1, entry(1), &hasher).unwrap();
        t.insert_unique(2, entry(2), &hasher).unwrap();
        unsafe {
            assert!(t.find(1, |e| e.key == 1).is_some());
            assert!(t.find(2, |e| e.key == 2).is_some());
            assert!(t.find(3, |e| e.key == 3).is_none());
        }
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn remove_sole_member() {
        let mut t: RawTable<TestEntry> = RawTable::with_capacity(4, 0.875).unwrap();
        let hasher = identity_hash;
        t.insert_unique(1, entry(1), &hasher).unwrap();
        let removed = unsafe { t.remove_entry(1, |e| e.key == 1) };
        assert_eq!(removed, Some(entry(1)));
        assert_eq!(t.len(), 0);
        unsafe { assert!(t.find(1, |e| e.key == 1).is_none()) };
    }

    #[test]
    fn collision_chain_survives_partial_removal() {
        // All these hashes share a home bucket (bucket_mask forces low bits to collide).
        let mut t: RawTable<TestEntry> = RawTable::with_capacity(4, 0.875).unwrap();
        let hasher = identity_hash;
        let bucket_count = t.bucket_count() as u64;
        let keys: Vec<u64> = (0..6).map(|i| i * bucket_count).collect();
        for &k in &keys {
            t.insert_unique(k, entry(k), &hasher).unwrap();
        }
        assert_eq!(t.len(), keys.len());
        for &k in &keys[..3] {
            assert!(unsafe { t.remove_entry(k, |e| e.key == k) }.is_some());
        }
        assert_eq!(t.len(), 3);
        for &k in &keys[3..] {
            assert!(unsafe { t.find(k, |e| e.key == k) }.is_some());
        }
    }

    #[test]
    fn grows_past_initial_capacity() {
        let mut t: RawTable<TestEntry> = RawTable::with_capacity(4, 0.875).unwrap();
        let hasher = identity_hash;
        for k in 0..2000u64 {
            t.insert_unique(k, entry(k), &hasher).unwrap();
        }
        assert_eq!(t.len(), 2000);
        for k in 0..2000u64 {
            assert!(unsafe { t.find(k, |e| e.key == k) }.is_some());
        }
    }

    #[test]
    fn clear_drops_and_resets_len() {
        let mut t: RawTable<TestEntry> = RawTable::with_capacity(4, 0.875).unwrap();
        let hasher = identity_hash;
        for k in 0..10u64 {
            t.insert_unique(k, entry(k), &hasher).unwrap();
        }
        t.clear();
        assert_eq!(t.len(), 0);
        unsafe { assert!(t.find(0, |e| e.key == 0).is_none()) };
    }

    /// A slot at `d == DISPLACEMENT_MASK` is bit-identical to `END_OF_CHAIN`
    /// and must never be handed out by `probe_empty`; taking it would
    /// truncate the chain that links to it.
    #[test]
    fn probe_empty_refuses_the_end_of_chain_displacement() {
        let mut t: RawTable<TestEntry> = RawTable::with_capacity(4096, 0.99).unwrap();
        let bucket_mask = t.bucket_count() - 1;
        assert!(bucket_mask + 1 > meta::DISPLACEMENT_MASK as usize);

        let home = 0usize;
        unsafe {
            t.set_meta(home, meta::head_word(0));
            // Occupy every slot reachable at d = 1..=MAX_DISPLACEMENT, leaving
            // only d == DISPLACEMENT_MASK (2047) empty.
            for d in 1..meta::DISPLACEMENT_MASK {
                let slot = (home + d as usize) & bucket_mask;
                t.set_meta(slot, meta::link_word(0, meta::END_OF_CHAIN));
            }
            assert!(matches!(t.probe_empty(home), Err(InsertError::GrowNeeded)));
        }
    }

    #[test]
    fn max_displacement_is_wired_into_probe_empty() {
        // MAX_DISPLACEMENT is the last value probe_empty may hand out.
        assert_eq!(meta::MAX_DISPLACEMENT, meta::DISPLACEMENT_MASK - 1);
    }
}
