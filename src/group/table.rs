//! The keyed group table.

use super::comparer::{KeyComparer, NaturalComparer};
use super::Group;
use crate::config::GroupTableConfig;
use crate::error::{Result, SeqError};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Arena slot for one group.
struct Slot<K, V> {
    group: Arc<Group<K, V>>,
    hash: u64,
    /// Next slot in the same bucket chain.
    next_in_bucket: Option<usize>,
    /// Next slot in first-seen order; the newest slot points at the oldest.
    next_seen: usize,
}

/// Incremental key -> group index that remembers first-seen key order.
///
/// Groups live in an arena. Each bucket holds the head of a chain of slot
/// indices, and every slot is also threaded into a circular list in the order
/// its key was first seen, with `last` pointing at the newest slot. Inserting
/// is amortized O(1); the bucket array grows to `2n + 1` and is rehashed when
/// the group count reaches the bucket count.
pub struct GroupTable<K, V, C = NaturalComparer> {
    comparer: C,
    buckets: Vec<Option<usize>>,
    slots: Vec<Slot<K, V>>,
    last: Option<usize>,
}

impl<K: Hash + Eq, V> GroupTable<K, V, NaturalComparer> {
    pub fn new() -> Self {
        Self::with_comparer(NaturalComparer)
    }

    pub fn with_config(config: &GroupTableConfig) -> Self {
        Self::with_comparer_and_config(NaturalComparer, config)
    }
}

impl<K: Hash + Eq, V> Default for GroupTable<K, V, NaturalComparer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C: KeyComparer<K>> GroupTable<K, V, C> {
    pub fn with_comparer(comparer: C) -> Self {
        Self::with_comparer_and_config(comparer, &GroupTableConfig::default())
    }

    pub fn with_comparer_and_config(comparer: C, config: &GroupTableConfig) -> Self {
        Self {
            comparer,
            buckets: vec![None; config.initial_buckets.max(1)],
            slots: Vec::new(),
            last: None,
        }
    }

    /// Build a table from a fallible sequence in one pass.
    ///
    /// Any failure (from the items, the key selector or the element
    /// selector) aborts the whole build.
    pub fn build<T, I, KF, EF>(
        items: I,
        comparer: C,
        config: &GroupTableConfig,
        mut key_selector: KF,
        mut element_selector: EF,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Result<T>>,
        KF: FnMut(&T) -> Result<K>,
        EF: FnMut(T) -> Result<V>,
    {
        let mut table = Self::with_comparer_and_config(comparer, config);
        for item in items {
            let item = item?;
            let key = key_selector(&item)?;
            let element = element_selector(item)?;
            table.insert(key, element)?;
        }
        Ok(table)
    }

    /// Append `element` to the group for `key`, creating the group on first
    /// sight of the key.
    pub fn insert(&mut self, key: K, element: V) -> Result<()> {
        let index = self.get_or_create(key);
        match Arc::get_mut(&mut self.slots[index].group) {
            Some(group) => {
                group.push(element);
                Ok(())
            }
            None => Err(SeqError::protocol("insert into a group that is already shared")),
        }
    }

    /// Select the key of `element` and insert it.
    ///
    /// A failing selector aborts only this insert; the table is untouched and
    /// stays usable.
    pub fn try_insert_with<F>(&mut self, element: V, key_selector: F) -> Result<()>
    where
        F: FnOnce(&V) -> Result<K>,
    {
        let key = key_selector(&element)?;
        self.insert(key, element)
    }

    /// Elements grouped under `key`; empty when the key was never seen.
    pub fn lookup(&self, key: &K) -> &[V] {
        match self.find(key, self.comparer.hash(key)) {
            Some(index) => self.slots[index].group.as_slice(),
            None => &[],
        }
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key, self.comparer.hash(key)).is_some()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current bucket count.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Groups in first-seen key order.
    pub fn groups(&self) -> Groups<'_, K, V> {
        Groups {
            slots: &self.slots,
            next: self.last.map(|last| self.slots[last].next_seen),
            remaining: self.slots.len(),
        }
    }

    pub(crate) fn comparer(&self) -> &C {
        &self.comparer
    }

    pub(crate) fn shared_group(&self, key: &K) -> Option<&Arc<Group<K, V>>> {
        self.find(key, self.comparer.hash(key))
            .map(|index| &self.slots[index].group)
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    fn find(&self, key: &K, hash: u64) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket_of(hash)];
        while let Some(index) = cursor {
            let slot = &self.slots[index];
            if slot.hash == hash && self.comparer.eq(slot.group.key(), key) {
                return Some(index);
            }
            cursor = slot.next_in_bucket;
        }
        None
    }

    fn get_or_create(&mut self, key: K) -> usize {
        let hash = self.comparer.hash(&key);
        if let Some(index) = self.find(&key, hash) {
            return index;
        }

        if self.slots.len() == self.buckets.len() {
            self.grow();
        }

        let index = self.slots.len();
        let bucket = self.bucket_of(hash);
        let next_seen = match self.last {
            Some(last) => {
                let oldest = self.slots[last].next_seen;
                self.slots[last].next_seen = index;
                oldest
            }
            None => index,
        };

        self.slots.push(Slot {
            group: Arc::new(Group::new(key)),
            hash,
            next_in_bucket: self.buckets[bucket],
            next_seen,
        });
        self.buckets[bucket] = Some(index);
        self.last = Some(index);
        index
    }

    fn grow(&mut self) {
        let size = self.buckets.len() * 2 + 1;
        tracing::debug!(from = self.buckets.len(), to = size, "growing group table");

        self.buckets = vec![None; size];
        for index in 0..self.slots.len() {
            let bucket = self.bucket_of(self.slots[index].hash);
            self.slots[index].next_in_bucket = self.buckets[bucket];
            self.buckets[bucket] = Some(index);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for GroupTable<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut next = self.last.map(|last| self.slots[last].next_seen);
        for _ in 0..self.slots.len() {
            if let Some(index) = next {
                list.entry(&*self.slots[index].group);
                next = Some(self.slots[index].next_seen);
            }
        }
        list.finish()
    }
}

/// Iterator over groups in first-seen order.
pub struct Groups<'a, K, V> {
    slots: &'a [Slot<K, V>],
    next: Option<usize>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Groups<'a, K, V> {
    type Item = &'a Arc<Group<K, V>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next?;
        let slot = &self.slots[index];
        self.remaining -= 1;
        self.next = Some(slot.next_seen);
        Some(&slot.group)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> ExactSizeIterator for Groups<'a, K, V> {}
