//! Keyed grouping shared by the grouping, join and lookup operators.
//!
//! - [`GroupTable`]: the incremental index, written by one builder
//! - [`Lookup`]: a frozen table whose groups can be shared across threads
//! - [`Group`]: a key and its elements in insertion order
//! - [`KeyComparer`]: injectable key equality and hashing

mod comparer;
mod table;

pub use comparer::{ByProjection, KeyComparer, NaturalComparer, OptionComparer, NULL_KEY_HASH};
pub use table::{GroupTable, Groups};

use std::fmt;
use std::sync::Arc;

/// A key and the elements that share it, in insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group<K, V> {
    key: K,
    elements: Vec<V>,
}

impl<K, V> Group<K, V> {
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            elements: Vec::new(),
        }
    }

    /// A group with no elements, returned for keys that were never seen.
    pub fn empty(key: K) -> Self {
        Self::new(key)
    }

    pub(crate) fn push(&mut self, element: V) {
        self.elements.push(element);
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.elements.get(index)
    }

    pub fn contains(&self, element: &V) -> bool
    where
        V: PartialEq,
    {
        self.elements.contains(element)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.elements.iter()
    }

    pub fn as_slice(&self) -> &[V] {
        &self.elements
    }
}

impl<'a, K, V> IntoIterator for &'a Group<K, V> {
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

/// A frozen group table.
///
/// Groups are shared behind `Arc`, so any number of readers can enumerate
/// them concurrently while the lookup itself stays immutable.
pub struct Lookup<K, V, C = NaturalComparer> {
    table: GroupTable<K, V, C>,
}

impl<K, V, C: KeyComparer<K>> Lookup<K, V, C> {
    /// The group for `key`, or an empty group when the key was never seen.
    pub fn get(&self, key: &K) -> Arc<Group<K, V>>
    where
        K: Clone,
    {
        match self.table.shared_group(key) {
            Some(group) => group.clone(),
            None => Arc::new(Group::empty(key.clone())),
        }
    }

    /// Elements under `key` without taking a reference count.
    pub fn elements(&self, key: &K) -> &[V] {
        self.table.lookup(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.table.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Groups in first-seen key order.
    pub fn groups(&self) -> Groups<'_, K, V> {
        self.table.groups()
    }

    pub fn comparer(&self) -> &C {
        self.table.comparer()
    }
}

impl<K, V, C: KeyComparer<K>> GroupTable<K, V, C> {
    /// End the build pass. No group can be appended to afterwards.
    pub fn freeze(self) -> Lookup<K, V, C> {
        Lookup { table: self }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for Lookup<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup").field("groups", &self.table).finish()
    }
}
