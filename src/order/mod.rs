//! Stable multi-key sorting.
//!
//! A [`SortSpec`] is a chain of key levels. Sorting computes each level's
//! keys exactly once, then sorts element indices: the first level decides,
//! later levels break ties, and remaining ties keep input order.

use crate::error::Result;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

type KeyFn<T, K> = dyn Fn(&T) -> Result<K> + Send + Sync;
type CompareFn<K> = dyn Fn(&K, &K) -> Ordering + Send + Sync;

/// One level of a sort: how to extract and compare a key.
trait SortLevel<T>: Send + Sync {
    fn compute(&self, items: &[T]) -> Result<Box<dyn LevelKeys>>;
}

/// Keys of one level, computed for every element.
trait LevelKeys {
    fn compare(&self, a: usize, b: usize) -> Ordering;
}

struct KeyLevel<T, K> {
    key: Arc<KeyFn<T, K>>,
    compare: Arc<CompareFn<K>>,
    descending: bool,
}

struct ComputedKeys<K> {
    keys: Vec<K>,
    compare: Arc<CompareFn<K>>,
    descending: bool,
}

impl<K> LevelKeys for ComputedKeys<K> {
    fn compare(&self, a: usize, b: usize) -> Ordering {
        let ordering = (self.compare)(&self.keys[a], &self.keys[b]);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl<T, K: 'static> SortLevel<T> for KeyLevel<T, K> {
    fn compute(&self, items: &[T]) -> Result<Box<dyn LevelKeys>> {
        let keys = items
            .iter()
            .map(|item| (self.key)(item))
            .collect::<Result<Vec<K>>>()?;
        Ok(Box::new(ComputedKeys {
            keys,
            compare: self.compare.clone(),
            descending: self.descending,
        }))
    }
}

/// A chain of sort keys.
pub struct SortSpec<T> {
    levels: Vec<Arc<dyn SortLevel<T>>>,
}

impl<T> Clone for SortSpec<T> {
    fn clone(&self) -> Self {
        Self {
            levels: self.levels.clone(),
        }
    }
}

impl<T: 'static> SortSpec<T> {
    /// Sort ascending by `key`.
    pub fn by<K, F>(key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self { levels: Vec::new() }.then_by(key)
    }

    pub fn by_desc<K, F>(key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self { levels: Vec::new() }.then_by_desc(key)
    }

    /// Sort by a fallible key with a custom comparator.
    pub fn by_with<K, F, C>(key: F, compare: C, descending: bool) -> Self
    where
        K: 'static,
        F: Fn(&T) -> Result<K> + Send + Sync + 'static,
        C: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        Self { levels: Vec::new() }.then_by_with(key, compare, descending)
    }

    pub fn then_by<K, F>(self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.then_by_with(move |item| Ok(key(item)), K::cmp, false)
    }

    pub fn then_by_desc<K, F>(self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.then_by_with(move |item| Ok(key(item)), K::cmp, true)
    }

    pub fn then_by_with<K, F, C>(mut self, key: F, compare: C, descending: bool) -> Self
    where
        K: 'static,
        F: Fn(&T) -> Result<K> + Send + Sync + 'static,
        C: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        self.levels.push(Arc::new(KeyLevel {
            key: Arc::new(key),
            compare: Arc::new(compare),
            descending,
        }));
        self
    }

    /// Number of key levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Indices of `items` in sorted order. Fails if any key selector fails.
    pub fn sort_indices(&self, items: &[T]) -> Result<Vec<usize>> {
        let keys = self
            .levels
            .iter()
            .map(|level| level.compute(items))
            .collect::<Result<Vec<_>>>()?;

        let mut indices: Vec<usize> = (0..items.len()).collect();
        indices.sort_by(|&a, &b| {
            keys.iter()
                .map(|level| level.compare(a, b))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| a.cmp(&b))
        });
        Ok(indices)
    }

    /// Sort `items`, consuming them.
    pub fn sort(&self, items: Vec<T>) -> Result<Vec<T>> {
        let order = self.sort_indices(&items)?;
        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect())
    }
}

impl<T> fmt::Debug for SortSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortSpec")
            .field("levels", &self.levels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeqError;

    #[test]
    fn test_multi_key_with_stable_ties() {
        let people = vec![
            ("bob", 30, 1),
            ("amy", 25, 2),
            ("cat", 30, 3),
            ("dan", 25, 4),
            ("eve", 30, 5),
        ];
        let spec = SortSpec::by_desc(|p: &(&str, i32, i32)| p.1);
        let sorted = spec.sort(people.clone()).unwrap();
        let ids: Vec<_> = sorted.iter().map(|p| p.2).collect();
        assert_eq!(ids, vec![1, 3, 5, 2, 4]);

        let spec = SortSpec::by(|p: &(&str, i32, i32)| p.1).then_by_desc(|p| p.0);
        let ids: Vec<_> = spec.sort(people).unwrap().iter().map(|p| p.2).collect();
        assert_eq!(ids, vec![4, 2, 5, 3, 1]);
    }

    #[test]
    fn test_custom_comparator() {
        let words = vec!["Banana", "apple", "cherry"];
        let spec = SortSpec::by_with(
            |w: &&str| Ok(w.to_string()),
            |a: &String, b: &String| a.to_lowercase().cmp(&b.to_lowercase()),
            false,
        );
        assert_eq!(spec.sort(words).unwrap(), vec!["apple", "Banana", "cherry"]);
    }

    #[test]
    fn test_failing_key_aborts_sort() {
        let spec = SortSpec::by_with(
            |x: &i32| {
                if *x == 3 {
                    Err(SeqError::msg("no key for 3"))
                } else {
                    Ok(*x)
                }
            },
            i32::cmp,
            false,
        );
        assert!(spec.sort(vec![1, 3, 2]).is_err());
    }

    #[test]
    fn test_empty_input() {
        let spec = SortSpec::by(|x: &u8| *x);
        assert!(spec.sort(Vec::new()).unwrap().is_empty());
    }
}
