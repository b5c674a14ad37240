//! Key equality and hashing capabilities.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Hash used for absent (`None`) keys; all of them share one chain.
pub const NULL_KEY_HASH: u64 = 0;

/// Equality and hashing for group keys.
///
/// Implementations must keep `hash` consistent with `eq`.
pub trait KeyComparer<K>: Send + Sync {
    fn hash(&self, key: &K) -> u64;
    fn eq(&self, a: &K, b: &K) -> bool;
}

/// Natural `Hash + Eq` comparison.
#[derive(Clone, Copy, Debug, Default)]
pub struct NaturalComparer;

impl<K: Hash + Eq> KeyComparer<K> for NaturalComparer {
    fn hash(&self, key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Lifts a comparer to optional keys; every `None` lands in one sentinel bucket.
#[derive(Clone, Copy, Debug, Default)]
pub struct OptionComparer<C>(pub C);

impl<K, C: KeyComparer<K>> KeyComparer<Option<K>> for OptionComparer<C> {
    fn hash(&self, key: &Option<K>) -> u64 {
        match key {
            Some(k) => self.0.hash(k),
            None => NULL_KEY_HASH,
        }
    }

    fn eq(&self, a: &Option<K>, b: &Option<K>) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => self.0.eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

/// Comparer built from a projection: keys are equal when their projections are.
///
/// ```
/// use tidepool::group::{ByProjection, KeyComparer};
///
/// let case_insensitive = ByProjection::new(|s: &String| s.to_lowercase());
/// assert!(case_insensitive.eq(&"Rust".to_string(), &"RUST".to_string()));
/// ```
#[derive(Clone)]
pub struct ByProjection<F> {
    project: F,
}

impl<F> ByProjection<F> {
    pub fn new(project: F) -> Self {
        Self { project }
    }
}

impl<K, P, F> KeyComparer<K> for ByProjection<F>
where
    F: Fn(&K) -> P + Send + Sync,
    P: Hash + Eq,
{
    fn hash(&self, key: &K) -> u64 {
        NaturalComparer.hash(&(self.project)(key))
    }

    fn eq(&self, a: &K, b: &K) -> bool {
        (self.project)(a) == (self.project)(b)
    }
}

impl<F> fmt::Debug for ByProjection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByProjection { .. }")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_is_consistent() {
        let c = NaturalComparer;
        assert_eq!(KeyComparer::<&str>::hash(&c, &"a"), KeyComparer::<&str>::hash(&c, &"a"));
        assert!(c.eq(&"a", &"a"));
        assert!(!c.eq(&"a", &"b"));
    }

    #[test]
    fn test_option_sentinel() {
        let c = OptionComparer(NaturalComparer);
        assert_eq!(c.hash(&None::<i32>), NULL_KEY_HASH);
        assert!(c.eq(&None::<i32>, &None));
        assert!(!c.eq(&None, &Some(1)));
        assert!(c.eq(&Some(1), &Some(1)));
    }
}
