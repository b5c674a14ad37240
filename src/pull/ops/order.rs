//! Ordering operators. Sorting materializes the upstream on the first advance.

use crate::error::Result;
use crate::order::SortSpec;
use crate::primitives::CancellationToken;
use crate::pull::{Element, Pull, SessionHandle};
use std::cmp::Ordering;

/// A pull sequence with a sort order still open to refinement.
///
/// ```
/// use tidepool::{CancellationToken, Pull};
///
/// let people = Pull::from_vec(vec![("bo", 31), ("al", 25), ("cy", 31)]);
/// let sorted = people.order_by_desc(|p| p.1).then_by(|p| p.0).to_vec(&CancellationToken::none())?;
/// assert_eq!(sorted, vec![("bo", 31), ("cy", 31), ("al", 25)]);
/// # Ok::<(), tidepool::SeqError>(())
/// ```
#[derive(Clone)]
pub struct Ordered<T> {
    source: Pull<T>,
    spec: SortSpec<T>,
}

impl<T: Element + Clone> Ordered<T> {
    pub fn then_by<K, F>(self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            source: self.source,
            spec: self.spec.then_by(key),
        }
    }

    pub fn then_by_desc<K, F>(self, key: F) -> Self
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            source: self.source,
            spec: self.spec.then_by_desc(key),
        }
    }

    /// Add a level with a fallible key and a custom comparator.
    pub fn then_by_with<K, F, C>(self, key: F, compare: C, descending: bool) -> Self
    where
        K: 'static,
        F: Fn(&T) -> Result<K> + Send + Sync + 'static,
        C: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
    {
        Self {
            source: self.source,
            spec: self.spec.then_by_with(key, compare, descending),
        }
    }

    pub fn spec(&self) -> &SortSpec<T> {
        &self.spec
    }

    /// Fix the order and get a plain pull sequence.
    pub fn into_pull(self) -> Pull<T> {
        let Self { source, spec } = self;
        Pull::from_batch(move |token| spec.sort(source.to_vec(token)?))
    }

    pub fn session(&self) -> SessionHandle<T> {
        self.clone().into_pull().session()
    }

    pub fn to_vec(&self, token: &CancellationToken) -> Result<Vec<T>> {
        self.spec.sort(self.source.to_vec(token)?)
    }
}

impl<T: Element + Clone> From<Ordered<T>> for Pull<T> {
    fn from(ordered: Ordered<T>) -> Self {
        ordered.into_pull()
    }
}

impl<T: Element + Clone> Pull<T> {
    pub fn order_by<K, F>(&self, key: F) -> Ordered<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.order_with(SortSpec::by(key))
    }

    pub fn order_by_desc<K, F>(&self, key: F) -> Ordered<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.order_with(SortSpec::by_desc(key))
    }

    /// Order by a prepared sort specification.
    pub fn order_with(&self, spec: SortSpec<T>) -> Ordered<T> {
        Ordered {
            source: self.clone(),
            spec,
        }
    }

    /// Elements in reverse order.
    pub fn reverse(&self) -> Pull<T> {
        let source = self.clone();
        Pull::from_batch(move |token| {
            let mut items = source.to_vec(token)?;
            items.reverse();
            Ok(items)
        })
    }
}
