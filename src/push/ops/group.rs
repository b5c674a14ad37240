//! Grouping and ordering push operators.
//!
//! Groups are built incrementally: a key selector failure aborts only that
//! insert, then terminates the subscription with the fault.

use super::flush;
use crate::config::GroupTableConfig;
use crate::error::{Result, SeqError};
use crate::group::{Group, GroupTable, KeyComparer, Lookup, NaturalComparer};
use crate::order::SortSpec;
use crate::primitives::CancellationToken;
use crate::pull::Element;
use crate::push::{BoxObserver, Flow, Observer, Push};
use std::hash::Hash;
use std::sync::Arc;

struct GroupObserver<K, T, C, F> {
    downstream: BoxObserver<Arc<Group<K, T>>>,
    table: Option<GroupTable<K, T, C>>,
    key: Arc<F>,
    token: CancellationToken,
}

impl<K, T, C, F> Observer<T> for GroupObserver<K, T, C, F>
where
    K: Element,
    T: Element,
    C: KeyComparer<K> + 'static,
    F: Fn(&T) -> Result<K> + Send + Sync,
{
    fn on_next(&mut self, value: T, _token: &CancellationToken) -> Result<Flow> {
        match self.table.as_mut() {
            Some(table) => {
                table.try_insert_with(value, |v| (self.key)(v))?;
                Ok(Flow::Continue)
            }
            None => Ok(Flow::Stop),
        }
    }

    fn on_error(&mut self, error: SeqError) {
        self.table = None;
        self.downstream.on_error(error);
    }

    fn on_completed(&mut self) {
        if let Some(table) = self.table.take() {
            let lookup = table.freeze();
            tracing::trace!(groups = lookup.len(), "emitting groups");
            flush(
                self.downstream.as_mut(),
                lookup.groups().map(|group| Ok(group.clone())),
                &self.token,
            );
        }
    }
}

struct SortObserver<T> {
    downstream: BoxObserver<T>,
    items: Vec<T>,
    spec: SortSpec<T>,
    token: CancellationToken,
}

impl<T: Element> Observer<T> for SortObserver<T> {
    fn on_next(&mut self, value: T, _token: &CancellationToken) -> Result<Flow> {
        self.items.push(value);
        Ok(Flow::Continue)
    }

    fn on_error(&mut self, error: SeqError) {
        self.items.clear();
        self.downstream.on_error(error);
    }

    fn on_completed(&mut self) {
        let items = std::mem::take(&mut self.items);
        match self.spec.sort(items) {
            Ok(sorted) => flush(
                self.downstream.as_mut(),
                sorted.into_iter().map(Ok),
                &self.token,
            ),
            Err(e) => self.downstream.on_error(e),
        }
    }
}

impl<T: Element> Push<T> {
    /// Groups in first-seen key order, emitted once the upstream completes.
    pub fn group_by<K, F>(&self, key: F) -> Push<Arc<Group<K, T>>>
    where
        K: Element + Hash + Eq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.group_by_with(GroupTableConfig::default(), NaturalComparer, move |v| Ok(key(v)))
    }

    pub fn group_by_with<K, C, F>(
        &self,
        config: GroupTableConfig,
        comparer: C,
        key: F,
    ) -> Push<Arc<Group<K, T>>>
    where
        K: Element,
        C: KeyComparer<K> + Clone + 'static,
        F: Fn(&T) -> Result<K> + Send + Sync + 'static,
    {
        let key = Arc::new(key);
        self.lift(move |downstream, subscription| {
            Box::new(GroupObserver {
                downstream,
                table: Some(GroupTable::with_comparer_and_config(comparer.clone(), &config)),
                key: key.clone(),
                token: subscription.token().clone(),
            }) as BoxObserver<T>
        })
    }

    /// Collect the sequence into a frozen lookup.
    pub fn to_lookup<K, F>(&self, key: F, token: &CancellationToken) -> Result<Lookup<K, T>>
    where
        K: Element + Hash + Eq,
        F: Fn(&T) -> K + Send + 'static,
    {
        let table = self.aggregate(
            GroupTable::new(),
            move |table: &mut GroupTable<K, T>, value| {
                table.try_insert_with(value, |v| Ok(key(v)))?;
                Ok(Flow::Continue)
            },
            token,
        )?;
        Ok(table.freeze())
    }

    /// Values sorted by `key` once the upstream completes. Ties keep
    /// arrival order.
    pub fn order_by<K, F>(&self, key: F) -> Push<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.order_with(SortSpec::by(key))
    }

    pub fn order_by_desc<K, F>(&self, key: F) -> Push<T>
    where
        K: Ord + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.order_with(SortSpec::by_desc(key))
    }

    pub fn order_with(&self, spec: SortSpec<T>) -> Push<T> {
        self.lift(move |downstream, subscription| {
            Box::new(SortObserver {
                downstream,
                items: Vec::new(),
                spec: spec.clone(),
                token: subscription.token().clone(),
            }) as BoxObserver<T>
        })
    }
}
