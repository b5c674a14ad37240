//! Grouping and join operators over the keyed group table.
//!
//! All of them build their table in one batch pass: a failing source or key
//! selector aborts the whole pass.

use super::Upstream;
use crate::config::GroupTableConfig;
use crate::error::Result;
use crate::group::{Group, GroupTable, KeyComparer, Lookup, NaturalComparer};
use crate::primitives::CancellationToken;
use crate::pull::{no_current, BoxSession, Element, Pull, Session};
use std::hash::Hash;
use std::sync::Arc;

type KeyFn<T, K> = dyn Fn(&T) -> Result<K> + Send + Sync;

/// Walks one shared group without copying it.
struct GroupSession<K, V> {
    group: Arc<Group<K, V>>,
    position: usize,
}

impl<K: Element, V: Element> Session for GroupSession<K, V> {
    type Item = V;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        token.check()?;
        if self.position < self.group.len() {
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn current(&self) -> Result<&V> {
        match self.position {
            0 => Err(no_current()),
            p => self.group.get(p - 1).ok_or_else(no_current),
        }
    }
}

impl<V: Element> Pull<V> {
    /// The elements of a group as a pull sequence.
    pub fn from_group<K: Element>(group: Arc<Group<K, V>>) -> Self {
        Self::from_factory(move || {
            Box::new(GroupSession {
                group: group.clone(),
                position: 0,
            }) as BoxSession<V>
        })
    }
}

fn build_lookup<U, K>(
    source: &Pull<U>,
    key: &KeyFn<U, K>,
    token: &CancellationToken,
) -> Result<Lookup<K, U>>
where
    U: Element + Clone,
    K: Element + Hash + Eq,
{
    let mut session = source.session();
    let table = GroupTable::build(
        session.iter(token),
        NaturalComparer,
        &GroupTableConfig::default(),
        |item| key(item),
        Ok,
    )?;
    Ok(table.freeze())
}

struct JoinSession<T, U, K, R> {
    outer: Upstream<T>,
    inner: Pull<U>,
    outer_key: Arc<KeyFn<T, K>>,
    inner_key: Arc<KeyFn<U, K>>,
    result: Arc<dyn Fn(&T, &U) -> Result<R> + Send + Sync>,
    lookup: Option<Lookup<K, U>>,
    matches: Option<Arc<Group<K, U>>>,
    index: usize,
    current: Option<R>,
}

impl<T, U, K, R> Session for JoinSession<T, U, K, R>
where
    T: Element,
    U: Element + Clone,
    K: Element + Clone + Hash + Eq,
    R: Element,
{
    type Item = R;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        self.current = None;
        if self.lookup.is_none() {
            self.lookup = Some(build_lookup(&self.inner, &*self.inner_key, token)?);
        }
        loop {
            if let Some(group) = &self.matches {
                if let Some(inner) = group.get(self.index) {
                    self.index += 1;
                    let outer = self.outer.current()?;
                    self.current = Some((self.result)(outer, inner)?);
                    return Ok(true);
                }
            }

            self.matches = None;
            if !self.outer.advance(token)? {
                return Ok(false);
            }
            let key = (self.outer_key)(self.outer.current()?)?;
            if let Some(lookup) = &self.lookup {
                self.matches = Some(lookup.get(&key));
                self.index = 0;
            }
        }
    }

    fn current(&self) -> Result<&R> {
        self.current.as_ref().ok_or_else(no_current)
    }

    fn dispose(&mut self) {
        self.outer.dispose();
        self.matches = None;
        self.lookup = None;
    }
}

struct GroupJoinSession<T, U, K, R> {
    outer: Upstream<T>,
    inner: Pull<U>,
    outer_key: Arc<KeyFn<T, K>>,
    inner_key: Arc<KeyFn<U, K>>,
    result: Arc<dyn Fn(&T, &Group<K, U>) -> Result<R> + Send + Sync>,
    lookup: Option<Lookup<K, U>>,
    current: Option<R>,
}

impl<T, U, K, R> Session for GroupJoinSession<T, U, K, R>
where
    T: Element,
    U: Element + Clone,
    K: Element + Clone + Hash + Eq,
    R: Element,
{
    type Item = R;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        self.current = None;
        if self.lookup.is_none() {
            self.lookup = Some(build_lookup(&self.inner, &*self.inner_key, token)?);
        }
        if !self.outer.advance(token)? {
            return Ok(false);
        }
        let outer = self.outer.current()?;
        let key = (self.outer_key)(outer)?;
        let group = match &self.lookup {
            Some(lookup) => lookup.get(&key),
            None => Arc::new(Group::empty(key)),
        };
        self.current = Some((self.result)(outer, &group)?);
        Ok(true)
    }

    fn current(&self) -> Result<&R> {
        self.current.as_ref().ok_or_else(no_current)
    }

    fn dispose(&mut self) {
        self.outer.dispose();
        self.lookup = None;
    }
}

impl<T: Element + Clone> Pull<T> {
    /// Group elements by key, in first-seen key order.
    ///
    /// ```
    /// use tidepool::{CancellationToken, Pull};
    ///
    /// let words = Pull::from_vec(vec!["apple", "bean", "avocado"]);
    /// let groups = words.group_by(|w| w.chars().next()).to_vec(&CancellationToken::none())?;
    /// assert_eq!(*groups[0].key(), Some('a'));
    /// assert_eq!(groups[0].as_slice(), &["apple", "avocado"]);
    /// # Ok::<(), tidepool::SeqError>(())
    /// ```
    pub fn group_by<K, F>(&self, key: F) -> Pull<Arc<Group<K, T>>>
    where
        K: Element + Hash + Eq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.try_group_by(move |item| Ok(key(item)))
    }

    pub fn try_group_by<K, F>(&self, key: F) -> Pull<Arc<Group<K, T>>>
    where
        K: Element + Hash + Eq,
        F: Fn(&T) -> Result<K> + Send + Sync + 'static,
    {
        self.group_by_with(GroupTableConfig::default(), NaturalComparer, key, Ok)
    }

    /// Group with a custom key comparer and element projection.
    pub fn group_by_with<K, V, C, KF, EF>(
        &self,
        config: GroupTableConfig,
        comparer: C,
        key: KF,
        element: EF,
    ) -> Pull<Arc<Group<K, V>>>
    where
        K: Element,
        V: Element,
        C: KeyComparer<K> + Clone + 'static,
        KF: Fn(&T) -> Result<K> + Send + Sync + 'static,
        EF: Fn(T) -> Result<V> + Send + Sync + 'static,
    {
        let source = self.clone();
        Pull::from_batch(move |token| {
            let mut session = source.session();
            let table = GroupTable::build(
                session.iter(token),
                comparer.clone(),
                &config,
                |item| key(item),
                |item| element(item),
            )?;
            Ok(table.freeze().groups().cloned().collect())
        })
    }

    /// Drain the sequence into a frozen lookup.
    pub fn to_lookup<K, F>(&self, key: F, token: &CancellationToken) -> Result<Lookup<K, T>>
    where
        K: Element + Hash + Eq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        build_lookup(self, &move |item: &T| Ok(key(item)), token)
    }

    /// Inner equi-join. For each outer element, in order, one result per
    /// matching inner element, in inner order. `inner` is walked once per
    /// session, on the first advance.
    pub fn join<U, K, R, OK, IK, F>(
        &self,
        inner: &Pull<U>,
        outer_key: OK,
        inner_key: IK,
        result: F,
    ) -> Pull<R>
    where
        U: Element + Clone,
        K: Element + Clone + Hash + Eq,
        R: Element,
        OK: Fn(&T) -> K + Send + Sync + 'static,
        IK: Fn(&U) -> K + Send + Sync + 'static,
        F: Fn(&T, &U) -> R + Send + Sync + 'static,
    {
        let outer = self.clone();
        let inner = inner.clone();
        let outer_key: Arc<KeyFn<T, K>> = Arc::new(move |item: &T| Ok(outer_key(item)));
        let inner_key: Arc<KeyFn<U, K>> = Arc::new(move |item: &U| Ok(inner_key(item)));
        let result: Arc<dyn Fn(&T, &U) -> Result<R> + Send + Sync> =
            Arc::new(move |o: &T, i: &U| Ok(result(o, i)));
        Pull::from_factory(move || {
            Box::new(JoinSession {
                outer: Upstream::new(outer.clone()),
                inner: inner.clone(),
                outer_key: outer_key.clone(),
                inner_key: inner_key.clone(),
                result: result.clone(),
                lookup: None,
                matches: None,
                index: 0,
                current: None,
            }) as BoxSession<R>
        })
    }

    /// One result per outer element, paired with its (possibly empty) group
    /// of matching inner elements.
    pub fn group_join<U, K, R, OK, IK, F>(
        &self,
        inner: &Pull<U>,
        outer_key: OK,
        inner_key: IK,
        result: F,
    ) -> Pull<R>
    where
        U: Element + Clone,
        K: Element + Clone + Hash + Eq,
        R: Element,
        OK: Fn(&T) -> K + Send + Sync + 'static,
        IK: Fn(&U) -> K + Send + Sync + 'static,
        F: Fn(&T, &Group<K, U>) -> R + Send + Sync + 'static,
    {
        let outer = self.clone();
        let inner = inner.clone();
        let outer_key: Arc<KeyFn<T, K>> = Arc::new(move |item: &T| Ok(outer_key(item)));
        let inner_key: Arc<KeyFn<U, K>> = Arc::new(move |item: &U| Ok(inner_key(item)));
        let result: Arc<dyn Fn(&T, &Group<K, U>) -> Result<R> + Send + Sync> =
            Arc::new(move |o: &T, g: &Group<K, U>| Ok(result(o, g)));
        Pull::from_factory(move || {
            Box::new(GroupJoinSession {
                outer: Upstream::new(outer.clone()),
                inner: inner.clone(),
                outer_key: outer_key.clone(),
                inner_key: inner_key.clone(),
                result: result.clone(),
                lookup: None,
                current: None,
            }) as BoxSession<R>
        })
    }
}
