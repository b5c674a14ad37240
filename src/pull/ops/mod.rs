//! Pull operators.
//!
//! Every operator session opens its upstream sessions lazily on the first
//! advance. Because [`Pull::session`](super::Pull::session) builds the whole
//! chain afresh, re-walking an operator re-walks every upstream too.

pub mod aggregate;
pub mod group;
pub mod order;
pub mod recover;
pub mod set;
pub mod transform;

use super::{no_current, BoxSession, Element, Pull, Session, SessionHandle};
use crate::error::Result;
use crate::primitives::CancellationToken;
use std::sync::Arc;

type BatchFn<T> = dyn Fn(&CancellationToken) -> Result<Vec<T>> + Send + Sync;

/// Walks a batch computed on the first advance (grouping, sorting).
struct BatchSession<T> {
    build: Arc<BatchFn<T>>,
    items: Option<Vec<T>>,
    position: usize,
}

impl<T: Element> Session for BatchSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        token.check()?;
        if self.items.is_none() {
            self.items = Some((self.build)(token)?);
        }
        let len = self.items.as_ref().map_or(0, Vec::len);
        if self.position < len {
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn current(&self) -> Result<&T> {
        match (&self.items, self.position) {
            (Some(items), p) if p > 0 => items.get(p - 1).ok_or_else(no_current),
            _ => Err(no_current()),
        }
    }

    fn dispose(&mut self) {
        self.items = None;
    }
}

impl<T: Element> Pull<T> {
    /// Sequence whose every walk materializes `build` on its first advance.
    pub(crate) fn from_batch<F>(build: F) -> Self
    where
        F: Fn(&CancellationToken) -> Result<Vec<T>> + Send + Sync + 'static,
    {
        let build: Arc<BatchFn<T>> = Arc::new(build);
        Self::from_factory(move || {
            Box::new(BatchSession {
                build: build.clone(),
                items: None,
                position: 0,
            }) as BoxSession<T>
        })
    }
}

/// A lazily opened upstream session.
pub(crate) struct Upstream<T> {
    source: Pull<T>,
    session: Option<SessionHandle<T>>,
}

impl<T: Element> Upstream<T> {
    pub(crate) fn new(source: Pull<T>) -> Self {
        Self {
            source,
            session: None,
        }
    }

    pub(crate) fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        let source = &self.source;
        self.session
            .get_or_insert_with(|| source.session())
            .advance(token)
    }

    pub(crate) fn current(&self) -> Result<&T> {
        match &self.session {
            Some(session) => session.current(),
            None => Err(super::no_current()),
        }
    }

    pub(crate) fn next_cloned(&mut self, token: &CancellationToken) -> Result<Option<T>>
    where
        T: Clone,
    {
        if self.advance(token)? {
            Ok(Some(self.current()?.clone()))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn dispose(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.dispose();
        }
    }
}
