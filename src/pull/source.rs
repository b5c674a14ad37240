//! Basic pull sequence constructors.

use super::{no_current, BoxSession, Element, Pull, Session};
use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use std::sync::Arc;

/// Walks a shared vector without cloning its elements.
struct VecSession<T> {
    items: Arc<Vec<T>>,
    /// Index of the current element plus one (0 = before start).
    position: usize,
}

impl<T: Element> Session for VecSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        token.check()?;
        if self.position < self.items.len() {
            self.position += 1;
            Ok(true)
        } else {
            self.position = self.items.len() + 1;
            Ok(false)
        }
    }

    fn current(&self) -> Result<&T> {
        match self.position {
            0 => Err(no_current()),
            p => self.items.get(p - 1).ok_or_else(no_current),
        }
    }
}

/// Walks a fresh clone of a re-iterable collection.
struct IterSession<I: Iterator> {
    iter: I,
    current: Option<I::Item>,
}

impl<I> Session for IterSession<I>
where
    I: Iterator + Send,
    I::Item: Element,
{
    type Item = I::Item;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        token.check()?;
        self.current = self.iter.next();
        Ok(self.current.is_some())
    }

    fn current(&self) -> Result<&I::Item> {
        self.current.as_ref().ok_or_else(no_current)
    }
}

struct FailSession<T> {
    error: SeqError,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Element> Session for FailSession<T> {
    type Item = T;

    fn advance(&mut self, _token: &CancellationToken) -> Result<bool> {
        Err(self.error.clone())
    }

    fn current(&self) -> Result<&T> {
        Err(no_current())
    }
}

/// Opens the sequence produced by a factory on first advance.
struct DeferSession<T, F> {
    factory: Arc<F>,
    inner: Option<super::SessionHandle<T>>,
}

impl<T, F> Session for DeferSession<T, F>
where
    T: Element,
    F: Fn() -> Result<Pull<T>> + Send + Sync,
{
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        if self.inner.is_none() {
            self.inner = Some((self.factory)()?.session());
        }
        match self.inner.as_mut() {
            Some(inner) => inner.advance(token),
            None => Ok(false),
        }
    }

    fn current(&self) -> Result<&T> {
        self.inner.as_ref().ok_or_else(no_current)?.current()
    }

    fn dispose(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.dispose();
        }
    }
}

impl<T: Element> Pull<T> {
    /// Sequence over the elements of `items`.
    pub fn from_vec(items: Vec<T>) -> Self {
        let items = Arc::new(items);
        Self::from_factory(move || {
            Box::new(VecSession {
                items: items.clone(),
                position: 0,
            }) as BoxSession<T>
        })
    }

    /// Sequence over a re-iterable collection; each walk iterates a clone.
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_factory(move || {
            Box::new(IterSession {
                iter: iterable.clone().into_iter(),
                current: None,
            }) as BoxSession<T>
        })
    }

    pub fn empty() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Sequence whose every walk fails with `error` on the first advance.
    pub fn fail(error: SeqError) -> Self {
        Self::from_factory(move || {
            Box::new(FailSession {
                error: error.clone(),
                _marker: std::marker::PhantomData,
            }) as BoxSession<T>
        })
    }

    /// `value` repeated `count` times.
    pub fn repeat(value: T, count: usize) -> Self
    where
        T: Clone,
    {
        Self::from_iter(std::iter::repeat(value).take(count))
    }

    /// Build the sequence anew for every walk.
    ///
    /// `factory` runs on the first advance of each session, so a failing
    /// factory surfaces from `advance` like any other producer fault.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Pull<T>> + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        Self::from_factory(move || {
            Box::new(DeferSession {
                factory: factory.clone(),
                inner: None,
            }) as BoxSession<T>
        })
    }
}

/// Exclusive end of `count` integers from `start`, if it fits in an `i64`.
pub(crate) fn range_end(start: i64, count: usize) -> Result<i64> {
    i64::try_from(count)
        .ok()
        .and_then(|count| start.checked_add(count))
        .ok_or_else(|| {
            SeqError::Config(format!("range of {} values from {} overflows i64", count, start))
        })
}

impl Pull<i64> {
    /// `count` consecutive integers starting at `start`.
    ///
    /// A range that does not fit in `i64` fails on the first advance.
    pub fn range(start: i64, count: usize) -> Self {
        match range_end(start, count) {
            Ok(end) => Self::from_iter(start..end),
            Err(e) => Self::fail(e),
        }
    }
}
