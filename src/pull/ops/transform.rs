//! Element-wise pull operators.

use super::Upstream;
use crate::error::Result;
use crate::primitives::CancellationToken;
use crate::pull::{no_current, BoxSession, Element, Pull, Session, SessionHandle};
use std::sync::Arc;

struct MapSession<T, U, F> {
    upstream: Upstream<T>,
    f: Arc<F>,
    current: Option<U>,
}

impl<T, U, F> Session for MapSession<T, U, F>
where
    T: Element,
    U: Element,
    F: Fn(&T) -> Result<U> + Send + Sync,
{
    type Item = U;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        self.current = None;
        if !self.upstream.advance(token)? {
            return Ok(false);
        }
        self.current = Some((self.f)(self.upstream.current()?)?);
        Ok(true)
    }

    fn current(&self) -> Result<&U> {
        self.current.as_ref().ok_or_else(no_current)
    }

    fn dispose(&mut self) {
        self.upstream.dispose();
    }
}

struct FilterSession<T, F> {
    upstream: Upstream<T>,
    predicate: Arc<F>,
}

impl<T, F> Session for FilterSession<T, F>
where
    T: Element,
    F: Fn(&T) -> Result<bool> + Send + Sync,
{
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        while self.upstream.advance(token)? {
            if (self.predicate)(self.upstream.current()?)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current(&self) -> Result<&T> {
        self.upstream.current()
    }

    fn dispose(&mut self) {
        self.upstream.dispose();
    }
}

struct FlatMapSession<T, U, F> {
    outer: Upstream<T>,
    inner: Option<SessionHandle<U>>,
    f: Arc<F>,
}

impl<T, U, F> Session for FlatMapSession<T, U, F>
where
    T: Element,
    U: Element,
    F: Fn(&T) -> Result<Pull<U>> + Send + Sync,
{
    type Item = U;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        loop {
            if let Some(inner) = self.inner.as_mut() {
                if inner.advance(token)? {
                    return Ok(true);
                }
                self.inner = None;
            }
            if !self.outer.advance(token)? {
                return Ok(false);
            }
            self.inner = Some((self.f)(self.outer.current()?)?.session());
        }
    }

    fn current(&self) -> Result<&U> {
        self.inner.as_ref().ok_or_else(no_current)?.current()
    }

    fn dispose(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.dispose();
        }
        self.outer.dispose();
    }
}

/// Shared by `take` and `skip`.
struct CountSession<T> {
    upstream: Upstream<T>,
    count: usize,
    take: bool,
    seen: usize,
}

impl<T: Element> Session for CountSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        if self.take {
            if self.seen >= self.count {
                return Ok(false);
            }
            self.seen += 1;
            return self.upstream.advance(token);
        }

        while self.seen < self.count {
            self.seen += 1;
            if !self.upstream.advance(token)? {
                return Ok(false);
            }
        }
        self.upstream.advance(token)
    }

    fn current(&self) -> Result<&T> {
        self.upstream.current()
    }

    fn dispose(&mut self) {
        self.upstream.dispose();
    }
}

/// Shared by `take_while` and `skip_while`.
struct WhileSession<T, F> {
    upstream: Upstream<T>,
    predicate: Arc<F>,
    take: bool,
    /// take_while: predicate failed once; skip_while: skipping is over.
    switched: bool,
}

impl<T, F> Session for WhileSession<T, F>
where
    T: Element,
    F: Fn(&T) -> Result<bool> + Send + Sync,
{
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        if self.take {
            if self.switched || !self.upstream.advance(token)? {
                return Ok(false);
            }
            if (self.predicate)(self.upstream.current()?)? {
                return Ok(true);
            }
            self.switched = true;
            return Ok(false);
        }

        if self.switched {
            return self.upstream.advance(token);
        }
        while self.upstream.advance(token)? {
            if !(self.predicate)(self.upstream.current()?)? {
                self.switched = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current(&self) -> Result<&T> {
        self.upstream.current()
    }

    fn dispose(&mut self) {
        self.upstream.dispose();
    }
}

struct ConcatSession<T> {
    first: Upstream<T>,
    second: Upstream<T>,
    on_second: bool,
}

impl<T: Element> Session for ConcatSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        if !self.on_second {
            if self.first.advance(token)? {
                return Ok(true);
            }
            self.on_second = true;
        }
        self.second.advance(token)
    }

    fn current(&self) -> Result<&T> {
        if self.on_second {
            self.second.current()
        } else {
            self.first.current()
        }
    }

    fn dispose(&mut self) {
        self.first.dispose();
        self.second.dispose();
    }
}

struct ZipSession<T, U> {
    left: Upstream<T>,
    right: Upstream<U>,
    current: Option<(T, U)>,
}

impl<T, U> Session for ZipSession<T, U>
where
    T: Element + Clone,
    U: Element + Clone,
{
    type Item = (T, U);

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        self.current = None;
        let left = match self.left.next_cloned(token)? {
            Some(left) => left,
            None => return Ok(false),
        };
        let right = match self.right.next_cloned(token)? {
            Some(right) => right,
            None => return Ok(false),
        };
        self.current = Some((left, right));
        Ok(true)
    }

    fn current(&self) -> Result<&(T, U)> {
        self.current.as_ref().ok_or_else(no_current)
    }

    fn dispose(&mut self) {
        self.left.dispose();
        self.right.dispose();
    }
}

impl<T: Element> Pull<T> {
    /// Transform each element with a fallible function.
    pub fn try_map<U, F>(&self, f: F) -> Pull<U>
    where
        U: Element,
        F: Fn(&T) -> Result<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Pull::from_factory(move || {
            Box::new(MapSession {
                upstream: Upstream::new(source.clone()),
                f: f.clone(),
                current: None,
            }) as BoxSession<U>
        })
    }

    pub fn map<U, F>(&self, f: F) -> Pull<U>
    where
        U: Element,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.try_map(move |item| Ok(f(item)))
    }

    pub fn try_filter<F>(&self, predicate: F) -> Pull<T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Pull::from_factory(move || {
            Box::new(FilterSession {
                upstream: Upstream::new(source.clone()),
                predicate: predicate.clone(),
            }) as BoxSession<T>
        })
    }

    pub fn filter<F>(&self, predicate: F) -> Pull<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |item| Ok(predicate(item)))
    }

    /// Run `f` on each element as it passes through.
    pub fn inspect<F>(&self, f: F) -> Pull<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.try_filter(move |item| {
            f(item);
            Ok(true)
        })
    }

    /// Replace each element with a sequence and flatten the results.
    pub fn flat_map<U, F>(&self, f: F) -> Pull<U>
    where
        U: Element,
        F: Fn(&T) -> Result<Pull<U>> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Pull::from_factory(move || {
            Box::new(FlatMapSession {
                outer: Upstream::new(source.clone()),
                inner: None,
                f: f.clone(),
            }) as BoxSession<U>
        })
    }

    /// The first `count` elements. Upstream is not advanced past them.
    pub fn take(&self, count: usize) -> Pull<T> {
        self.counted(count, true)
    }

    pub fn skip(&self, count: usize) -> Pull<T> {
        self.counted(count, false)
    }

    fn counted(&self, count: usize, take: bool) -> Pull<T> {
        let source = self.clone();
        Pull::from_factory(move || {
            Box::new(CountSession {
                upstream: Upstream::new(source.clone()),
                count,
                take,
                seen: 0,
            }) as BoxSession<T>
        })
    }

    pub fn take_while<F>(&self, predicate: F) -> Pull<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.while_op(move |item| Ok(predicate(item)), true)
    }

    pub fn skip_while<F>(&self, predicate: F) -> Pull<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.while_op(move |item| Ok(predicate(item)), false)
    }

    fn while_op<F>(&self, predicate: F, take: bool) -> Pull<T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Pull::from_factory(move || {
            Box::new(WhileSession {
                upstream: Upstream::new(source.clone()),
                predicate: predicate.clone(),
                take,
                switched: false,
            }) as BoxSession<T>
        })
    }

    /// All elements of `self`, then all elements of `other`.
    pub fn concat(&self, other: &Pull<T>) -> Pull<T> {
        let first = self.clone();
        let second = other.clone();
        Pull::from_factory(move || {
            Box::new(ConcatSession {
                first: Upstream::new(first.clone()),
                second: Upstream::new(second.clone()),
                on_second: false,
            }) as BoxSession<T>
        })
    }
}

impl<T: Element + Clone> Pull<T> {
    /// Pairs of elements; ends with the shorter sequence.
    pub fn zip<U: Element + Clone>(&self, other: &Pull<U>) -> Pull<(T, U)> {
        let left = self.clone();
        let right = other.clone();
        Pull::from_factory(move || {
            Box::new(ZipSession {
                left: Upstream::new(left.clone()),
                right: Upstream::new(right.clone()),
                current: None,
            }) as BoxSession<(T, U)>
        })
    }

    /// Elements paired with their zero-based position.
    pub fn enumerate(&self) -> Pull<(usize, T)> {
        self.zip(&Pull::from_iter(0usize..)).map(|(item, index)| (*index, item.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeqError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_map_filter_chain() {
        let result = Pull::range(1, 10)
            .filter(|x| x % 2 == 0)
            .map(|x| x * 10)
            .to_vec(&token())
            .unwrap();
        assert_eq!(result, vec![20, 40, 60, 80, 100]);
    }

    #[test]
    fn test_try_map_fault_surfaces_from_advance() {
        let mapped = Pull::range(1, 3).try_map(|x| {
            if *x == 2 {
                Err(SeqError::msg("two"))
            } else {
                Ok(*x)
            }
        });
        let mut session = mapped.session();
        assert!(session.advance(&token()).unwrap());
        assert!(session.advance(&token()).is_err());
    }

    #[test]
    fn test_take_does_not_overpull() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let p = pulled.clone();
        let counted = Pull::range(0, 100).inspect(move |_| {
            p.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counted.take(3).to_vec(&token()).unwrap(), vec![0, 1, 2]);
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_skip_and_while_variants() {
        let source = Pull::from_vec(vec![1, 2, 5, 1, 7]);
        assert_eq!(source.skip(2).to_vec(&token()).unwrap(), vec![5, 1, 7]);
        assert_eq!(source.skip(10).to_vec(&token()).unwrap(), Vec::<i32>::new());
        assert_eq!(source.take_while(|x| *x < 5).to_vec(&token()).unwrap(), vec![1, 2]);
        assert_eq!(source.skip_while(|x| *x < 5).to_vec(&token()).unwrap(), vec![5, 1, 7]);
    }

    #[test]
    fn test_flat_map() {
        let source = Pull::from_vec(vec![0usize, 2, 1]);
        let flat = source.flat_map(|n| Ok(Pull::repeat(*n, *n)));
        assert_eq!(flat.to_vec(&token()).unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn test_concat_and_zip() {
        let a = Pull::from_vec(vec!['a', 'b']);
        let b = Pull::from_vec(vec!['c']);
        assert_eq!(a.concat(&b).to_vec(&token()).unwrap(), vec!['a', 'b', 'c']);

        let zipped = a.zip(&Pull::range(1, 5)).to_vec(&token()).unwrap();
        assert_eq!(zipped, vec![('a', 1), ('b', 2)]);
    }

    #[test]
    fn test_enumerate() {
        let indexed = Pull::from_vec(vec!["x", "y"]).enumerate().to_vec(&token()).unwrap();
        assert_eq!(indexed, vec![(0, "x"), (1, "y")]);
    }

    #[test]
    fn test_rewalk_reopens_upstream() {
        let opened = Arc::new(AtomicUsize::new(0));
        let o = opened.clone();
        let source = Pull::defer(move || {
            o.fetch_add(1, Ordering::SeqCst);
            Ok(Pull::range(0, 3))
        });
        let doubled = source.map(|x| x * 2);
        assert_eq!(doubled.to_vec(&token()).unwrap(), vec![0, 2, 4]);
        assert_eq!(doubled.to_vec(&token()).unwrap(), vec![0, 2, 4]);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }
}
