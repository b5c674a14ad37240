//! Element-wise push operators.

use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use crate::pull::Element;
use crate::push::{BoxObserver, Flow, Observer, Push, Subscription};
use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Passes terminal signals straight to `downstream`.
macro_rules! forward_terminals {
    () => {
        fn on_error(&mut self, error: SeqError) {
            self.downstream.on_error(error);
        }

        fn on_completed(&mut self) {
            self.downstream.on_completed();
        }
    };
}

struct MapObserver<T, U, F> {
    downstream: BoxObserver<U>,
    f: Arc<F>,
    _marker: PhantomData<fn(T)>,
}

impl<T, U, F> Observer<T> for MapObserver<T, U, F>
where
    T: Element,
    U: Element,
    F: Fn(&T) -> Result<U> + Send + Sync,
{
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        let mapped = (self.f)(&value)?;
        self.downstream.on_next(mapped, token)
    }

    forward_terminals!();
}

struct FilterObserver<T, F> {
    downstream: BoxObserver<T>,
    predicate: Arc<F>,
}

impl<T, F> Observer<T> for FilterObserver<T, F>
where
    T: Element,
    F: Fn(&T) -> Result<bool> + Send + Sync,
{
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        if (self.predicate)(&value)? {
            self.downstream.on_next(value, token)
        } else {
            Ok(Flow::Continue)
        }
    }

    forward_terminals!();
}

struct TakeObserver<T> {
    downstream: BoxObserver<T>,
    remaining: usize,
}

impl<T: Element> Observer<T> for TakeObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        if self.remaining == 0 {
            return Ok(Flow::Stop);
        }
        self.remaining -= 1;
        let flow = self.downstream.on_next(value, token)?;
        if self.remaining == 0 {
            if flow == Flow::Continue {
                self.downstream.on_completed();
            }
            return Ok(Flow::Stop);
        }
        Ok(flow)
    }

    forward_terminals!();
}

struct SkipObserver<T> {
    downstream: BoxObserver<T>,
    remaining: usize,
}

impl<T: Element> Observer<T> for SkipObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(Flow::Continue);
        }
        self.downstream.on_next(value, token)
    }

    forward_terminals!();
}

struct TakeWhileObserver<T, F> {
    downstream: BoxObserver<T>,
    predicate: Arc<F>,
}

impl<T, F> Observer<T> for TakeWhileObserver<T, F>
where
    T: Element,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        if (self.predicate)(&value) {
            self.downstream.on_next(value, token)
        } else {
            self.downstream.on_completed();
            Ok(Flow::Stop)
        }
    }

    forward_terminals!();
}

struct DistinctObserver<T> {
    downstream: BoxObserver<T>,
    seen: HashSet<T>,
}

impl<T> Observer<T> for DistinctObserver<T>
where
    T: Element + Clone + Hash + Eq,
{
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        if self.seen.contains(&value) {
            return Ok(Flow::Continue);
        }
        self.seen.insert(value.clone());
        self.downstream.on_next(value, token)
    }

    forward_terminals!();
}

/// Hands the downstream observer to the second sequence once the first
/// completes.
struct ConcatObserver<T> {
    downstream: Option<BoxObserver<T>>,
    second: Push<T>,
    subscription: Subscription,
}

impl<T: Element> Observer<T> for ConcatObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        match self.downstream.as_mut() {
            Some(downstream) => downstream.on_next(value, token),
            None => Ok(Flow::Stop),
        }
    }

    fn on_error(&mut self, error: SeqError) {
        if let Some(mut downstream) = self.downstream.take() {
            downstream.on_error(error);
        }
    }

    fn on_completed(&mut self) {
        if let Some(downstream) = self.downstream.take() {
            if let Err(e) = self.second.continue_within(downstream, &self.subscription) {
                tracing::debug!(error = %e, "second sequence of concat cancelled before start");
            }
        }
    }
}

impl<T: Element> Push<T> {
    pub fn try_map<U, F>(&self, f: F) -> Push<U>
    where
        U: Element,
        F: Fn(&T) -> Result<U> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |downstream, _| {
            Box::new(MapObserver {
                downstream,
                f: f.clone(),
                _marker: PhantomData,
            }) as BoxObserver<T>
        })
    }

    pub fn map<U, F>(&self, f: F) -> Push<U>
    where
        U: Element,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    pub fn filter<F>(&self, predicate: F) -> Push<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(move |value: &T| -> Result<bool> { Ok(predicate(value)) });
        self.lift(move |downstream, _| {
            Box::new(FilterObserver {
                downstream,
                predicate: predicate.clone(),
            }) as BoxObserver<T>
        })
    }

    /// Run `f` on each value as it passes through.
    pub fn inspect<F>(&self, f: F) -> Push<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.filter(move |value| {
            f(value);
            true
        })
    }

    /// The first `count` values, then completion. The upstream is told to
    /// stop right after the last one.
    pub fn take(&self, count: usize) -> Push<T> {
        if count == 0 {
            return Push::empty();
        }
        self.lift(move |downstream, _| {
            Box::new(TakeObserver {
                downstream,
                remaining: count,
            }) as BoxObserver<T>
        })
    }

    pub fn skip(&self, count: usize) -> Push<T> {
        self.lift(move |downstream, _| {
            Box::new(SkipObserver {
                downstream,
                remaining: count,
            }) as BoxObserver<T>
        })
    }

    pub fn take_while<F>(&self, predicate: F) -> Push<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.lift(move |downstream, _| {
            Box::new(TakeWhileObserver {
                downstream,
                predicate: predicate.clone(),
            }) as BoxObserver<T>
        })
    }

    /// All values of `self`, then all values of `other`.
    pub fn concat(&self, other: &Push<T>) -> Push<T> {
        let second = other.clone();
        self.lift(move |downstream, subscription| {
            Box::new(ConcatObserver {
                downstream: Some(downstream),
                second: second.clone(),
                subscription: subscription.clone(),
            }) as BoxObserver<T>
        })
    }
}

impl<T> Push<T>
where
    T: Element + Clone + Hash + Eq,
{
    /// Drop repeated values, keeping the first occurrence.
    pub fn distinct(&self) -> Push<T> {
        self.lift(|downstream, _| {
            Box::new(DistinctObserver {
                downstream,
                seen: HashSet::new(),
            }) as BoxObserver<T>
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::testing::{Event, Recorder};
    use std::time::Duration;

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_map_filter_skip() {
        let values = Push::range(1, 10)
            .skip(2)
            .filter(|x| x % 2 == 1)
            .map(|x| x * 100)
            .to_vec(&token())
            .unwrap();
        assert_eq!(values, vec![300, 500, 700, 900]);
    }

    #[test]
    fn test_try_map_fault_reaches_observer_once() {
        let (recorder, events) = Recorder::new();
        Push::from_vec(vec![1, 2, 3])
            .try_map(|x| {
                if *x == 2 {
                    Err(SeqError::msg("cannot map 2"))
                } else {
                    Ok(*x)
                }
            })
            .subscribe(recorder, &token())
            .unwrap();
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Next(1));
        assert!(matches!(&events[1], Event::Error(msg) if msg.contains("cannot map 2")));
    }

    #[test]
    fn test_take_completes_and_stops_upstream() {
        let (recorder, events) = Recorder::new();
        Push::range(0, 1_000).take(2).subscribe(recorder, &token()).unwrap();
        assert_eq!(
            *events.lock(),
            vec![Event::Next(0), Event::Next(1), Event::Completed]
        );
        assert!(Push::range(0, 5).take(0).to_vec(&token()).unwrap().is_empty());
    }

    #[test]
    fn test_take_while_and_distinct() {
        let values = Push::from_vec(vec![1, 1, 2, 3, 2, 9, 1])
            .take_while(|x| *x < 5)
            .distinct()
            .to_vec(&token())
            .unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_concat_runs_second_after_first() {
        let first = Push::from_vec(vec![1, 2]);
        let second = Push::from_vec(vec![3]);
        assert_eq!(first.concat(&second).to_vec(&token()).unwrap(), vec![1, 2, 3]);

        let failed = Push::fail(SeqError::msg("first failed")).concat(&second);
        assert!(failed.to_vec(&token()).is_err());
    }

    #[test]
    fn test_concat_second_start_failure_terminates() {
        let broken = Push::<i32>::from_fn(|_, _| Err(SeqError::msg("could not start")));
        let err = Push::from_vec(vec![1]).concat(&broken).to_vec(&token()).unwrap_err();
        assert!(err.to_string().contains("could not start"));
    }

    #[test]
    fn test_concat_of_live_sequences() {
        let ticks = Push::interval(Duration::from_millis(1));
        let both = ticks.take(2).concat(&ticks.take(2).map(|t| t + 10));
        assert_eq!(both.to_vec(&token()).unwrap(), vec![0, 1, 10, 11]);
    }

    #[test]
    fn test_inspect_sees_every_value() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let values = Push::from_vec(vec!['x', 'y'])
            .inspect(move |c| sink.lock().push(*c))
            .to_vec(&token())
            .unwrap();
        assert_eq!(values, vec!['x', 'y']);
        assert_eq!(*seen.lock(), vec!['x', 'y']);
    }
}
