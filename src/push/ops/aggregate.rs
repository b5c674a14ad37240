//! Terminal push operators: subscribe, wait for the end, reduce.

use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use crate::pull::Element;
use crate::push::{Flow, Observer, Push, Subscription};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;

type Outcome<A> = Arc<Mutex<Option<Result<A>>>>;

/// Folds values into an accumulator and records how the sequence ended.
pub(crate) struct AggregateObserver<T, A, F> {
    acc: Option<A>,
    step: F,
    outcome: Outcome<A>,
    _marker: PhantomData<fn(T)>,
}

impl<T, A, F> AggregateObserver<T, A, F> {
    fn finish(&mut self, result: Result<()>) {
        let mut outcome = self.outcome.lock();
        if outcome.is_some() {
            return;
        }
        *outcome = Some(match result {
            Ok(()) => self
                .acc
                .take()
                .ok_or_else(|| SeqError::protocol("aggregate finished twice")),
            Err(e) => Err(e),
        });
    }
}

impl<T, A, F> Observer<T> for AggregateObserver<T, A, F>
where
    A: Send,
    F: FnMut(&mut A, T) -> Result<Flow> + Send,
{
    fn on_next(&mut self, value: T, _token: &CancellationToken) -> Result<Flow> {
        let acc = match self.acc.as_mut() {
            Some(acc) => acc,
            None => return Ok(Flow::Stop),
        };
        match (self.step)(acc, value)? {
            Flow::Continue => Ok(Flow::Continue),
            Flow::Stop => {
                self.finish(Ok(()));
                Ok(Flow::Stop)
            }
        }
    }

    fn on_error(&mut self, error: SeqError) {
        self.finish(Err(error));
    }

    fn on_completed(&mut self) {
        self.finish(Ok(()));
    }
}

impl<T: Element> Push<T> {
    /// Subscribe, wait until the sequence ends and return the accumulator.
    ///
    /// `step` may end the walk early by returning `Flow::Stop`. A fault from
    /// the sequence or from `step` is returned as the result.
    pub fn aggregate<A, F>(&self, init: A, step: F, token: &CancellationToken) -> Result<A>
    where
        A: Send + 'static,
        F: FnMut(&mut A, T) -> Result<Flow> + Send + 'static,
    {
        let outcome: Outcome<A> = Arc::new(Mutex::new(None));
        let observer = AggregateObserver {
            acc: Some(init),
            step,
            outcome: outcome.clone(),
            _marker: PhantomData,
        };

        let subscription = Subscription::new(token.child());
        self.subscribe_within(Box::new(observer), &subscription)?;
        subscription.join()?;

        let result = outcome.lock().take();
        match result {
            Some(result) => result,
            None => {
                token.check()?;
                Err(SeqError::protocol("sequence ended without a terminal signal"))
            }
        }
    }

    pub fn fold<A, F>(&self, init: A, mut f: F, token: &CancellationToken) -> Result<A>
    where
        A: Send + 'static,
        F: FnMut(A, T) -> Result<A> + Send + 'static,
    {
        self.aggregate(
            Some(init),
            move |acc: &mut Option<A>, value| {
                if let Some(current) = acc.take() {
                    *acc = Some(f(current, value)?);
                }
                Ok(Flow::Continue)
            },
            token,
        )?
        .ok_or_else(|| SeqError::protocol("fold lost its accumulator"))
    }

    pub fn count(&self, token: &CancellationToken) -> Result<usize> {
        self.aggregate(
            0usize,
            |n, _| {
                *n += 1;
                Ok(Flow::Continue)
            },
            token,
        )
    }

    pub fn to_vec(&self, token: &CancellationToken) -> Result<Vec<T>> {
        self.aggregate(
            Vec::new(),
            |items, value| {
                items.push(value);
                Ok(Flow::Continue)
            },
            token,
        )
    }

    /// The first value; the upstream is stopped right after it.
    pub fn first(&self, token: &CancellationToken) -> Result<T> {
        self.aggregate(
            None,
            |first, value| {
                *first = Some(value);
                Ok(Flow::Stop)
            },
            token,
        )?
        .ok_or(SeqError::EmptySequence)
    }

    pub fn last(&self, token: &CancellationToken) -> Result<T> {
        self.aggregate(
            None,
            |last, value| {
                *last = Some(value);
                Ok(Flow::Continue)
            },
            token,
        )?
        .ok_or(SeqError::EmptySequence)
    }
}
