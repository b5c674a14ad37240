//! Push sequences: the producer delivers values and the observer reacts.
//!
//! A [`Push`] is a shareable handle to a producer. Each subscription is an
//! independent registration: the producer runs once per subscribe and talks
//! to exactly one observer.
//!
//! Observers return a [`Flow`] from every `on_next`:
//! - `Ok(Flow::Continue)`: keep producing
//! - `Ok(Flow::Stop)`: the observer is done; send nothing more, not even a
//!   terminal signal
//! - `Err(fault)`: the value could not be handled; the producer terminates
//!   the observer with `on_error(fault)` (cancellation is propagated instead)
//!
//! # Example
//!
//! ```
//! use tidepool::{CancellationToken, Push};
//!
//! let token = CancellationToken::none();
//! let evens = Push::range(0, 10).filter(|x| x % 2 == 0).map(|x| x * 10);
//! assert_eq!(evens.to_vec(&token)?, vec![0, 20, 40, 60, 80]);
//! # Ok::<(), tidepool::SeqError>(())
//! ```

mod bridge;
pub mod ops;
mod source;
mod subscription;

pub use source::Emitter;
pub use subscription::{SafeObserver, Subscription, SubscriptionId};

use crate::error::{Result, SeqError};
use crate::primitives::{run_guarded, CancellationToken};
use crate::pull::Element;
use std::fmt;
use std::sync::Arc;

/// Outcome of delivering one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receiver of push notifications.
///
/// A well-behaved producer calls `on_next` any number of times, then at most
/// one of `on_error` / `on_completed`, and nothing after a `Flow::Stop`.
pub trait Observer<T>: Send {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow>;

    fn on_error(&mut self, error: SeqError);

    fn on_completed(&mut self);
}

pub type BoxObserver<T> = Box<dyn Observer<T>>;

impl<T> Observer<T> for BoxObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        (**self).on_next(value, token)
    }

    fn on_error(&mut self, error: SeqError) {
        (**self).on_error(error)
    }

    fn on_completed(&mut self) {
        (**self).on_completed()
    }
}

/// An observer assembled from three closures.
pub struct FnObserver<N, E, C> {
    next: N,
    error: E,
    completed: C,
}

impl<N, E, C> FnObserver<N, E, C> {
    pub fn new(next: N, error: E, completed: C) -> Self {
        Self {
            next,
            error,
            completed,
        }
    }
}

impl<T, N, E, C> Observer<T> for FnObserver<N, E, C>
where
    N: FnMut(T) -> Result<Flow> + Send,
    E: FnMut(SeqError) + Send,
    C: FnMut() + Send,
{
    fn on_next(&mut self, value: T, _token: &CancellationToken) -> Result<Flow> {
        (self.next)(value)
    }

    fn on_error(&mut self, error: SeqError) {
        (self.error)(error)
    }

    fn on_completed(&mut self) {
        (self.completed)()
    }
}

/// A producer that can be subscribed to many times.
///
/// `subscribe` runs the producer for one observer. Short-lived producers
/// deliver everything before returning; long-lived ones attach their
/// background work to `subscription` and return immediately. An `Err` return
/// means the producer could not start; cancellation is reported as
/// [`SeqError::Cancelled`].
pub trait PushSource: Send + Sync {
    type Item;

    fn subscribe(&self, observer: BoxObserver<Self::Item>, subscription: &Subscription)
        -> Result<()>;
}

/// Source built from a subscribe closure.
struct FnSource<T, F> {
    subscribe: F,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> PushSource for FnSource<T, F>
where
    T: Element,
    F: Fn(BoxObserver<T>, &Subscription) -> Result<()> + Send + Sync,
{
    type Item = T;

    fn subscribe(&self, observer: BoxObserver<T>, subscription: &Subscription) -> Result<()> {
        (self.subscribe)(observer, subscription)
    }
}

/// A push sequence: an immutable, shareable producer of `T` values.
pub struct Push<T> {
    source: Arc<dyn PushSource<Item = T>>,
    trusted: bool,
}

impl<T> Clone for Push<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            trusted: self.trusted,
        }
    }
}

impl<T: Element> Push<T> {
    /// Wrap a custom source. Its observers are always guarded.
    pub fn from_source<S>(source: S) -> Self
    where
        S: PushSource<Item = T> + 'static,
    {
        Self {
            source: Arc::new(source),
            trusted: false,
        }
    }

    /// Build an engine-internal sequence whose source is known to honor the
    /// observer contract.
    pub(crate) fn from_fn<F>(subscribe: F) -> Self
    where
        F: Fn(BoxObserver<T>, &Subscription) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            source: Arc::new(FnSource {
                subscribe,
                _marker: std::marker::PhantomData,
            }),
            trusted: true,
        }
    }

    /// Whether the source was built from engine primitives.
    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    /// Subscribe with full protection.
    ///
    /// The observer sees at most one terminal signal, never overlapping
    /// `on_next` calls and nothing after disposal. Faults raised while the
    /// producer starts or runs go to `on_error`; only cancellation is
    /// returned to the caller.
    pub fn subscribe<O>(&self, observer: O, token: &CancellationToken) -> Result<Subscription>
    where
        O: Observer<T> + 'static,
    {
        let subscription = Subscription::new(token.child());
        tracing::debug!(id = %subscription.id(), trusted = self.trusted, "subscribing");
        self.subscribe_guarded(Box::new(observer), &subscription)?;
        Ok(subscription)
    }

    /// Subscribe without wrapping the observer.
    ///
    /// The caller takes over the guarantees [`subscribe`](Self::subscribe)
    /// would give, and producer errors are returned as they are.
    pub fn subscribe_raw<O>(&self, observer: O, token: &CancellationToken) -> Result<Subscription>
    where
        O: Observer<T> + 'static,
    {
        let subscription = Subscription::new(token.child());
        tracing::debug!(id = %subscription.id(), "subscribing raw");
        self.source.subscribe(Box::new(observer), &subscription)?;
        Ok(subscription)
    }

    /// Subscribe an operator's observer within an existing subscription:
    /// raw for trusted sources, guarded otherwise.
    pub(crate) fn subscribe_within(
        &self,
        observer: BoxObserver<T>,
        subscription: &Subscription,
    ) -> Result<()> {
        if self.trusted {
            self.source.subscribe(observer, subscription)
        } else {
            self.subscribe_guarded(observer, subscription)
        }
    }

    /// Hand `observer` over as the continuation of an earlier sequence.
    ///
    /// The caller has already given the observer up, so a start failure
    /// reaches it as `on_error` instead of being returned.
    pub(crate) fn continue_within(
        &self,
        observer: BoxObserver<T>,
        subscription: &Subscription,
    ) -> Result<()> {
        self.subscribe_guarded(observer, subscription)
    }

    fn subscribe_guarded(&self, observer: BoxObserver<T>, subscription: &Subscription) -> Result<()> {
        let safe = SafeObserver::new(observer);
        let guard = safe.clone();
        subscription.on_dispose(move || {
            guard.stop();
        });

        match run_guarded(|| self.source.subscribe(Box::new(safe.clone()), subscription)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => {
                safe.stop();
                Err(e)
            }
            Err(e) => {
                tracing::debug!(id = %subscription.id(), error = %e, "producer failed to start");
                let mut safe = safe;
                safe.on_error(e);
                Ok(())
            }
        }
    }
}

impl<T> fmt::Debug for Push<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("trusted", &self.trusted)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{Event, Recorder};
    use super::*;

    struct Misbehaving;

    impl PushSource for Misbehaving {
        type Item = i32;

        fn subscribe(&self, mut observer: BoxObserver<i32>, subscription: &Subscription) -> Result<()> {
            let token = subscription.token();
            observer.on_next(1, token)?;
            observer.on_completed();
            observer.on_next(2, token)?;
            observer.on_error(SeqError::msg("late"));
            observer.on_completed();
            Ok(())
        }
    }

    struct Panicking;

    impl PushSource for Panicking {
        type Item = i32;

        fn subscribe(&self, _observer: BoxObserver<i32>, _subscription: &Subscription) -> Result<()> {
            panic!("producer exploded");
        }
    }

    #[test]
    fn test_custom_sources_are_untrusted() {
        assert!(!Push::from_source(Misbehaving).is_trusted());
        assert!(Push::from_vec(vec![1]).is_trusted());
        assert!(Push::from_vec(vec![1]).map(|x| x + 1).is_trusted());
    }

    #[test]
    fn test_safe_subscribe_enforces_single_terminal() {
        let (recorder, events) = Recorder::new();
        Push::from_source(Misbehaving)
            .subscribe(recorder, &CancellationToken::none())
            .unwrap();
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Completed]);
    }

    #[test]
    fn test_operator_over_untrusted_source_is_guarded() {
        let values = Push::from_source(Misbehaving)
            .map(|x| x * 10)
            .to_vec(&CancellationToken::none())
            .unwrap();
        assert_eq!(values, vec![10]);
    }

    #[test]
    fn test_producer_panic_goes_to_on_error() {
        let (recorder, events) = Recorder::new();
        Push::from_source(Panicking)
            .subscribe(recorder, &CancellationToken::none())
            .unwrap();
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Error(msg) if msg.contains("producer exploded")));
    }

    #[test]
    fn test_cancelled_subscribe_propagates() {
        let token = CancellationToken::new();
        token.cancel();
        let (recorder, events) = Recorder::new();
        let result = Push::from_vec(vec![1, 2]).subscribe(recorder, &token);
        assert!(matches!(result, Err(SeqError::Cancelled)));
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_fn_observer() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = FnObserver::new(
            move |x: i64| {
                sink.lock().push(x);
                Ok(Flow::Continue)
            },
            |_: SeqError| {},
            || {},
        );
        Push::range(1, 3)
            .subscribe(observer, &CancellationToken::none())
            .unwrap();
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }
}
