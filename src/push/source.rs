//! Push sequence constructors.

use super::{BoxObserver, Flow, Observer, Push, Subscription};
use crate::config::GeneratorConfig;
use crate::error::{Result, SeqError};
use crate::primitives::{run_guarded, CancellationToken, Task};
use crate::pull::{range_end, Element};
use crossbeam_channel::select;
use std::sync::Arc;
use std::time::Duration;

/// Deliver `items` in order, then complete.
///
/// A failed item or a failing `on_next` terminates the observer with
/// `on_error`; `Flow::Stop` ends delivery silently. Only cancellation is
/// returned as an error.
pub(crate) fn drive<T, I>(
    observer: &mut dyn Observer<T>,
    items: I,
    token: &CancellationToken,
) -> Result<()>
where
    I: IntoIterator<Item = Result<T>>,
{
    for item in items {
        token.check()?;
        let value = match item {
            Ok(value) => value,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                observer.on_error(e);
                return Ok(());
            }
        };
        match observer.on_next(value, token) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => return Ok(()),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                observer.on_error(e);
                return Ok(());
            }
        }
    }
    token.check()?;
    observer.on_completed();
    Ok(())
}

/// Hands values from a [`Push::create`] body to the observer.
pub struct Emitter<'a, T> {
    observer: &'a mut dyn Observer<T>,
    token: &'a CancellationToken,
    stopped: bool,
}

impl<'a, T> Emitter<'a, T> {
    /// Deliver one value.
    ///
    /// Returns `Flow::Stop` once the observer wants nothing more; further
    /// values are dropped. A fault from the observer is returned so the body
    /// can end with it.
    pub fn next(&mut self, value: T) -> Result<Flow> {
        if self.stopped {
            return Ok(Flow::Stop);
        }
        self.token.check()?;
        let flow = self.observer.on_next(value, self.token)?;
        if flow == Flow::Stop {
            self.stopped = true;
        }
        Ok(flow)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn token(&self) -> &CancellationToken {
        self.token
    }
}

impl<T: Element> Push<T> {
    /// Sequence that delivers a shared vector to every subscriber.
    pub fn from_vec(items: Vec<T>) -> Self
    where
        T: Clone,
    {
        let items = Arc::new(items);
        Self::from_fn(move |mut observer, subscription| {
            drive(
                observer.as_mut(),
                items.iter().cloned().map(Ok),
                subscription.token(),
            )
        })
    }

    /// Sequence that walks a fresh clone of `iterable` per subscriber.
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
    {
        Self::from_fn(move |mut observer, subscription| {
            drive(
                observer.as_mut(),
                iterable.clone().into_iter().map(Ok),
                subscription.token(),
            )
        })
    }

    /// Completes immediately.
    pub fn empty() -> Self {
        Self::from_fn(|mut observer, subscription| {
            subscription.token().check()?;
            observer.on_completed();
            Ok(())
        })
    }

    /// Fails every subscriber with `error`.
    pub fn fail(error: SeqError) -> Self {
        Self::from_fn(move |mut observer, subscription| {
            subscription.token().check()?;
            observer.on_error(error.clone());
            Ok(())
        })
    }

    /// Sequence driven by a body written as plain sequential code.
    ///
    /// The body runs on the subscribing thread. Returning `Ok` completes the
    /// subscription and returning an error fails it, unless the observer
    /// stopped first.
    ///
    /// ```
    /// use tidepool::{CancellationToken, Push};
    ///
    /// let squares = Push::create(|emitter| {
    ///     for i in 1..=3 {
    ///         emitter.next(i * i)?;
    ///     }
    ///     Ok(())
    /// });
    /// assert_eq!(squares.to_vec(&CancellationToken::none())?, vec![1, 4, 9]);
    /// # Ok::<(), tidepool::SeqError>(())
    /// ```
    pub fn create<F>(body: F) -> Self
    where
        F: Fn(&mut Emitter<'_, T>) -> Result<()> + Send + Sync + 'static,
    {
        Self::from_fn(move |mut observer, subscription| {
            let token = subscription.token();
            let mut emitter = Emitter {
                observer: observer.as_mut(),
                token,
                stopped: false,
            };
            let outcome = run_guarded(|| body(&mut emitter));
            let stopped = emitter.stopped;

            match outcome {
                Err(e) if e.is_cancelled() => Err(e),
                _ if stopped => Ok(()),
                Ok(()) => {
                    observer.on_completed();
                    Ok(())
                }
                Err(e) => {
                    observer.on_error(e);
                    Ok(())
                }
            }
        })
    }
}

impl Push<i64> {
    /// `count` consecutive integers starting at `start`.
    ///
    /// A range that does not fit in `i64` fails every subscriber.
    pub fn range(start: i64, count: usize) -> Self {
        match range_end(start, count) {
            Ok(end) => Self::from_iter(start..end),
            Err(e) => Self::fail(e),
        }
    }
}

impl Push<u64> {
    /// Ticks 0, 1, 2, ... one per `period`, on a background thread.
    ///
    /// `subscribe` returns at once with a live subscription; the ticks stop
    /// when it is disposed, its token is cancelled or the observer stops.
    pub fn interval(period: Duration) -> Self {
        let config = GeneratorConfig {
            thread_name: "tidepool-interval".to_string(),
            ..GeneratorConfig::default()
        };
        Self::interval_with(config, period)
    }

    pub fn interval_with(config: GeneratorConfig, period: Duration) -> Self {
        Self::from_fn(move |observer, subscription| {
            let token = subscription.token().clone();
            token.check()?;
            let task = Task::spawn(&config, move || {
                run_ticks(observer, period, &token);
                Ok(())
            })?;
            subscription.attach(task);
            Ok(())
        })
    }
}

fn run_ticks(mut observer: BoxObserver<u64>, period: Duration, token: &CancellationToken) {
    let outcome = run_guarded(|| {
        let mut tick = 0u64;
        loop {
            select! {
                recv(token.receiver()) -> _ => return Ok(()),
                default(period) => {}
            }
            match observer.on_next(tick, token)? {
                Flow::Continue => tick += 1,
                Flow::Stop => return Ok(()),
            }
        }
    });

    match outcome {
        Ok(()) => {}
        Err(e) if e.is_cancelled() || token.is_cancelled() => {
            tracing::debug!("interval cancelled");
        }
        Err(e) => observer.on_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::testing::{Event, Recorder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_from_vec_delivers_then_completes() {
        let (recorder, events) = Recorder::new();
        let subscription = Push::from_vec(vec!['a', 'b'])
            .subscribe(recorder, &token())
            .unwrap();
        assert!(!subscription.is_live());
        assert_eq!(
            *events.lock(),
            vec![Event::Next('a'), Event::Next('b'), Event::Completed]
        );
    }

    #[test]
    fn test_next_fault_terminates_once() {
        let (mut recorder, events) = Recorder::new();
        recorder.fail_on = Some(2);
        Push::from_vec(vec![1, 2, 3]).subscribe(recorder, &token()).unwrap();
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Next(1));
        assert!(matches!(events[1], Event::Error(_)));
    }

    #[test]
    fn test_empty_and_fail() {
        let (recorder, events) = Recorder::<i32>::new();
        Push::empty().subscribe(recorder, &token()).unwrap();
        assert_eq!(*events.lock(), vec![Event::Completed]);

        let (recorder, events) = Recorder::<i32>::new();
        Push::fail(SeqError::msg("nope")).subscribe(recorder, &token()).unwrap();
        assert_eq!(
            *events.lock(),
            vec![Event::Error("Producer fault: nope".to_string())]
        );
    }

    #[test]
    fn test_range_overflow_fails_subscriber() {
        let (recorder, events) = Recorder::new();
        Push::range(0, usize::MAX).subscribe(recorder, &token()).unwrap();
        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Error(msg) if msg.contains("overflows")));
    }

    #[test]
    fn test_create_runs_per_subscription() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let source = Push::create(move |emitter| {
            counter.fetch_add(1, Ordering::SeqCst);
            emitter.next(1)?;
            emitter.next(2)?;
            Ok(())
        });
        assert_eq!(source.to_vec(&token()).unwrap(), vec![1, 2]);
        assert_eq!(source.to_vec(&token()).unwrap(), vec![1, 2]);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_create_body_error_becomes_on_error() {
        let (recorder, events) = Recorder::new();
        Push::create(|emitter| {
            emitter.next(1)?;
            Err(SeqError::msg("body failed"))
        })
        .subscribe(recorder, &token())
        .unwrap();
        let events = events.lock();
        assert_eq!(events[0], Event::Next(1));
        assert!(matches!(&events[1], Event::Error(msg) if msg.contains("body failed")));
    }

    #[test]
    fn test_create_stops_after_flow_stop() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        let source = Push::create(move |emitter| {
            for i in 0..100 {
                if emitter.next(i)? == Flow::Stop {
                    break;
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        });
        assert_eq!(source.take(3).to_vec(&token()).unwrap(), vec![0, 1, 2]);
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_interval_ticks_until_disposed() {
        let (recorder, events) = Recorder::new();
        let subscription = Push::interval(Duration::from_millis(5))
            .subscribe(recorder, &token())
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while events.lock().len() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(subscription.dispose());
        subscription.join().unwrap();

        let events = events.lock().clone();
        assert!(events.len() >= 3);
        assert_eq!(&events[..3], &[Event::Next(0), Event::Next(1), Event::Next(2)]);
        assert!(!events.contains(&Event::Completed));
    }

    #[test]
    fn test_interval_take_completes() {
        let ticks = Push::interval(Duration::from_millis(1))
            .take(4)
            .to_vec(&token())
            .unwrap();
        assert_eq!(ticks, vec![0, 1, 2, 3]);
    }
}
