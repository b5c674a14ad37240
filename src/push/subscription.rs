//! Subscription handles and the guarded observer wrapper.

use super::{BoxObserver, Flow, Observer};
use crate::error::{Result, SeqError};
use crate::primitives::{CancellationToken, StopFlag, Task};
use crate::pull::Element;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Disposer = Box<dyn FnOnce() + Send>;

struct SubscriptionInner {
    id: SubscriptionId,
    /// Cancelled on dispose; linked to the token passed to subscribe.
    token: CancellationToken,
    disposed: StopFlag,
    disposers: Mutex<Vec<Disposer>>,
    /// Background producers (timers) feeding this subscription.
    tasks: Mutex<Vec<Task<()>>>,
}

/// Handle to one registration against a push sequence.
///
/// Clones refer to the same registration. Dropping a handle does not dispose
/// it: a long-lived producer keeps running until it ends, is disposed or its
/// token is cancelled.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                id: SubscriptionId(NEXT_ID.fetch_add(1, Ordering::SeqCst)),
                token,
                disposed: StopFlag::new(),
                disposers: Mutex::new(Vec::new()),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.inner.id
    }

    /// Token observed by every producer feeding this subscription.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Cancel the producers, stop the observer and release resources.
    ///
    /// Returns true for the call that did the work; later calls are no-ops.
    pub fn dispose(&self) -> bool {
        if !self.inner.disposed.try_stop() {
            tracing::trace!(id = %self.inner.id, "subscription already disposed");
            return false;
        }

        tracing::debug!(id = %self.inner.id, "disposing subscription");
        self.inner.token.cancel();
        let disposers = std::mem::take(&mut *self.inner.disposers.lock());
        for disposer in disposers {
            disposer();
        }
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.is_stopped()
    }

    /// Run `disposer` when the subscription is disposed, immediately if it
    /// already was.
    pub fn on_dispose<F>(&self, disposer: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut disposers = self.inner.disposers.lock();
        if self.is_disposed() {
            drop(disposers);
            disposer();
            return;
        }
        disposers.push(Box::new(disposer));
    }

    pub(crate) fn attach(&self, task: Task<()>) {
        self.inner.tasks.lock().push(task);
    }

    /// Whether background producers may still deliver notifications.
    pub fn is_live(&self) -> bool {
        self.inner.tasks.lock().iter().any(|task| !task.is_finished())
    }

    /// Wait until every background producer has ended.
    ///
    /// Producers attached while waiting (a second timer started by a `concat`)
    /// are waited for too. Returns immediately for short-lived producers.
    pub fn join(&self) -> Result<()> {
        loop {
            let next = self.inner.tasks.lock().pop();
            match next {
                Some(task) => task.join()?,
                None => return Ok(()),
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

enum Terminal {
    Error(SeqError),
    Completed,
}

fn deliver<T>(observer: &mut dyn Observer<T>, terminal: Terminal) {
    match terminal {
        Terminal::Error(e) => observer.on_error(e),
        Terminal::Completed => observer.on_completed(),
    }
}

struct SafeInner<T> {
    observer: ReentrantMutex<RefCell<BoxObserver<T>>>,
    stopped: StopFlag,
    /// Terminal raised from inside `on_next`, delivered once it returns.
    deferred: Mutex<Option<Terminal>>,
}

/// Observer wrapper that enforces the notification contract.
///
/// - `on_next` calls never overlap; a re-entrant one is a protocol violation
/// - the first terminal signal wins and later ones are dropped
/// - a terminal raised from inside `on_next` is held until it returns
/// - a fault returned by the wrapped `on_next` becomes its `on_error`
/// - nothing is delivered once stopped
pub struct SafeObserver<T> {
    inner: Arc<SafeInner<T>>,
}

impl<T> Clone for SafeObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Element> SafeObserver<T> {
    pub fn new(observer: BoxObserver<T>) -> Self {
        Self {
            inner: Arc::new(SafeInner {
                observer: ReentrantMutex::new(RefCell::new(observer)),
                stopped: StopFlag::new(),
                deferred: Mutex::new(None),
            }),
        }
    }

    /// Stop delivering without a terminal signal. True if this call stopped it.
    pub fn stop(&self) -> bool {
        self.inner.stopped.try_stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.is_stopped()
    }

    fn terminate(&self, terminal: Terminal) {
        if !self.inner.stopped.try_stop() {
            tracing::trace!("terminal signal after stop ignored");
            return;
        }

        let guard = self.inner.observer.lock();
        let borrowed = guard.try_borrow_mut();
        match borrowed {
            Ok(mut observer) => deliver(&mut **observer, terminal),
            Err(_) => {
                tracing::trace!("deferring terminal signal raised inside on_next");
                *self.inner.deferred.lock() = Some(terminal);
            }
        }
    }
}

impl<T: Element> Observer<T> for SafeObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        if self.inner.stopped.is_stopped() {
            return Ok(Flow::Stop);
        }

        let guard = self.inner.observer.lock();
        // A terminal may have won the race for the lock.
        if self.inner.stopped.is_stopped() {
            return Ok(Flow::Stop);
        }
        let mut observer = match guard.try_borrow_mut() {
            Ok(observer) => observer,
            Err(_) => {
                tracing::warn!("re-entrant on_next on one subscription");
                return Err(SeqError::protocol(
                    "on_next called from inside on_next of the same subscription",
                ));
            }
        };

        let outcome = observer.on_next(value, token);

        let deferred = self.inner.deferred.lock().take();
        if let Some(terminal) = deferred {
            deliver(&mut **observer, terminal);
            return Ok(Flow::Stop);
        }

        match outcome {
            Ok(Flow::Continue) if !self.inner.stopped.is_stopped() => Ok(Flow::Continue),
            Ok(_) => {
                self.inner.stopped.try_stop();
                Ok(Flow::Stop)
            }
            Err(e) if e.is_cancelled() => {
                self.inner.stopped.try_stop();
                Err(e)
            }
            Err(e) => {
                if self.inner.stopped.try_stop() {
                    tracing::debug!(error = %e, "observer failed, terminating");
                    observer.on_error(e);
                }
                Ok(Flow::Stop)
            }
        }
    }

    fn on_error(&mut self, error: SeqError) {
        self.terminate(Terminal::Error(error));
    }

    fn on_completed(&mut self) {
        self.terminate(Terminal::Completed);
    }
}

impl<T> fmt::Debug for SafeObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeObserver")
            .field("stopped", &self.inner.stopped.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::testing::{Event, Recorder};
    use std::sync::atomic::AtomicUsize;

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let subscription = Subscription::new(CancellationToken::new());
        let cancels = Arc::new(AtomicUsize::new(0));
        let counter = cancels.clone();
        subscription.token().register(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        subscription.on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(subscription.dispose());
        assert!(!subscription.dispose());
        assert!(subscription.is_disposed());
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_dispose_after_dispose_runs_immediately() {
        let subscription = Subscription::new(CancellationToken::new());
        subscription.dispose();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        subscription.on_dispose(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Subscription::new(token());
        let b = Subscription::new(token());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_first_terminal_wins() {
        let (recorder, events) = Recorder::<i32>::new();
        let mut safe = SafeObserver::new(Box::new(recorder));
        safe.on_next(1, &token()).unwrap();
        safe.on_completed();
        safe.on_error(SeqError::msg("late"));
        safe.on_completed();
        assert_eq!(safe.on_next(2, &token()).unwrap(), Flow::Stop);
        assert_eq!(*events.lock(), vec![Event::Next(1), Event::Completed]);
    }

    #[test]
    fn test_failing_on_next_becomes_on_error() {
        let (mut recorder, events) = Recorder::new();
        recorder.fail_on = Some(2);
        let mut safe = SafeObserver::new(Box::new(recorder));
        assert_eq!(safe.on_next(1, &token()).unwrap(), Flow::Continue);
        assert_eq!(safe.on_next(2, &token()).unwrap(), Flow::Stop);
        assert_eq!(safe.on_next(3, &token()).unwrap(), Flow::Stop);
        safe.on_completed();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Next(1));
        assert!(matches!(&events[1], Event::Error(msg) if msg.contains("rejected")));
    }

    /// Calls back into the safe observer that wraps it.
    struct Reentrant {
        outer: Arc<Mutex<Option<SafeObserver<i32>>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Observer<i32> for Reentrant {
        fn on_next(&mut self, value: i32, token: &CancellationToken) -> Result<Flow> {
            let outer = self.outer.lock().clone();
            if let Some(mut outer) = outer {
                match value {
                    1 => {
                        let nested = outer.on_next(99, token);
                        self.log.lock().push(format!("nested: {}", nested.is_err()));
                    }
                    2 => outer.on_error(SeqError::msg("raised inside")),
                    _ => {}
                }
            }
            self.log.lock().push(format!("next {}", value));
            Ok(Flow::Continue)
        }

        fn on_error(&mut self, error: SeqError) {
            self.log.lock().push(format!("error {}", error));
        }

        fn on_completed(&mut self) {
            self.log.lock().push("completed".to_string());
        }
    }

    #[test]
    fn test_reentrant_calls() {
        let outer = Arc::new(Mutex::new(None));
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut safe = SafeObserver::new(Box::new(Reentrant {
            outer: outer.clone(),
            log: log.clone(),
        }));
        *outer.lock() = Some(safe.clone());

        assert_eq!(safe.on_next(1, &token()).unwrap(), Flow::Continue);
        assert_eq!(safe.on_next(2, &token()).unwrap(), Flow::Stop);
        safe.on_completed();

        assert_eq!(
            *log.lock(),
            vec![
                "nested: true".to_string(),
                "next 1".to_string(),
                "next 2".to_string(),
                "error Producer fault: raised inside".to_string(),
            ]
        );
    }

    #[test]
    fn test_terminal_winning_the_lock_blocks_pending_next() {
        let (recorder, events) = Recorder::<i32>::new();
        let safe = SafeObserver::new(Box::new(recorder));

        // Hold the delivery lock so both callers queue up behind it.
        let guard = safe.inner.observer.lock();
        let mut producer = safe.clone();
        let next = std::thread::spawn(move || producer.on_next(1, &CancellationToken::none()));
        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut finisher = safe.clone();
        let completed = std::thread::spawn(move || finisher.on_completed());
        while !safe.is_stopped() {
            std::thread::yield_now();
        }
        drop(guard);

        let flow = next.join().unwrap().unwrap();
        completed.join().unwrap();
        assert_eq!(flow, Flow::Stop);
        assert_eq!(*events.lock(), vec![Event::Completed]);
    }

    #[test]
    fn test_stop_suppresses_terminal() {
        let (recorder, events) = Recorder::<i32>::new();
        let mut safe = SafeObserver::new(Box::new(recorder));
        assert!(safe.stop());
        assert!(!safe.stop());
        safe.on_completed();
        assert!(events.lock().is_empty());
    }
}
