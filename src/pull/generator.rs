//! The yield engine: sequential producer code driven by a pull consumer.
//!
//! A producer body is an ordinary closure that calls [`Yielder::emit`] for
//! each value. The body runs on its own thread, and every emit parks it until
//! the consumer asks for the next value. The park/resume handshake uses two
//! single-slot channels:
//!
//! - `ready` (producer -> consumer) carries one [`Step`]
//! - `go` (consumer -> producer) releases the parked emit
//!
//! Only one value can ever be in flight. An emit attempted while a previous
//! value is still pending is rejected as a protocol violation rather than
//! queued.

use super::{no_current, BoxSession, Element, Pull, PullSource, Session};
use crate::config::GeneratorConfig;
use crate::error::{Result, SeqError};
use crate::primitives::{run_guarded, CancellationToken, Task};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Producer body signature.
pub(crate) type Body<T> = dyn Fn(&Yielder<T>, &CancellationToken) -> Result<()> + Send + Sync;

/// One message from producer to consumer.
enum Step<T> {
    Value(T),
    Done,
    Fault(SeqError),
}

enum Sink<T> {
    Handshake {
        ready: Sender<Step<T>>,
        go: Receiver<()>,
        /// True between an emit and the consumer's next advance.
        pending: Arc<Mutex<bool>>,
    },
    Collect(Arc<Mutex<Vec<T>>>),
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        match self {
            Sink::Handshake { ready, go, pending } => Sink::Handshake {
                ready: ready.clone(),
                go: go.clone(),
                pending: pending.clone(),
            },
            Sink::Collect(items) => Sink::Collect(items.clone()),
        }
    }
}

/// The emit-capable sink handed to a producer body.
///
/// Clones share the same handshake, so a body may pass the yielder into
/// callbacks or helper threads; the single-flight rule still holds across
/// all clones.
pub struct Yielder<T> {
    sink: Sink<T>,
    token: CancellationToken,
}

impl<T> Clone for Yielder<T> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T: Element> Yielder<T> {
    /// A yielder that appends into `items` without any handshake.
    pub(crate) fn collecting(items: Arc<Mutex<Vec<T>>>, token: CancellationToken) -> Self {
        Self {
            sink: Sink::Collect(items),
            token,
        }
    }

    /// Hand `value` to the consumer and wait until it asks for the next one.
    ///
    /// Returns `Err(Cancelled)` if the walk was cancelled or abandoned while
    /// waiting; the body should return that error promptly.
    pub fn emit(&self, value: T) -> Result<()> {
        self.token.check()?;

        match &self.sink {
            Sink::Collect(items) => {
                items.lock().push(value);
                Ok(())
            }
            Sink::Handshake { ready, go, pending } => {
                {
                    let mut pending = pending.lock();
                    if *pending {
                        tracing::warn!("emit while a previous value is still pending");
                        return Err(SeqError::protocol(
                            "emit called while a previous value is still pending",
                        ));
                    }
                    match ready.try_send(Step::Value(value)) {
                        Ok(()) => *pending = true,
                        Err(TrySendError::Full(_)) => {
                            return Err(SeqError::protocol("value slot already occupied"));
                        }
                        Err(TrySendError::Disconnected(_)) => return Err(SeqError::Cancelled),
                    }
                }
                tracing::trace!("producer parked");

                select! {
                    recv(go) -> msg => match msg {
                        Ok(()) => {
                            *pending.lock() = false;
                            self.token.check()
                        }
                        Err(_) => Err(SeqError::Cancelled),
                    },
                    recv(self.token.receiver()) -> _ => Err(SeqError::Cancelled),
                }
            }
        }
    }

    /// Emit every value of `values` in order.
    pub fn emit_all<I>(&self, values: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
    {
        for value in values {
            self.emit(value)?;
        }
        Ok(())
    }

    /// The producer's cancellation signal.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True while an emitted value waits for the consumer.
    pub fn is_pending(&self) -> bool {
        match &self.sink {
            Sink::Handshake { pending, .. } => *pending.lock(),
            Sink::Collect(_) => false,
        }
    }
}

enum GenState<T> {
    NotStarted,
    Running {
        go: Sender<()>,
        ready: Receiver<Step<T>>,
        task: Option<Task<()>>,
    },
    Finished,
    Failed(SeqError),
}

/// One walk over a generator.
pub(crate) struct GeneratorSession<T> {
    body: Arc<Body<T>>,
    config: Arc<GeneratorConfig>,
    /// Cancelled when the consumer gives up on this walk.
    abandon: CancellationToken,
    state: GenState<T>,
    current: Option<T>,
}

impl<T: Element> GeneratorSession<T> {
    fn new(body: Arc<Body<T>>, config: Arc<GeneratorConfig>) -> Self {
        Self {
            body,
            config,
            abandon: CancellationToken::new(),
            state: GenState::NotStarted,
            current: None,
        }
    }

    fn start(&mut self, token: &CancellationToken) -> Result<()> {
        let (go_tx, go_rx) = bounded(1);
        let (ready_tx, ready_rx) = bounded(1);
        let producer_token = CancellationToken::linked(token, &self.abandon);
        let yielder = Yielder {
            sink: Sink::Handshake {
                ready: ready_tx.clone(),
                go: go_rx,
                pending: Arc::new(Mutex::new(false)),
            },
            token: producer_token.clone(),
        };
        let body = self.body.clone();

        let task = Task::spawn(&self.config, move || {
            tracing::debug!("producer started");
            let step = match run_guarded(|| body(&yielder, &producer_token)) {
                Ok(()) => Step::Done,
                Err(e) => Step::Fault(e),
            };
            drop(yielder);

            // The slot may still hold a value emitted by a helper clone;
            // wait for the consumer to take it unless the walk is abandoned.
            select! {
                send(ready_tx, step) -> _ => {},
                recv(producer_token.receiver()) -> _ => {},
            }
            tracing::debug!("producer finished");
            Ok(())
        })?;

        self.state = GenState::Running {
            go: go_tx,
            ready: ready_rx,
            task: Some(task),
        };
        Ok(())
    }

    fn fail(&mut self, error: SeqError) -> Result<bool> {
        self.abandon.cancel();
        self.current = None;
        self.state = GenState::Failed(error.clone());
        Err(error)
    }

    fn finish(&mut self) -> Result<bool> {
        self.current = None;
        if let GenState::Running { task, .. } = &mut self.state {
            if let Some(task) = task.take() {
                // The producer is past its final send; reclaim the thread.
                if let Err(e) = task.join() {
                    tracing::warn!(error = %e, "producer thread ended abnormally");
                }
            }
        }
        self.state = GenState::Finished;
        Ok(false)
    }
}

impl<T: Element> Session for GeneratorSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        match &self.state {
            GenState::Finished => return Ok(false),
            GenState::Failed(e) => return Err(e.clone()),
            GenState::NotStarted | GenState::Running { .. } => {}
        }

        if token.is_cancelled() {
            return self.fail(SeqError::Cancelled);
        }

        if let GenState::NotStarted = self.state {
            if let Err(e) = self.start(token) {
                return self.fail(e);
            }
        } else {
            let resumed = match &self.state {
                GenState::Running { go, .. } => go.try_send(()),
                _ => Ok(()),
            };
            match resumed {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    return self.fail(SeqError::protocol(
                        "advance issued while a previous resume is outstanding",
                    ));
                }
                // Producer already returned; its terminal step is in `ready`.
                Err(TrySendError::Disconnected(_)) => {}
            }
        }

        self.current = None;
        let ready = match &self.state {
            GenState::Running { ready, .. } => ready.clone(),
            _ => return self.fail(SeqError::protocol("generator is not running")),
        };
        let step = select! {
            recv(ready) -> step => step.ok(),
            recv(token.receiver()) -> _ => return self.fail(SeqError::Cancelled),
        };

        match step {
            Some(Step::Value(value)) => {
                tracing::trace!("producer emitted");
                self.current = Some(value);
                Ok(true)
            }
            Some(Step::Done) => self.finish(),
            Some(Step::Fault(e)) => self.fail(e),
            // The producer only exits silently once its token was cancelled.
            None => self.fail(SeqError::Cancelled),
        }
    }

    fn current(&self) -> Result<&T> {
        self.current.as_ref().ok_or_else(no_current)
    }

    fn dispose(&mut self) {
        self.abandon.cancel();
        self.current = None;
        if !matches!(self.state, GenState::Failed(_)) {
            self.state = GenState::Finished;
        }
    }
}

impl<T> Drop for GeneratorSession<T> {
    fn drop(&mut self) {
        self.abandon.cancel();
    }
}

/// A pull source backed by a producer body.
pub struct Generate<T> {
    body: Arc<Body<T>>,
    config: Arc<GeneratorConfig>,
}

impl<T: Element> Generate<T> {
    pub fn new<F>(config: GeneratorConfig, body: F) -> Self
    where
        F: Fn(&Yielder<T>, &CancellationToken) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            body: Arc::new(body),
            config: Arc::new(config),
        }
    }

    /// Run the body to completion on the calling thread, collecting every
    /// emitted value. No handshake and no producer thread are involved.
    pub fn collect(&self, token: &CancellationToken) -> Result<Vec<T>> {
        let items = Arc::new(Mutex::new(Vec::new()));
        let yielder = Yielder::collecting(items.clone(), token.clone());
        run_guarded(|| (self.body)(&yielder, token))?;
        drop(yielder);
        let collected = std::mem::take(&mut *items.lock());
        Ok(collected)
    }
}

impl<T: Element> PullSource for Generate<T> {
    type Item = T;

    fn open(&self) -> BoxSession<T> {
        Box::new(GeneratorSession::new(self.body.clone(), self.config.clone()))
    }
}

impl<T: Element> Pull<T> {
    /// Pull sequence driven by a producer body.
    ///
    /// ```
    /// use tidepool::{CancellationToken, Pull};
    ///
    /// let evens = Pull::generate(|y, _token| {
    ///     for i in 0..3 {
    ///         y.emit(i * 2)?;
    ///     }
    ///     Ok(())
    /// });
    /// assert_eq!(evens.to_vec(&CancellationToken::none())?, vec![0, 2, 4]);
    /// # Ok::<(), tidepool::SeqError>(())
    /// ```
    pub fn generate<F>(body: F) -> Self
    where
        F: Fn(&Yielder<T>, &CancellationToken) -> Result<()> + Send + Sync + 'static,
    {
        Self::generate_with(GeneratorConfig::default(), body)
    }

    pub fn generate_with<F>(config: GeneratorConfig, body: F) -> Self
    where
        F: Fn(&Yielder<T>, &CancellationToken) -> Result<()> + Send + Sync + 'static,
    {
        Self::from_source(Generate::new(config, body))
    }
}
