//! Push operators that intercept the end of a sequence.

use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use crate::pull::Element;
use crate::push::{BoxObserver, Flow, Observer, Push, Subscription};
use std::sync::Arc;

type Handler<T> = dyn Fn(SeqError) -> Result<Push<T>> + Send + Sync;

/// Forwards values; on a recoverable fault hands the downstream observer to
/// the fallback sequence instead.
struct CatchObserver<T> {
    downstream: Option<BoxObserver<T>>,
    handler: Arc<Handler<T>>,
    subscription: Subscription,
}

impl<T: Element> Observer<T> for CatchObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        let Some(downstream) = self.downstream.as_mut() else {
            return Ok(Flow::Stop);
        };
        match downstream.on_next(value, token) {
            // The consumer failed, not the producer: terminate it here so the
            // fault never reaches `on_error` as a recoverable one.
            Err(e) if !e.is_cancelled() => {
                if let Some(mut downstream) = self.downstream.take() {
                    downstream.on_error(e);
                }
                Ok(Flow::Stop)
            }
            outcome => outcome,
        }
    }

    fn on_error(&mut self, error: SeqError) {
        let Some(mut downstream) = self.downstream.take() else {
            return;
        };
        if !error.is_recoverable() {
            downstream.on_error(error);
            return;
        }
        tracing::debug!(error = %error, "switching to fallback sequence");
        match (self.handler)(error) {
            Ok(fallback) => {
                if let Err(e) = fallback.continue_within(downstream, &self.subscription) {
                    tracing::debug!(error = %e, "fallback sequence cancelled before start");
                }
            }
            Err(e) => downstream.on_error(e),
        }
    }

    fn on_completed(&mut self) {
        if let Some(mut downstream) = self.downstream.take() {
            downstream.on_completed();
        }
    }
}

struct DefaultObserver<T> {
    downstream: BoxObserver<T>,
    default: Option<T>,
    token: CancellationToken,
}

impl<T: Element> Observer<T> for DefaultObserver<T> {
    fn on_next(&mut self, value: T, token: &CancellationToken) -> Result<Flow> {
        self.default = None;
        self.downstream.on_next(value, token)
    }

    fn on_error(&mut self, error: SeqError) {
        self.downstream.on_error(error);
    }

    fn on_completed(&mut self) {
        if let Some(default) = self.default.take() {
            match self.downstream.on_next(default, &self.token) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => return,
                Err(e) => {
                    self.downstream.on_error(e);
                    return;
                }
            }
        }
        self.downstream.on_completed();
    }
}

impl<T: Element> Push<T> {
    /// Continue with the sequence returned by `handler` when the upstream
    /// fails.
    ///
    /// Values delivered before the fault stay delivered. Protocol violations
    /// are not recoverable and pass through, as does a failing handler.
    pub fn catch<F>(&self, handler: F) -> Push<T>
    where
        F: Fn(SeqError) -> Result<Push<T>> + Send + Sync + 'static,
    {
        let handler: Arc<Handler<T>> = Arc::new(handler);
        self.lift(move |downstream, subscription| {
            Box::new(CatchObserver {
                downstream: Some(downstream),
                handler: handler.clone(),
                subscription: subscription.clone(),
            }) as BoxObserver<T>
        })
    }

    /// Replace an upstream fault with completion.
    pub fn catch_and_stop(&self) -> Push<T> {
        self.catch(|_| Ok(Push::empty()))
    }
}

impl<T: Element + Clone> Push<T> {
    /// A single `default` when the upstream completes without values.
    pub fn default_if_empty(&self, default: T) -> Push<T> {
        self.lift(move |downstream, subscription| {
            Box::new(DefaultObserver {
                downstream,
                default: Some(default.clone()),
                token: subscription.token().clone(),
            }) as BoxObserver<T>
        })
    }
}
