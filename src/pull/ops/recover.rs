//! Operators that intercept the end of a sequence.

use super::Upstream;
use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use crate::pull::{no_current, BoxSession, Element, Pull, Session, SessionHandle};
use std::sync::Arc;

type Handler<T> = dyn Fn(SeqError) -> Result<Pull<T>> + Send + Sync;

struct CatchSession<T> {
    upstream: Upstream<T>,
    handler: Arc<Handler<T>>,
    fallback: Option<SessionHandle<T>>,
}

impl<T: Element> Session for CatchSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        if let Some(fallback) = self.fallback.as_mut() {
            return fallback.advance(token);
        }
        match self.upstream.advance(token) {
            Ok(more) => Ok(more),
            Err(e) if e.is_recoverable() => {
                tracing::debug!(error = %e, "switching to fallback sequence");
                let mut fallback = (self.handler)(e)?.session();
                let more = fallback.advance(token);
                self.fallback = Some(fallback);
                more
            }
            Err(e) => Err(e),
        }
    }

    fn current(&self) -> Result<&T> {
        match &self.fallback {
            Some(fallback) => fallback.current(),
            None => self.upstream.current(),
        }
    }

    fn dispose(&mut self) {
        if let Some(fallback) = self.fallback.as_mut() {
            fallback.dispose();
        }
        self.upstream.dispose();
    }
}

struct DefaultSession<T> {
    upstream: Upstream<T>,
    default: T,
    state: DefaultState,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum DefaultState {
    Unknown,
    Upstream,
    Defaulted,
}

impl<T: Element + Clone> Session for DefaultSession<T> {
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        match self.state {
            DefaultState::Defaulted => Ok(false),
            DefaultState::Upstream => self.upstream.advance(token),
            DefaultState::Unknown => {
                self.state = if self.upstream.advance(token)? {
                    DefaultState::Upstream
                } else {
                    DefaultState::Defaulted
                };
                Ok(true)
            }
        }
    }

    fn current(&self) -> Result<&T> {
        match self.state {
            DefaultState::Defaulted => Ok(&self.default),
            DefaultState::Upstream => self.upstream.current(),
            DefaultState::Unknown => Err(no_current()),
        }
    }

    fn dispose(&mut self) {
        self.upstream.dispose();
    }
}

impl<T: Element> Pull<T> {
    /// Continue with the sequence returned by `handler` when a producer
    /// fault ends the walk.
    ///
    /// Elements delivered before the fault stay delivered. Cancellation and
    /// protocol violations are never caught.
    pub fn catch<F>(&self, handler: F) -> Pull<T>
    where
        F: Fn(SeqError) -> Result<Pull<T>> + Send + Sync + 'static,
    {
        let source = self.clone();
        let handler: Arc<Handler<T>> = Arc::new(handler);
        Pull::from_factory(move || {
            Box::new(CatchSession {
                upstream: Upstream::new(source.clone()),
                handler: handler.clone(),
                fallback: None,
            }) as BoxSession<T>
        })
    }

    /// Replace a producer fault with a clean end of sequence.
    pub fn catch_and_stop(&self) -> Pull<T> {
        self.catch(|_| Ok(Pull::empty()))
    }
}

impl<T: Element + Clone> Pull<T> {
    /// A single `default` when the sequence turns out empty.
    pub fn default_if_empty(&self, default: T) -> Pull<T> {
        let source = self.clone();
        Pull::from_factory(move || {
            Box::new(DefaultSession {
                upstream: Upstream::new(source.clone()),
                default: default.clone(),
                state: DefaultState::Unknown,
            }) as BoxSession<T>
        })
    }
}
