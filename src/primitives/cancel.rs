//! Cancellation tokens.

use crate::error::{Result, SeqError};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Callback = Box<dyn FnOnce() + Send>;

struct TokenInner {
    cancelled: AtomicBool,
    /// Dropped on cancel so every clone of `wake_rx` disconnects.
    wake_tx: Mutex<Option<Sender<()>>>,
    wake_rx: Receiver<()>,
    callbacks: Mutex<Vec<Callback>>,
    children: Mutex<Vec<Weak<TokenInner>>>,
}

impl TokenInner {
    fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            wake_tx: Mutex::new(Some(tx)),
            wake_rx: rx,
            callbacks: Mutex::new(Vec::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.wake_tx.lock().take();

        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        for callback in callbacks {
            callback();
        }

        let children = std::mem::take(&mut *self.children.lock());
        for child in children {
            if let Some(child) = child.upgrade() {
                child.cancel();
            }
        }

        true
    }

    fn adopt(&self, child: &Arc<TokenInner>) {
        let mut children = self.children.lock();
        if self.cancelled.load(Ordering::Acquire) {
            drop(children);
            child.cancel();
            return;
        }
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(child));
    }
}

/// A cancellation signal shared between a requester and the work it governs.
///
/// Clones observe the same signal. Tokens can be linked: a child created with
/// [`child`](Self::child) or [`linked`](Self::linked) is cancelled whenever
/// any of its parents is, but cancelling the child leaves the parents alone.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner::new()),
        }
    }

    /// A token nobody else holds, so it is never cancelled.
    pub fn none() -> Self {
        Self::new()
    }

    /// Request cancellation. Returns true only for the call that performed it.
    pub fn cancel(&self) -> bool {
        self.inner.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`SeqError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SeqError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A token cancelled together with this one.
    pub fn child(&self) -> Self {
        let child = Self::new();
        self.inner.adopt(&child.inner);
        child
    }

    /// A token cancelled when either `a` or `b` is.
    pub fn linked(a: &CancellationToken, b: &CancellationToken) -> Self {
        let child = Self::new();
        a.inner.adopt(&child.inner);
        b.inner.adopt(&child.inner);
        child
    }

    /// Run `callback` once on cancellation, immediately if already cancelled.
    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.inner.callbacks.lock();
        if self.is_cancelled() {
            drop(callbacks);
            callback();
            return;
        }
        callbacks.push(Box::new(callback));
    }

    /// Channel that disconnects on cancellation.
    ///
    /// Meant for `crossbeam_channel::select!`: a `recv` arm on this receiver
    /// fires (with an error) once the token is cancelled, and never before.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.wake_rx
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
