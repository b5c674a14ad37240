//! Pull sequences: the consumer asks for the next value and may wait.
//!
//! A [`Pull`] is a shareable handle to a producer. Every call to
//! [`Pull::session`] opens a fresh, independent walk, so one source can be
//! consumed many times, concurrently, without the walks interfering.
//!
//! # Example
//!
//! ```
//! use tidepool::{CancellationToken, Pull};
//!
//! let token = CancellationToken::none();
//! let squares = Pull::range(1, 4).map(|x| x * x);
//!
//! let mut session = squares.session();
//! while session.advance(&token)? {
//!     println!("{}", session.current()?);
//! }
//! assert_eq!(squares.to_vec(&token)?, vec![1, 4, 9, 16]);
//! # Ok::<(), tidepool::SeqError>(())
//! ```

mod buffer;
mod generator;
pub mod ops;
mod source;

pub use buffer::Buffer;
pub use generator::{Generate, Yielder};
pub use ops::order::Ordered;

pub(crate) use source::range_end;

use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use std::fmt;
use std::sync::Arc;

/// Bounds every sequence element satisfies.
pub trait Element: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Element for T {}

/// One walk over a pull sequence.
///
/// Implementations only need to produce values; [`SessionHandle`] layers the
/// lifecycle rules (no access after dispose, `current` only after a
/// successful advance, sticky failure) on top.
pub trait Session: Send {
    type Item;

    /// Move to the next value. `Ok(false)` once the sequence is exhausted.
    fn advance(&mut self, token: &CancellationToken) -> Result<bool>;

    /// The value produced by the last successful advance.
    fn current(&self) -> Result<&Self::Item>;

    /// Release resources early. Called at most once by [`SessionHandle`].
    fn dispose(&mut self) {}
}

pub type BoxSession<T> = Box<dyn Session<Item = T>>;

/// A factory of independent sessions.
pub trait PullSource: Send + Sync {
    type Item;

    fn open(&self) -> BoxSession<Self::Item>;
}

/// Error for `current()` calls that are not preceded by a successful advance.
pub(crate) fn no_current() -> SeqError {
    SeqError::protocol("current() requires a preceding advance that returned true")
}

#[derive(Debug)]
enum HandleState {
    Idle,
    Positioned,
    Finished,
    Failed(SeqError),
    Disposed,
}

/// An owned session with lifecycle enforcement.
///
/// Dropping the handle disposes the session.
pub struct SessionHandle<T> {
    inner: BoxSession<T>,
    state: HandleState,
}

impl<T: Element> SessionHandle<T> {
    pub fn new(inner: BoxSession<T>) -> Self {
        Self {
            inner,
            state: HandleState::Idle,
        }
    }

    /// Advance the walk.
    ///
    /// Once the walk finishes, further calls return `Ok(false)`; once it
    /// fails, further calls return the same error.
    pub fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        match &self.state {
            HandleState::Disposed => {
                tracing::warn!("advance on a disposed session");
                return Err(SeqError::protocol("advance called after dispose"));
            }
            HandleState::Finished => return Ok(false),
            HandleState::Failed(e) => return Err(e.clone()),
            HandleState::Idle | HandleState::Positioned => {}
        }

        match self.inner.advance(token) {
            Ok(true) => {
                self.state = HandleState::Positioned;
                Ok(true)
            }
            Ok(false) => {
                self.inner.dispose();
                self.state = HandleState::Finished;
                Ok(false)
            }
            Err(e) => {
                self.inner.dispose();
                self.state = HandleState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// The current value, valid only directly after `advance` returned true.
    pub fn current(&self) -> Result<&T> {
        match self.state {
            HandleState::Positioned => self.inner.current(),
            HandleState::Disposed => Err(SeqError::protocol("current called after dispose")),
            _ => Err(no_current()),
        }
    }

    /// Advance and clone out the new current value.
    pub fn next_cloned(&mut self, token: &CancellationToken) -> Result<Option<T>>
    where
        T: Clone,
    {
        if self.advance(token)? {
            Ok(Some(self.current()?.clone()))
        } else {
            Ok(None)
        }
    }

    /// Iterate the rest of the walk, cloning each value.
    pub fn iter<'a>(&'a mut self, token: &'a CancellationToken) -> SessionIter<'a, T>
    where
        T: Clone,
    {
        SessionIter {
            session: self,
            token,
            done: false,
        }
    }

    /// Release the session. Idempotent.
    pub fn dispose(&mut self) {
        if !matches!(self.state, HandleState::Disposed) {
            self.inner.dispose();
            self.state = HandleState::Disposed;
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.state, HandleState::Disposed)
    }
}

impl<T> Drop for SessionHandle<T> {
    fn drop(&mut self) {
        if !matches!(self.state, HandleState::Disposed) {
            self.inner.dispose();
        }
    }
}

impl<T> fmt::Debug for SessionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state)
            .finish()
    }
}

/// Iterator over the remainder of a session. Stops after the first error.
pub struct SessionIter<'a, T> {
    session: &'a mut SessionHandle<T>,
    token: &'a CancellationToken,
    done: bool,
}

impl<'a, T: Element + Clone> Iterator for SessionIter<'a, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.next_cloned(self.token) {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// A pull sequence: an immutable, shareable producer of `T` values.
pub struct Pull<T> {
    source: Arc<dyn PullSource<Item = T>>,
}

impl<T> Clone for Pull<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: Element> Pull<T> {
    /// Wrap a custom source.
    pub fn from_source<S>(source: S) -> Self
    where
        S: PullSource<Item = T> + 'static,
    {
        Self {
            source: Arc::new(source),
        }
    }

    /// Open a new independent walk.
    pub fn session(&self) -> SessionHandle<T> {
        SessionHandle::new(self.source.open())
    }
}

impl<T> fmt::Debug for Pull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pull { .. }")
    }
}

/// Source built from a session factory closure.
pub(crate) struct FnSource<T, F> {
    factory: F,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T, F> FnSource<T, F> {
    pub(crate) fn new(factory: F) -> Self {
        Self {
            factory,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, F> PullSource for FnSource<T, F>
where
    T: Element,
    F: Fn() -> BoxSession<T> + Send + Sync,
{
    type Item = T;

    fn open(&self) -> BoxSession<T> {
        (self.factory)()
    }
}

impl<T: Element> Pull<T> {
    /// Build a pull sequence from a closure returning fresh sessions.
    pub(crate) fn from_factory<F>(factory: F) -> Self
    where
        F: Fn() -> BoxSession<T> + Send + Sync + 'static,
    {
        Self::from_source(FnSource::new(factory))
    }
}
