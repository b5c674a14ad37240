//! Materialized sequences.

use super::generator::{Generate, Yielder};
use super::{Element, Pull, SessionHandle};
use crate::config::{BufferConfig, GeneratorConfig};
use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;

/// A fully drained sequence with random access.
///
/// A buffer is filled by exactly one drain. After that drain its storage is
/// trimmed to the drained length and sealed: later appends are rejected.
#[derive(Clone, Debug)]
pub struct Buffer<T> {
    items: Vec<T>,
    sealed: bool,
}

impl<T: Element> Buffer<T> {
    pub fn new() -> Self {
        Self::with_config(&BufferConfig::default())
    }

    pub fn with_config(config: &BufferConfig) -> Self {
        Self {
            items: Vec::with_capacity(config.capacity_hint),
            sealed: false,
        }
    }

    /// Drain `pull` to completion into a new buffer.
    pub fn from_pull(pull: &Pull<T>, token: &CancellationToken) -> Result<Self>
    where
        T: Clone,
    {
        let mut buffer = Self::new();
        let mut session = pull.session();
        buffer.drain(&mut session, token)?;
        Ok(buffer)
    }

    /// Run a producer body to completion on the calling thread.
    ///
    /// The body sees the same yielder API as a pull generator, but emits land
    /// straight in the buffer without any handshake.
    pub fn from_producer<F>(body: F, token: &CancellationToken) -> Result<Self>
    where
        F: Fn(&Yielder<T>, &CancellationToken) -> Result<()> + Send + Sync + 'static,
    {
        let items = Generate::new(GeneratorConfig::default(), body).collect(token)?;
        let mut buffer = Self {
            items,
            sealed: false,
        };
        buffer.seal();
        Ok(buffer)
    }

    /// Append every remaining value of `session`, then seal.
    ///
    /// On failure the buffer is left as it was before the call.
    pub fn drain(&mut self, session: &mut SessionHandle<T>, token: &CancellationToken) -> Result<usize>
    where
        T: Clone,
    {
        if self.sealed {
            return Err(SeqError::protocol("buffer is sealed after its first drain"));
        }

        let start = self.items.len();
        loop {
            match session.advance(token) {
                Ok(true) => match session.current() {
                    Ok(value) => self.items.push(value.clone()),
                    Err(e) => {
                        self.items.truncate(start);
                        return Err(e);
                    }
                },
                Ok(false) => break,
                Err(e) => {
                    self.items.truncate(start);
                    return Err(e);
                }
            }
        }

        self.seal();
        Ok(self.items.len() - start)
    }

    /// Append one value before the first drain.
    pub fn push(&mut self, value: T) -> Result<()> {
        if self.sealed {
            return Err(SeqError::protocol("buffer is sealed after its first drain"));
        }
        self.items.push(value);
        Ok(())
    }

    fn seal(&mut self) {
        self.items.shrink_to_fit();
        self.sealed = true;
        tracing::debug!(len = self.items.len(), "buffer sealed");
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    pub fn get(&self, index: usize) -> Result<&T> {
        self.items.get(index).ok_or(SeqError::IndexOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Replay the buffered values as a pull sequence.
    pub fn replay(self) -> Pull<T> {
        Pull::from_vec(self.items)
    }
}

impl<T: Element> Default for Buffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element + Clone> Pull<T> {
    /// Drain this sequence into a [`Buffer`].
    pub fn buffer(&self, token: &CancellationToken) -> Result<Buffer<T>> {
        Buffer::from_pull(self, token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_access_after_drain() {
        let token = CancellationToken::none();
        let buffer = Pull::range(10, 5).buffer(&token).unwrap();
        assert_eq!(buffer.len(), 5);
        assert_eq!(*buffer.get(0).unwrap(), 10);
        assert_eq!(*buffer.get(4).unwrap(), 14);
        assert!(matches!(
            buffer.get(5),
            Err(SeqError::IndexOutOfRange { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_sealed_after_first_drain() {
        let token = CancellationToken::none();
        let mut buffer = Buffer::new();
        let mut session = Pull::from_vec(vec![1, 2, 3]).session();
        assert_eq!(buffer.drain(&mut session, &token).unwrap(), 3);
        assert!(buffer.is_sealed());

        let mut again = Pull::from_vec(vec![4]).session();
        assert!(matches!(
            buffer.drain(&mut again, &token),
            Err(SeqError::ProtocolViolation(_))
        ));
        assert!(buffer.push(4).is_err());
    }

    #[test]
    fn test_failed_drain_leaves_buffer_untouched() {
        let token = CancellationToken::none();
        let failing = Pull::generate(|y, _| {
            y.emit(1)?;
            Err(SeqError::msg("midway"))
        });
        let mut buffer = Buffer::new();
        buffer.push(0).unwrap();
        let mut session = failing.session();
        assert!(buffer.drain(&mut session, &token).is_err());
        assert_eq!(buffer.as_slice(), &[0]);
        assert!(!buffer.is_sealed());
    }

    #[test]
    fn test_from_producer_honours_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = Buffer::from_producer(|y, _| y.emit(1), &token);
        assert!(matches!(result, Err(SeqError::Cancelled)));
    }

    #[test]
    fn test_replay_matches_direct_walk() {
        let token = CancellationToken::none();
        let source = Pull::range(0, 20).filter(|x| x % 3 == 0);
        let direct = source.to_vec(&token).unwrap();
        let replayed = source.buffer(&token).unwrap().replay().to_vec(&token).unwrap();
        assert_eq!(direct, replayed);
    }
}
