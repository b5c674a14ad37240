//! Error types for sequence operations.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A failure raised by user-supplied producer or operator code.
///
/// Cheap to clone so a failed session can report the same fault on every
/// later advance.
#[derive(Clone)]
pub struct Fault(Arc<dyn std::error::Error + Send + Sync>);

impl Fault {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Fault(Arc::new(error))
    }

    /// The underlying error.
    pub fn source(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fault({:?})", self.0)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plain-text fault used by [`SeqError::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
struct MessageFault(String);

/// Main error type for sequence operations.
#[derive(Clone, Debug, Error)]
pub enum SeqError {
    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Producer fault: {0}")]
    Producer(Fault),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Sequence contains no elements")]
    EmptySequence,

    #[error("Sequence contains more than one element")]
    MoreThanOneElement,

    #[error("Index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SeqError {
    /// Wrap an arbitrary error as a producer fault.
    pub fn fault<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SeqError::Producer(Fault::new(error))
    }

    /// Producer fault carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        SeqError::fault(MessageFault(message.into()))
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        SeqError::ProtocolViolation(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SeqError::Cancelled)
    }

    /// Faults that `catch`-style operators are allowed to recover from.
    ///
    /// Cancellation and protocol violations always reach the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SeqError::Cancelled | SeqError::ProtocolViolation(_))
    }
}

impl From<serde_json::Error> for SeqError {
    fn from(e: serde_json::Error) -> Self {
        SeqError::Config(e.to_string())
    }
}

/// Result type for sequence operations.
pub type Result<T> = std::result::Result<T, SeqError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_display_carries_message() {
        let err = SeqError::msg("boom");
        assert_eq!(err.to_string(), "Producer fault: boom");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_cancelled_is_not_recoverable() {
        assert!(SeqError::Cancelled.is_cancelled());
        assert!(!SeqError::Cancelled.is_recoverable());
        assert!(!SeqError::protocol("double emit").is_recoverable());
    }

    #[test]
    fn test_clone_shares_fault() {
        let err = SeqError::fault(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let copy = err.clone();
        match (err, copy) {
            (SeqError::Producer(a), SeqError::Producer(b)) => {
                assert_eq!(a.to_string(), b.to_string());
            }
            other => panic!("Expected producer faults, got {:?}", other),
        }
    }
}
