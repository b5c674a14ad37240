//! One-shot atomic flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that flips from running to stopped exactly once.
#[derive(Debug, Default)]
pub struct StopFlag {
    stopped: AtomicBool,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the flag. Returns true only for the caller that flipped it.
    pub fn try_stop(&self) -> bool {
        self.stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
