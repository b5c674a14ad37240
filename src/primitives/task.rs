//! Background units of work.

use crate::config::GeneratorConfig;
use crate::error::{Result, SeqError};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

/// A unit of work running on its own thread.
///
/// Panics inside the work are captured and reported as producer faults.
/// Dropping a `Task` detaches the thread.
pub struct Task<T> {
    name: String,
    handle: Option<JoinHandle<Result<T>>>,
}

impl<T: Send + 'static> Task<T> {
    /// Start `work` on a new thread configured from `config`.
    pub fn spawn<F>(config: &GeneratorConfig, work: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let name = config.thread_name.clone();
        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }

        let handle = builder
            .spawn(move || run_guarded(work))
            .map_err(SeqError::fault)?;

        tracing::debug!(task = %name, "spawned background task");

        Ok(Self {
            name,
            handle: Some(handle),
        })
    }

    /// Wait for the work to finish and return its result.
    pub fn join(mut self) -> Result<T> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|payload| Err(panic_fault(payload))),
            None => Err(SeqError::protocol(format!("task {} already joined", self.name))),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

/// Run `work`, turning a panic into a producer fault.
pub fn run_guarded<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| Err(panic_fault(payload)))
}

fn panic_fault(payload: Box<dyn Any + Send>) -> SeqError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::warn!(%message, "producer panicked");
    SeqError::msg(format!("panicked: {}", message))
}
