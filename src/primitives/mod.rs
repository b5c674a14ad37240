//! Low-level building blocks shared by the pull and push sides.
//!
//! - [`CancellationToken`]: pollable, linkable cancellation signal
//! - [`Task`]: a background unit of work with panic capture
//! - [`StopFlag`]: an atomic one-shot flag

mod cancel;
mod flag;
mod task;

pub use cancel::CancellationToken;
pub use flag::StopFlag;
pub use task::{run_guarded, Task};
