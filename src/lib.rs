//! # Tidepool
//!
//! Lazy pull sequences, push sequences with safe subscriptions, and the
//! machinery that joins them.
//!
//! ## Core Concepts
//!
//! - **Pull**: the consumer advances a session and may wait for each value
//! - **Generators**: producer bodies written as plain code that `emit`s
//!   values, parked between emits until the consumer asks again
//! - **Push**: the producer delivers values to an [`Observer`]; a
//!   [`Subscription`] cancels and waits for it
//! - **Groups**: an insertion-ordered hash index behind grouping, joins and
//!   lookups, plus a stable multi-key sort
//!
//! ## Example
//!
//! ```
//! use tidepool::{CancellationToken, Pull, Push};
//!
//! let token = CancellationToken::none();
//!
//! let words = Pull::from_vec(vec!["apple", "avocado", "banana", "cherry", "blueberry"]);
//! let by_letter = words.group_by(|w| w.chars().next().unwrap_or(' '));
//! let sizes: Vec<(char, usize)> = by_letter
//!     .map(|g| (*g.key(), g.len()))
//!     .to_vec(&token)?;
//! assert_eq!(sizes, vec![('a', 2), ('b', 2), ('c', 1)]);
//!
//! let doubled = Push::range(1, 3).map(|x| x * 2).to_pull();
//! assert_eq!(doubled.to_vec(&token)?, vec![2, 4, 6]);
//! # Ok::<(), tidepool::SeqError>(())
//! ```

pub mod config;
pub mod error;
pub mod group;
pub mod order;
pub mod primitives;
pub mod pull;
pub mod push;

// Re-exports
pub use config::{BufferConfig, EngineConfig, GeneratorConfig, GroupTableConfig};
pub use error::{Fault, Result, SeqError};
pub use group::{Group, GroupTable, KeyComparer, Lookup, NaturalComparer};
pub use order::SortSpec;
pub use primitives::{CancellationToken, StopFlag, Task};
pub use pull::{Buffer, Element, Ordered, Pull, PullSource, Session, SessionHandle, Yielder};
pub use push::{
    BoxObserver, Emitter, Flow, FnObserver, Observer, Push, PushSource, SafeObserver,
    Subscription, SubscriptionId,
};
