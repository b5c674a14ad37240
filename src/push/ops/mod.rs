//! Push operators.
//!
//! Each operator wraps the downstream observer and subscribes it to the
//! upstream within the caller's [`Subscription`](super::Subscription), so
//! disposal and cancellation reach every stage. Terminal signals pass through
//! unchanged unless intercepting them is the operator's job.

pub mod aggregate;
pub mod group;
pub mod recover;
pub mod transform;

use super::{BoxObserver, Observer, Push, Subscription};
use crate::error::Result;
use crate::primitives::CancellationToken;
use crate::pull::Element;

/// Emit `items` downstream after the upstream completed, then complete.
///
/// Used by operators that buffer until completion (grouping, sorting).
/// Cancellation is logged and otherwise ignored: there is nobody left to
/// return it to.
pub(crate) fn flush<T, I>(downstream: &mut dyn Observer<T>, items: I, token: &CancellationToken)
where
    I: IntoIterator<Item = Result<T>>,
{
    if let Err(e) = super::source::drive(downstream, items, token) {
        tracing::debug!(error = %e, "flush interrupted");
    }
}

impl<T: Element> Push<T> {
    /// Build an operator: `wrap` turns each downstream observer into the
    /// observer subscribed upstream.
    pub(crate) fn lift<U, F>(&self, wrap: F) -> Push<U>
    where
        U: Element,
        F: Fn(BoxObserver<U>, &Subscription) -> BoxObserver<T> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        Push::from_fn(move |downstream, subscription| {
            upstream.subscribe_within(wrap(downstream, subscription), subscription)
        })
    }
}
