//! Conversions between pull and push sequences.
//!
//! `to_pull` runs the subscription inside a generator body, so every value
//! the producer pushes waits for the consumer's next advance. `to_push` walks
//! a fresh session on the subscribing thread.

use super::source::drive;
use super::{Flow, Observer, Push, Subscription};
use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use crate::pull::{Element, Pull, Yielder};
use parking_lot::Mutex;
use std::sync::Arc;

/// Feeds pushed values into a generator's yielder.
struct YieldObserver<T> {
    yielder: Yielder<T>,
    fault: Arc<Mutex<Option<SeqError>>>,
}

impl<T: Element> Observer<T> for YieldObserver<T> {
    fn on_next(&mut self, value: T, _token: &CancellationToken) -> Result<Flow> {
        self.yielder.emit(value)?;
        Ok(Flow::Continue)
    }

    fn on_error(&mut self, error: SeqError) {
        self.fault.lock().get_or_insert(error);
    }

    fn on_completed(&mut self) {}
}

impl<T: Element> Push<T> {
    /// View this sequence as a pull sequence.
    ///
    /// Each session subscribes once. The producer is held at every value
    /// until the consumer advances, and disposing the session disposes the
    /// subscription.
    pub fn to_pull(&self) -> Pull<T> {
        let source = self.clone();
        Pull::generate(move |yielder, token| {
            let fault = Arc::new(Mutex::new(None));
            let observer = YieldObserver {
                yielder: yielder.clone(),
                fault: fault.clone(),
            };

            let subscription = Subscription::new(token.child());
            tracing::trace!(id = %subscription.id(), "bridging push to pull");
            let started = source
                .subscribe_within(Box::new(observer), &subscription)
                .and_then(|()| subscription.join());
            subscription.dispose();
            started?;

            let fault = fault.lock().take();
            match fault {
                Some(e) => Err(e),
                None => token.check(),
            }
        })
    }
}

impl<T: Element + Clone> Pull<T> {
    /// View this sequence as a push sequence.
    ///
    /// Every subscription walks its own session to the end on the
    /// subscribing thread.
    pub fn to_push(&self) -> Push<T> {
        let source = self.clone();
        Push::from_fn(move |mut observer, subscription| {
            let token = subscription.token();
            let mut session = source.session();
            let outcome = drive(observer.as_mut(), session.iter(token), token);
            session.dispose();
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::testing::{Event, Recorder};
    use std::time::Duration;

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_push_to_pull_walks_all_values() {
        let pull = Push::range(1, 4).to_pull();
        assert_eq!(pull.to_vec(&token()).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(pull.count(&token()).unwrap(), 4);
    }

    #[test]
    fn test_push_fault_surfaces_on_advance() {
        let pull = Push::create(|emitter| {
            emitter.next(1)?;
            Err(SeqError::msg("push side failed"))
        })
        .to_pull();

        let mut session = pull.session();
        assert!(session.advance(&token()).unwrap());
        assert_eq!(*session.current().unwrap(), 1);
        let err = session.advance(&token()).unwrap_err();
        assert!(err.to_string().contains("push side failed"));
    }

    #[test]
    fn test_live_source_bridged_and_abandoned() {
        let pull = Push::interval(Duration::from_millis(1)).to_pull();
        let mut session = pull.session();
        let mut seen = Vec::new();
        for _ in 0..3 {
            assert!(session.advance(&token()).unwrap());
            seen.push(*session.current().unwrap());
        }
        session.dispose();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn test_pull_to_push() {
        let (recorder, events) = Recorder::new();
        Pull::from_vec(vec![5, 6])
            .to_push()
            .subscribe(recorder, &token())
            .unwrap();
        assert_eq!(
            *events.lock(),
            vec![Event::Next(5), Event::Next(6), Event::Completed]
        );
    }

    #[test]
    fn test_pull_fault_becomes_on_error() {
        let (recorder, events) = Recorder::<i32>::new();
        Pull::generate(|y, _| {
            y.emit(1)?;
            Err(SeqError::msg("pull side failed"))
        })
        .to_push()
        .subscribe(recorder, &token())
        .unwrap();
        let events = events.lock();
        assert_eq!(events[0], Event::Next(1));
        assert!(matches!(&events[1], Event::Error(msg) if msg.contains("pull side failed")));
    }

    #[test]
    fn test_round_trip_keeps_order() {
        let values = Pull::range(0, 5)
            .to_push()
            .filter(|x| x % 2 == 0)
            .to_pull()
            .to_vec(&token())
            .unwrap();
        assert_eq!(values, vec![0, 2, 4]);
    }
}
