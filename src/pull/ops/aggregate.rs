//! Terminal pull operators: walk a sequence once and reduce it.

use crate::error::{Result, SeqError};
use crate::primitives::CancellationToken;
use crate::pull::{Element, Pull};

impl<T: Element> Pull<T> {
    /// Fold every element into an accumulator.
    pub fn fold<A, F>(&self, init: A, mut f: F, token: &CancellationToken) -> Result<A>
    where
        F: FnMut(A, &T) -> Result<A>,
    {
        let mut session = self.session();
        let mut acc = init;
        while session.advance(token)? {
            acc = f(acc, session.current()?)?;
        }
        Ok(acc)
    }

    /// Run `f` on every element.
    pub fn for_each<F>(&self, mut f: F, token: &CancellationToken) -> Result<()>
    where
        F: FnMut(&T) -> Result<()>,
    {
        self.fold((), |(), item| f(item), token)
    }

    pub fn count(&self, token: &CancellationToken) -> Result<usize> {
        self.fold(0, |n, _| Ok(n + 1), token)
    }

    /// True if any element matches. Stops at the first match.
    pub fn any<F>(&self, predicate: F, token: &CancellationToken) -> Result<bool>
    where
        F: Fn(&T) -> bool,
    {
        let mut session = self.session();
        while session.advance(token)? {
            if predicate(session.current()?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True if every element matches. Stops at the first mismatch.
    pub fn all<F>(&self, predicate: F, token: &CancellationToken) -> Result<bool>
    where
        F: Fn(&T) -> bool,
    {
        self.any(|item| !predicate(item), token).map(|found| !found)
    }

    pub fn contains(&self, value: &T, token: &CancellationToken) -> Result<bool>
    where
        T: PartialEq,
    {
        self.any(|item| item == value, token)
    }
}

impl<T: Element + Clone> Pull<T> {
    pub fn to_vec(&self, token: &CancellationToken) -> Result<Vec<T>> {
        self.fold(
            Vec::new(),
            |mut items, item| {
                items.push(item.clone());
                Ok(items)
            },
            token,
        )
    }

    /// The first element; [`SeqError::EmptySequence`] if there is none.
    pub fn first(&self, token: &CancellationToken) -> Result<T> {
        self.first_or_none(token)?.ok_or(SeqError::EmptySequence)
    }

    pub fn first_or_none(&self, token: &CancellationToken) -> Result<Option<T>> {
        self.session().next_cloned(token)
    }

    pub fn last(&self, token: &CancellationToken) -> Result<T> {
        self.fold(None, |_, item| Ok(Some(item.clone())), token)?
            .ok_or(SeqError::EmptySequence)
    }

    /// The only element. Fails if the sequence is empty or longer than one.
    pub fn single(&self, token: &CancellationToken) -> Result<T> {
        let mut session = self.session();
        let only = session.next_cloned(token)?.ok_or(SeqError::EmptySequence)?;
        if session.advance(token)? {
            return Err(SeqError::MoreThanOneElement);
        }
        Ok(only)
    }

    pub fn element_at(&self, index: usize, token: &CancellationToken) -> Result<T> {
        let mut session = self.session();
        let mut position = 0;
        while session.advance(token)? {
            if position == index {
                return Ok(session.current()?.clone());
            }
            position += 1;
        }
        Err(SeqError::IndexOutOfRange {
            index,
            len: position,
        })
    }

    /// The element with the smallest key; the first one wins ties.
    pub fn min_by_key<K, F>(&self, key: F, token: &CancellationToken) -> Result<T>
    where
        K: Ord,
        F: Fn(&T) -> K,
    {
        self.best_by_key(key, |candidate, best| candidate < best, token)
    }

    /// The element with the largest key; the first one wins ties.
    pub fn max_by_key<K, F>(&self, key: F, token: &CancellationToken) -> Result<T>
    where
        K: Ord,
        F: Fn(&T) -> K,
    {
        self.best_by_key(key, |candidate, best| candidate > best, token)
    }

    fn best_by_key<K, F, B>(&self, key: F, better: B, token: &CancellationToken) -> Result<T>
    where
        F: Fn(&T) -> K,
        B: Fn(&K, &K) -> bool,
    {
        let best = self.fold(
            None,
            |best: Option<(K, T)>, item| {
                let candidate = key(item);
                Ok(match best {
                    Some((best_key, best_item)) if !better(&candidate, &best_key) => {
                        Some((best_key, best_item))
                    }
                    _ => Some((candidate, item.clone())),
                })
            },
            token,
        )?;
        best.map(|(_, item)| item).ok_or(SeqError::EmptySequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_count_fold_contains() {
        let source = Pull::range(1, 4);
        assert_eq!(source.count(&token()).unwrap(), 4);
        assert_eq!(source.fold(0, |a, x| Ok(a + x), &token()).unwrap(), 10);
        assert!(source.contains(&3, &token()).unwrap());
        assert!(!source.contains(&9, &token()).unwrap());
        assert!(source.all(|x| *x > 0, &token()).unwrap());
        assert!(!source.any(|x| *x > 4, &token()).unwrap());
    }

    #[test]
    fn test_empty_sequence_errors() {
        let empty = Pull::<i32>::empty();
        assert!(matches!(empty.first(&token()), Err(SeqError::EmptySequence)));
        assert!(matches!(empty.last(&token()), Err(SeqError::EmptySequence)));
        assert!(matches!(empty.single(&token()), Err(SeqError::EmptySequence)));
        assert!(matches!(
            empty.min_by_key(|x| *x, &token()),
            Err(SeqError::EmptySequence)
        ));
        assert_eq!(empty.first_or_none(&token()).unwrap(), None);
    }

    #[test]
    fn test_single_and_element_at() {
        assert_eq!(Pull::from_vec(vec![5]).single(&token()).unwrap(), 5);
        assert!(matches!(
            Pull::from_vec(vec![5, 6]).single(&token()),
            Err(SeqError::MoreThanOneElement)
        ));
        let source = Pull::from_vec(vec!['a', 'b', 'c']);
        assert_eq!(source.element_at(1, &token()).unwrap(), 'b');
        assert!(matches!(
            source.element_at(3, &token()),
            Err(SeqError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_min_max_first_wins_ties() {
        let source = Pull::from_vec(vec![(1, 'a'), (0, 'b'), (1, 'c'), (0, 'd')]);
        assert_eq!(source.min_by_key(|p| p.0, &token()).unwrap(), (0, 'b'));
        assert_eq!(source.max_by_key(|p| p.0, &token()).unwrap(), (1, 'a'));
        assert_eq!(source.last(&token()).unwrap(), (0, 'd'));
    }
}
