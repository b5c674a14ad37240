//! Set operators. Every result is distinct and keeps first-seen order.

use super::Upstream;
use crate::error::Result;
use crate::primitives::CancellationToken;
use crate::pull::{BoxSession, Element, Pull, Session};
use std::collections::HashSet;
use std::hash::Hash;

#[derive(Clone, Copy)]
enum Filter {
    All,
    InOther,
    NotInOther,
}

struct SetSession<T> {
    upstream: Upstream<T>,
    other: Option<Pull<T>>,
    filter: Filter,
    /// Elements of `other`, collected on the first advance.
    other_items: Option<HashSet<T>>,
    seen: HashSet<T>,
}

impl<T> SetSession<T>
where
    T: Element + Clone + Hash + Eq,
{
    fn load_other(&mut self, token: &CancellationToken) -> Result<()> {
        if self.other_items.is_some() {
            return Ok(());
        }
        let mut items = HashSet::new();
        if let Some(other) = &self.other {
            let mut session = other.session();
            while let Some(item) = session.next_cloned(token)? {
                items.insert(item);
            }
        }
        self.other_items = Some(items);
        Ok(())
    }

    fn admits(&self, item: &T) -> bool {
        let in_other = self
            .other_items
            .as_ref()
            .map_or(false, |items| items.contains(item));
        match self.filter {
            Filter::All => true,
            Filter::InOther => in_other,
            Filter::NotInOther => !in_other,
        }
    }
}

impl<T> Session for SetSession<T>
where
    T: Element + Clone + Hash + Eq,
{
    type Item = T;

    fn advance(&mut self, token: &CancellationToken) -> Result<bool> {
        self.load_other(token)?;
        while self.upstream.advance(token)? {
            let item = self.upstream.current()?;
            if self.admits(item) && !self.seen.contains(item) {
                self.seen.insert(item.clone());
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn current(&self) -> Result<&T> {
        self.upstream.current()
    }

    fn dispose(&mut self) {
        self.upstream.dispose();
        self.seen.clear();
    }
}

impl<T> Pull<T>
where
    T: Element + Clone + Hash + Eq,
{
    fn set_op(&self, other: Option<&Pull<T>>, filter: Filter) -> Pull<T> {
        let source = self.clone();
        let other = other.cloned();
        Pull::from_factory(move || {
            Box::new(SetSession {
                upstream: Upstream::new(source.clone()),
                other: other.clone(),
                filter,
                other_items: None,
                seen: HashSet::new(),
            }) as BoxSession<T>
        })
    }

    /// Drop repeated elements, keeping the first occurrence.
    pub fn distinct(&self) -> Pull<T> {
        self.set_op(None, Filter::All)
    }

    /// Distinct elements of `self` followed by unseen elements of `other`.
    pub fn union(&self, other: &Pull<T>) -> Pull<T> {
        self.concat(other).distinct()
    }

    /// Distinct elements of `self` that also occur in `other`.
    ///
    /// `other` is walked completely on the first advance.
    pub fn intersect(&self, other: &Pull<T>) -> Pull<T> {
        self.set_op(Some(other), Filter::InOther)
    }

    /// Distinct elements of `self` that do not occur in `other`.
    pub fn except(&self, other: &Pull<T>) -> Pull<T> {
        self.set_op(Some(other), Filter::NotInOther)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SeqError;

    fn token() -> CancellationToken {
        CancellationToken::none()
    }

    #[test]
    fn test_distinct_keeps_first_occurrence() {
        let source = Pull::from_vec(vec![3, 1, 3, 2, 1]);
        assert_eq!(source.distinct().to_vec(&token()).unwrap(), vec![3, 1, 2]);
    }

    #[test]
    fn test_union_intersect_except() {
        let a = Pull::from_vec(vec![1, 2, 2, 3, 4]);
        let b = Pull::from_vec(vec![4, 3, 5, 3]);
        assert_eq!(a.union(&b).to_vec(&token()).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(a.intersect(&b).to_vec(&token()).unwrap(), vec![3, 4]);
        assert_eq!(a.except(&b).to_vec(&token()).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_rewalk_starts_fresh() {
        let distinct = Pull::from_vec(vec!['x', 'x', 'y']).distinct();
        assert_eq!(distinct.count(&token()).unwrap(), 2);
        assert_eq!(distinct.count(&token()).unwrap(), 2);
    }

    #[test]
    fn test_failing_other_fails_the_walk() {
        let a = Pull::from_vec(vec![1, 2]);
        let broken = Pull::fail(SeqError::msg("other broke"));
        assert!(matches!(
            a.except(&broken).to_vec(&token()),
            Err(SeqError::Producer(_))
        ));
    }
}
