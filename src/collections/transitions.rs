//! The set of registered transitions.

use std::cell::RefCell;
use std::fmt::Debug;

use crate::core::comparer::{SharedComparer, TransitionComparer};
use crate::core::error::FsmError;
use crate::core::lock::{LockFlag, LockGuard};
use crate::core::transition::Transition;

/// Owns the `(source, trigger, target)` triples with set semantics under the
/// configured comparers. Adds and removes are refused while the collection
/// is locked for an evaluation in flight.
pub(crate) struct TransitionCollection<S, T> {
    entries: RefCell<Vec<Transition<S, T>>>,
    lock: LockFlag,
    comparer: TransitionComparer<S, T>,
    states: SharedComparer<S>,
    triggers: SharedComparer<T>,
}

impl<S, T> TransitionCollection<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(
        comparer: TransitionComparer<S, T>,
        states: SharedComparer<S>,
        triggers: SharedComparer<T>,
    ) -> Self {
        TransitionCollection {
            entries: RefCell::new(Vec::new()),
            lock: LockFlag::new(),
            comparer,
            states,
            triggers,
        }
    }

    /// Set semantics: adding an already-present transition is accepted and
    /// changes nothing. Fails while add-locking is active.
    pub fn add(&self, transition: Transition<S, T>) -> Result<(), FsmError<S, T>> {
        if self.lock.is_locked() {
            return Err(FsmError::TransitionLocked(transition));
        }

        if !self.contains(&transition) {
            self.entries.borrow_mut().push(transition);
        }

        Ok(())
    }

    /// Removing an absent transition is `Ok(false)`; removing a present one
    /// while remove-locking is active is an error.
    pub fn remove(&self, transition: &Transition<S, T>) -> Result<bool, FsmError<S, T>> {
        let position = self.position_of(transition);

        match position {
            Some(index) => {
                if self.lock.is_locked() {
                    return Err(FsmError::TransitionLocked(transition.clone()));
                }
                self.entries.borrow_mut().remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove and return every transition whose source or target equals
    /// `state`; used by cascading state removal.
    pub fn remove_related_to(&self, state: &S) -> Vec<Transition<S, T>> {
        let mut entries = self.entries.borrow_mut();
        let mut removed = Vec::new();
        let mut index = 0;

        while index < entries.len() {
            let related = self.states.eq(&entries[index].source, state)
                || self.states.eq(&entries[index].target, state);

            if related {
                removed.push(entries.remove(index));
            } else {
                index += 1;
            }
        }

        removed
    }

    pub fn contains(&self, transition: &Transition<S, T>) -> bool {
        self.position_of(transition).is_some()
    }

    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn snapshot(&self) -> Vec<Transition<S, T>> {
        self.entries.borrow().clone()
    }

    pub fn with_source(&self, state: &S) -> Vec<Transition<S, T>> {
        self.filtered(|t| self.states.eq(&t.source, state))
    }

    pub fn with_target(&self, state: &S) -> Vec<Transition<S, T>> {
        self.filtered(|t| self.states.eq(&t.target, state))
    }

    pub fn with_trigger(&self, trigger: &T) -> Vec<Transition<S, T>> {
        self.filtered(|t| self.triggers.eq(&t.trigger, trigger))
    }

    pub fn related_to(&self, state: &S) -> Vec<Transition<S, T>> {
        self.filtered(|t| self.states.eq(&t.source, state) || self.states.eq(&t.target, state))
    }

    /// Lock both adds and removes for the duration of the returned guard.
    pub fn lock(&self) -> LockGuard<'_> {
        self.lock.lock()
    }

    fn filtered(&self, keep: impl Fn(&Transition<S, T>) -> bool) -> Vec<Transition<S, T>> {
        self.entries
            .borrow()
            .iter()
            .filter(|t| keep(t))
            .cloned()
            .collect()
    }

    fn position_of(&self, transition: &Transition<S, T>) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|t| self.comparer.eq(t, transition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> TransitionCollection<u8, char> {
        let states = SharedComparer::<u8>::native();
        let triggers = SharedComparer::<char>::native();
        TransitionCollection::new(
            TransitionComparer::new(states.clone(), triggers.clone()),
            states,
            triggers,
        )
    }

    #[test]
    fn duplicate_adds_are_idempotent() {
        let transitions = collection();

        transitions.add(Transition::new(1, 'a', 2)).unwrap();
        transitions.add(Transition::new(1, 'a', 2)).unwrap();

        assert_eq!(transitions.count(), 1);
    }

    #[test]
    fn removing_an_absent_transition_is_a_noop() {
        let transitions = collection();

        assert_eq!(transitions.remove(&Transition::new(1, 'a', 2)), Ok(false));
    }

    #[test]
    fn locked_collection_refuses_mutation() {
        let transitions = collection();
        transitions.add(Transition::new(1, 'a', 2)).unwrap();

        {
            let _evaluating = transitions.lock();

            assert_eq!(
                transitions.add(Transition::new(3, 'b', 4)),
                Err(FsmError::TransitionLocked(Transition::new(3, 'b', 4)))
            );
            assert_eq!(
                transitions.remove(&Transition::new(1, 'a', 2)),
                Err(FsmError::TransitionLocked(Transition::new(1, 'a', 2)))
            );
            // Absent transitions still report false while remove-locked.
            assert_eq!(transitions.remove(&Transition::new(9, 'z', 9)), Ok(false));
        }

        assert_eq!(transitions.remove(&Transition::new(1, 'a', 2)), Ok(true));
    }

    #[test]
    fn related_to_matches_source_and_target() {
        let transitions = collection();
        transitions.add(Transition::new(1, 'a', 2)).unwrap();
        transitions.add(Transition::new(2, 'b', 3)).unwrap();
        transitions.add(Transition::new(3, 'c', 1)).unwrap();

        let related = transitions.related_to(&2);
        assert_eq!(related.len(), 2);

        let removed = transitions.remove_related_to(&2);
        assert_eq!(removed.len(), 2);
        assert_eq!(transitions.count(), 1);
        assert!(transitions.contains(&Transition::new(3, 'c', 1)));
    }

    #[test]
    fn query_surface_filters_by_field() {
        let transitions = collection();
        transitions.add(Transition::new(1, 'a', 2)).unwrap();
        transitions.add(Transition::new(1, 'b', 3)).unwrap();
        transitions.add(Transition::new(2, 'a', 1)).unwrap();

        assert_eq!(transitions.with_source(&1).len(), 2);
        assert_eq!(transitions.with_target(&1).len(), 1);
        assert_eq!(transitions.with_trigger(&'a').len(), 2);
    }
}
