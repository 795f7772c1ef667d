//! The flat set of states and their behavior objects.

use std::cell::RefCell;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::core::behavior::SharedBehavior;
use crate::core::comparer::SharedComparer;
use crate::core::error::FsmError;
use crate::core::lock::{LockFlag, LockGuard};

/// State ids with their behaviors, the initial-state cell, the protected
/// list and the remove-lock.
///
/// Protection and the remove-lock serve different windows: the remove-lock
/// freezes all removals while a transition is evaluated, protection pins the
/// specific states that are active or mid-handoff. The protected list keeps
/// duplicates so a self-transition can protect the target and later
/// unprotect the previous occupant without losing the pin.
pub(crate) struct StateCollection<S, T> {
    entries: RefCell<Vec<(S, SharedBehavior)>>,
    initial: RefCell<Option<S>>,
    protected: RefCell<Vec<S>>,
    remove_lock: LockFlag,
    comparer: SharedComparer<S>,
    _triggers: PhantomData<T>,
}

impl<S, T> StateCollection<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(comparer: SharedComparer<S>) -> Self {
        StateCollection {
            entries: RefCell::new(Vec::new()),
            initial: RefCell::new(None),
            protected: RefCell::new(Vec::new()),
            remove_lock: LockFlag::new(),
            comparer,
            _triggers: PhantomData,
        }
    }

    /// The first state added becomes the initial state until told otherwise.
    pub fn add(&self, state: S, behavior: SharedBehavior) -> Result<(), FsmError<S, T>> {
        if self.contains(&state) {
            return Err(FsmError::DuplicateState(state));
        }

        if self.initial.borrow().is_none() {
            *self.initial.borrow_mut() = Some(state.clone());
        }
        self.entries.borrow_mut().push((state, behavior));

        Ok(())
    }

    /// Removing the initial state clears the initial-state cell. Absent
    /// states are `Ok(false)` even while locked or protected.
    pub fn remove(&self, state: &S) -> Result<bool, FsmError<S, T>> {
        let position = self.position_of(state);

        let Some(index) = position else {
            return Ok(false);
        };

        if self.remove_lock.is_locked() {
            return Err(FsmError::StateLocked(state.clone()));
        }
        if self.is_protected(state) {
            return Err(FsmError::ProtectedState(state.clone()));
        }

        self.entries.borrow_mut().remove(index);

        let was_initial = self
            .initial
            .borrow()
            .as_ref()
            .map(|initial| self.comparer.eq(initial, state))
            .unwrap_or(false);
        if was_initial {
            *self.initial.borrow_mut() = None;
        }

        Ok(true)
    }

    pub fn set_initial(&self, state: S) -> Result<(), FsmError<S, T>> {
        if !self.contains(&state) {
            return Err(FsmError::UnknownState(state));
        }

        *self.initial.borrow_mut() = Some(state);
        Ok(())
    }

    pub fn initial(&self) -> Option<S> {
        self.initial.borrow().clone()
    }

    pub fn contains(&self, state: &S) -> bool {
        self.position_of(state).is_some()
    }

    pub fn behavior_of(&self, state: &S) -> Result<SharedBehavior, FsmError<S, T>> {
        let entries = self.entries.borrow();
        entries
            .iter()
            .find(|(s, _)| self.comparer.eq(s, state))
            .map(|(_, behavior)| Rc::clone(behavior))
            .ok_or_else(|| FsmError::UnknownState(state.clone()))
    }

    /// Snapshot of the state ids in insertion order.
    pub fn states(&self) -> Vec<S> {
        self.entries.borrow().iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn protect(&self, state: S) {
        self.protected.borrow_mut().push(state);
    }

    /// Releases one protection pin; a state protected twice stays protected.
    pub fn unprotect(&self, state: &S) {
        let mut protected = self.protected.borrow_mut();
        if let Some(index) = protected.iter().position(|s| self.comparer.eq(s, state)) {
            protected.remove(index);
        }
    }

    pub fn is_protected(&self, state: &S) -> bool {
        self.protected
            .borrow()
            .iter()
            .any(|s| self.comparer.eq(s, state))
    }

    /// Freeze all removals for the duration of the returned guard.
    pub fn remove_lock(&self) -> LockGuard<'_> {
        self.remove_lock.lock()
    }

    fn position_of(&self, state: &S) -> Option<usize> {
        self.entries
            .borrow()
            .iter()
            .position(|(s, _)| self.comparer.eq(s, state))
    }
}
