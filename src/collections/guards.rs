//! Guard conditions attached to transitions.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::core::behavior::SharedGuard;
use crate::core::comparer::TransitionComparer;
use crate::core::error::FsmError;
use crate::core::lock::{LockFlag, LockGuard};
use crate::core::transition::Transition;

/// Ordered guard chains keyed by transition. All guards of a transition must
/// pass for it to be usable; guard identity is `Rc` pointer identity.
pub(crate) struct GuardStore<S, T> {
    chains: RefCell<Vec<(Transition<S, T>, Vec<SharedGuard>)>>,
    lock: LockFlag,
    comparer: TransitionComparer<S, T>,
}

impl<S, T> GuardStore<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(comparer: TransitionComparer<S, T>) -> Self {
        GuardStore {
            chains: RefCell::new(Vec::new()),
            lock: LockFlag::new(),
            comparer,
        }
    }

    pub fn add(
        &self,
        transition: Transition<S, T>,
        guard: SharedGuard,
    ) -> Result<(), FsmError<S, T>> {
        if self.lock.is_locked() {
            return Err(FsmError::GuardsLocked(transition));
        }

        let mut chains = self.chains.borrow_mut();
        match position_of(&chains, &self.comparer, &transition) {
            Some(index) => chains[index].1.push(guard),
            None => chains.push((transition, vec![guard])),
        }

        Ok(())
    }

    pub fn remove(
        &self,
        transition: &Transition<S, T>,
        guard: &SharedGuard,
    ) -> Result<bool, FsmError<S, T>> {
        if self.lock.is_locked() {
            return Err(FsmError::GuardsLocked(transition.clone()));
        }

        let mut chains = self.chains.borrow_mut();
        let Some(index) = position_of(&chains, &self.comparer, transition) else {
            return Ok(false);
        };

        let chain = &mut chains[index].1;
        let Some(at) = chain.iter().position(|g| Rc::ptr_eq(g, guard)) else {
            return Ok(false);
        };

        chain.remove(at);
        if chain.is_empty() {
            chains.remove(index);
        }

        Ok(true)
    }

    /// Unconditional bulk removal used by cascading transition removal.
    pub fn remove_all_of(&self, transition: &Transition<S, T>) {
        let mut chains = self.chains.borrow_mut();
        if let Some(index) = position_of(&chains, &self.comparer, transition) {
            chains.remove(index);
        }
    }

    pub fn remove_all_of_each(&self, transitions: &[Transition<S, T>]) {
        for transition in transitions {
            self.remove_all_of(transition);
        }
    }

    pub fn contains(&self, transition: &Transition<S, T>, guard: &SharedGuard) -> bool {
        let chains = self.chains.borrow();
        match position_of(&chains, &self.comparer, transition) {
            Some(index) => chains[index].1.iter().any(|g| Rc::ptr_eq(g, guard)),
            None => false,
        }
    }

    /// Snapshot of a transition's guard chain; empty when it has none.
    pub fn guards_of(&self, transition: &Transition<S, T>) -> Vec<SharedGuard> {
        let chains = self.chains.borrow();
        match position_of(&chains, &self.comparer, transition) {
            Some(index) => chains[index].1.clone(),
            None => Vec::new(),
        }
    }

    /// True iff every guard of `transition` passes; vacuously true. Guards
    /// run against a snapshot so they may call back into the machine.
    pub fn all_valid(&self, transition: &Transition<S, T>) -> bool {
        self.guards_of(transition).iter().all(|g| g.is_valid())
    }

    pub fn lock(&self) -> LockGuard<'_> {
        self.lock.lock()
    }
}

fn position_of<S, T>(
    chains: &[(Transition<S, T>, Vec<SharedGuard>)],
    comparer: &TransitionComparer<S, T>,
    transition: &Transition<S, T>,
) -> Option<usize> {
    chains.iter().position(|(t, _)| comparer.eq(t, transition))
}
