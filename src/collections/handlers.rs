//! Per-state event handler chains.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::core::behavior::SharedEventHandler;
use crate::core::comparer::SharedComparer;
use crate::core::error::FsmError;

/// Ordered handler chains keyed by state id. A chain is locked while an
/// event is being dispatched to that exact state; mutating a locked chain
/// is an error, mutating any other chain is fine.
pub(crate) struct EventHandlerCollection<S, T> {
    chains: RefCell<Vec<(S, Vec<SharedEventHandler>)>>,
    locked: RefCell<Vec<S>>,
    comparer: SharedComparer<S>,
    _triggers: std::marker::PhantomData<T>,
}

impl<S, T> EventHandlerCollection<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(comparer: SharedComparer<S>) -> Self {
        EventHandlerCollection {
            chains: RefCell::new(Vec::new()),
            locked: RefCell::new(Vec::new()),
            comparer,
            _triggers: std::marker::PhantomData,
        }
    }

    pub fn add(&self, state: S, handler: SharedEventHandler) -> Result<(), FsmError<S, T>> {
        if self.is_locked(&state) {
            return Err(FsmError::HandlersLocked(state));
        }

        let mut chains = self.chains.borrow_mut();
        match chains.iter().position(|(s, _)| self.comparer.eq(s, &state)) {
            Some(index) => chains[index].1.push(handler),
            None => chains.push((state, vec![handler])),
        }

        Ok(())
    }

    pub fn remove(&self, state: &S, handler: &SharedEventHandler) -> Result<bool, FsmError<S, T>> {
        if self.is_locked(state) {
            return Err(FsmError::HandlersLocked(state.clone()));
        }

        let mut chains = self.chains.borrow_mut();
        let Some(index) = chains.iter().position(|(s, _)| self.comparer.eq(s, state)) else {
            return Ok(false);
        };

        let chain = &mut chains[index].1;
        let Some(at) = chain.iter().position(|h| Rc::ptr_eq(h, handler)) else {
            return Ok(false);
        };

        chain.remove(at);
        if chain.is_empty() {
            chains.remove(index);
        }

        Ok(true)
    }

    /// Unconditional removal of a state's whole chain, used by cascades.
    pub fn remove_all_from(&self, state: &S) {
        let mut chains = self.chains.borrow_mut();
        if let Some(index) = chains.iter().position(|(s, _)| self.comparer.eq(s, state)) {
            chains.remove(index);
        }
    }

    pub fn contains(&self, state: &S, handler: &SharedEventHandler) -> bool {
        let chains = self.chains.borrow();
        chains
            .iter()
            .find(|(s, _)| self.comparer.eq(s, state))
            .map(|(_, chain)| chain.iter().any(|h| Rc::ptr_eq(h, handler)))
            .unwrap_or(false)
    }

    /// Snapshot of a state's chain in registration order; empty if none.
    pub fn handlers_of(&self, state: &S) -> Vec<SharedEventHandler> {
        let chains = self.chains.borrow();
        chains
            .iter()
            .find(|(s, _)| self.comparer.eq(s, state))
            .map(|(_, chain)| chain.clone())
            .unwrap_or_default()
    }

    /// Lock one state's chain for the duration of the returned guard.
    pub fn lock_chain(&self, state: S) -> ChainGuard<'_, S, T> {
        let already = self.is_locked(&state);
        if !already {
            self.locked.borrow_mut().push(state.clone());
        }
        ChainGuard {
            collection: self,
            state,
            already,
        }
    }

    fn is_locked(&self, state: &S) -> bool {
        self.locked
            .borrow()
            .iter()
            .any(|s| self.comparer.eq(s, state))
    }
}

/// Releases a chain lock on drop, so a handler that panics mid-dispatch
/// never leaves its state's chain permanently locked.
pub(crate) struct ChainGuard<'a, S, T> {
    collection: &'a EventHandlerCollection<S, T>,
    state: S,
    already: bool,
}

impl<S, T> Drop for ChainGuard<'_, S, T> {
    fn drop(&mut self) {
        if !self.already {
            let mut locked = self.collection.locked.borrow_mut();
            if let Some(index) = locked
                .iter()
                .position(|s| self.collection.comparer.eq(s, &self.state))
            {
                locked.remove(index);
            }
        }
    }
}
