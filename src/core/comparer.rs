//! Pluggable equality for state and trigger identities.
//!
//! Collections never rely on ambient `Eq`/`Hash`; they compare ids through a
//! comparer handle passed in at construction. The handle is shared by every
//! collection of one machine and can be swapped at runtime, which is why the
//! comparison function lives behind a mutable holder.

use std::cell::RefCell;
use std::rc::Rc;

use super::transition::Transition;

type EqFn<V> = Rc<dyn Fn(&V, &V) -> bool>;

/// Runtime-swappable equality function over values of type `V`.
///
/// Clones share the underlying holder: swapping the comparer on one clone is
/// observed by every collection holding another clone.
pub struct SharedComparer<V> {
    holder: Rc<RefCell<EqFn<V>>>,
}

impl<V> Clone for SharedComparer<V> {
    fn clone(&self) -> Self {
        SharedComparer {
            holder: Rc::clone(&self.holder),
        }
    }
}

impl<V: PartialEq + 'static> SharedComparer<V> {
    /// Comparer backed by native `PartialEq`.
    pub fn native() -> Self {
        SharedComparer::new(|a: &V, b: &V| a == b)
    }
}

impl<V> SharedComparer<V> {
    pub fn new(eq: impl Fn(&V, &V) -> bool + 'static) -> Self {
        SharedComparer {
            holder: Rc::new(RefCell::new(Rc::new(eq) as EqFn<V>)),
        }
    }

    /// Swap the comparison function. Takes effect for all clones at once.
    pub fn replace(&self, eq: impl Fn(&V, &V) -> bool + 'static) {
        *self.holder.borrow_mut() = Rc::new(eq);
    }

    pub fn eq(&self, a: &V, b: &V) -> bool {
        // Clone the function handle out before calling it so a comparer
        // swapped from inside a callback never observes a held borrow.
        let eq = Rc::clone(&self.holder.borrow());
        eq(a, b)
    }
}

/// Field-wise transition equality built from the state and trigger comparers.
pub struct TransitionComparer<S, T> {
    states: SharedComparer<S>,
    triggers: SharedComparer<T>,
}

impl<S, T> Clone for TransitionComparer<S, T> {
    fn clone(&self) -> Self {
        TransitionComparer {
            states: self.states.clone(),
            triggers: self.triggers.clone(),
        }
    }
}

impl<S, T> TransitionComparer<S, T> {
    pub fn new(states: SharedComparer<S>, triggers: SharedComparer<T>) -> Self {
        TransitionComparer { states, triggers }
    }

    pub fn eq(&self, a: &Transition<S, T>, b: &Transition<S, T>) -> bool {
        self.states.eq(&a.source, &b.source)
            && self.triggers.eq(&a.trigger, &b.trigger)
            && self.states.eq(&a.target, &b.target)
    }
}
