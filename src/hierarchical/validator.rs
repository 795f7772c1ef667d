//! Structural and guard validity of hierarchical transitions.

use std::fmt::Debug;
use std::rc::Rc;

use crate::collections::GuardStore;
use crate::core::comparer::SharedComparer;
use crate::core::transition::Transition;
use crate::hierarchical::hierarchy::StateHierarchy;

/// Decides whether a transition may fire given the active path.
///
/// A transition is valid when its source lies on the active path, its
/// target is the source itself or a sibling of it (moves stay on one level
/// of the hierarchy), and every guard condition passes.
pub(crate) struct TransitionValidator<S, T> {
    hierarchy: Rc<StateHierarchy<S, T>>,
    guards: Rc<GuardStore<S, T>>,
    states_eq: SharedComparer<S>,
}

impl<S, T> TransitionValidator<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(
        hierarchy: Rc<StateHierarchy<S, T>>,
        guards: Rc<GuardStore<S, T>>,
        states_eq: SharedComparer<S>,
    ) -> Self {
        TransitionValidator {
            hierarchy,
            guards,
            states_eq,
        }
    }

    pub fn is_valid(&self, transition: &Transition<S, T>, active_path: &[S]) -> bool {
        let source_active = active_path
            .iter()
            .any(|state| self.states_eq.eq(state, &transition.source));
        if !source_active {
            return false;
        }

        let same_state = self.states_eq.eq(&transition.source, &transition.target);
        if !same_state && !self.hierarchy.are_siblings(&transition.source, &transition.target) {
            return false;
        }

        self.guards.all_valid(transition)
    }
}
