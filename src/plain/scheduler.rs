//! Lifecycle and transition engine for the flat machine.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::collections::TransitionCollection;
use crate::core::behavior::{ChangeListener, SharedBehavior};
use crate::core::comparer::SharedComparer;
use crate::core::error::FsmError;
use crate::core::phase::{Phase, PhaseCell, PhaseGuard};
use crate::core::transition::Transition;
use crate::collections::GuardStore;
use crate::plain::states::StateCollection;

/// Drives enter/exit/update callbacks and performs transitions.
///
/// All callbacks run with no internal borrow held, so a behavior may query
/// the machine it lives in (and queued lifecycle calls it issues run after
/// the operation in flight).
pub(crate) struct BehaviourScheduler<S, T> {
    states: Rc<StateCollection<S, T>>,
    transitions: Rc<TransitionCollection<S, T>>,
    guards: Rc<GuardStore<S, T>>,
    phase: PhaseCell,
    current: RefCell<Option<(S, SharedBehavior)>>,
    before_listeners: RefCell<Vec<ChangeListener<S, T>>>,
    changed_listeners: RefCell<Vec<ChangeListener<S, T>>>,
    states_eq: SharedComparer<S>,
    triggers_eq: SharedComparer<T>,
}

impl<S, T> BehaviourScheduler<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(
        states: Rc<StateCollection<S, T>>,
        transitions: Rc<TransitionCollection<S, T>>,
        guards: Rc<GuardStore<S, T>>,
        states_eq: SharedComparer<S>,
        triggers_eq: SharedComparer<T>,
    ) -> Self {
        BehaviourScheduler {
            states,
            transitions,
            guards,
            phase: PhaseCell::new(),
            current: RefCell::new(None),
            before_listeners: RefCell::new(Vec::new()),
            changed_listeners: RefCell::new(Vec::new()),
            states_eq,
            triggers_eq,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn current_state(&self) -> Option<S> {
        self.current.borrow().as_ref().map(|(s, _)| s.clone())
    }

    pub fn is_in_state(&self, state: &S) -> bool {
        self.current
            .borrow()
            .as_ref()
            .map(|(s, _)| self.states_eq.eq(s, state))
            .unwrap_or(false)
    }

    /// Enters the initial state. The initial state is protected for as long
    /// as it stays current.
    pub fn start(&self) -> Result<(), FsmError<S, T>> {
        if self.phase.get() != Phase::Idle {
            return Err(FsmError::AlreadyRunning);
        }
        if self.states.count() == 0 {
            return Err(FsmError::EmptyMachine);
        }
        let Some(initial) = self.states.initial() else {
            return Err(FsmError::NoInitialState);
        };
        let behavior = self.states.behavior_of(&initial)?;

        self.states.protect(initial.clone());
        *self.current.borrow_mut() = Some((initial, Rc::clone(&behavior)));

        self.phase.set(Phase::Starting);
        behavior.borrow_mut().enter();
        self.phase.set(Phase::Running);

        Ok(())
    }

    /// Exits the current state. The current state is cleared and unprotected
    /// before its exit callback runs, so an exiting behavior may remove its
    /// own state. Stopping a stopped machine is a no-op.
    pub fn stop(&self) {
        if !self.phase.is_running() {
            return;
        }
        let Some((state, behavior)) = self.current.borrow_mut().take() else {
            return;
        };

        self.states.unprotect(&state);
        self.phase.set(Phase::Stopping);
        behavior.borrow_mut().exit();
        self.phase.set(Phase::Idle);
    }

    pub fn update(&self) {
        if !self.phase.is_running() {
            return;
        }
        let behavior = self.current.borrow().as_ref().map(|(_, b)| Rc::clone(b));
        if let Some(behavior) = behavior {
            behavior.borrow_mut().update();
        }
    }

    /// Evaluates `trigger` against the current state and, when exactly one
    /// registered transition is valid, performs it. Returns whether a
    /// transition fired.
    ///
    /// The whole candidate search runs under the remove-lock, the transition
    /// lock and the guard lock, so guards observe a frozen definition. Two
    /// simultaneously valid candidates are a definition bug and surface as
    /// `MultipleValidTransitions`.
    pub fn trigger(&self, trigger: &T) -> Result<bool, FsmError<S, T>> {
        if !self.phase.is_running() {
            return Ok(false);
        }
        let Some(current) = self.current_state() else {
            return Ok(false);
        };

        let chosen = {
            let _states = self.states.remove_lock();
            let _transitions = self.transitions.lock();
            let _guards = self.guards.lock();
            let _evaluating = self.phase.activity(Phase::Evaluating);

            let mut chosen: Option<Transition<S, T>> = None;
            for candidate in self.transitions.snapshot() {
                if !self.states_eq.eq(&candidate.source, &current) {
                    continue;
                }
                if !self.triggers_eq.eq(&candidate.trigger, trigger) {
                    continue;
                }
                if !self.guards.all_valid(&candidate) {
                    continue;
                }
                if let Some(first) = chosen {
                    return Err(FsmError::MultipleValidTransitions {
                        first,
                        second: candidate,
                    });
                }
                chosen = Some(candidate);
            }
            chosen
        };

        match chosen {
            Some(transition) => {
                self.switch_to(&transition)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Marks the machine as dispatching an event and returns the state the
    /// event goes to; `None` when the machine is not running.
    pub fn dispatch_activity(&self) -> Option<(S, PhaseGuard<'_>)> {
        if !self.phase.is_running() {
            return None;
        }
        let state = self.current.borrow().as_ref().map(|(s, _)| s.clone())?;
        Some((state, self.phase.activity(Phase::Dispatching)))
    }

    pub fn add_before_listener(&self, listener: ChangeListener<S, T>) {
        self.before_listeners.borrow_mut().push(listener);
    }

    pub fn remove_before_listener(&self, listener: &ChangeListener<S, T>) -> bool {
        Self::remove_listener(&self.before_listeners, listener)
    }

    pub fn add_changed_listener(&self, listener: ChangeListener<S, T>) {
        self.changed_listeners.borrow_mut().push(listener);
    }

    pub fn remove_changed_listener(&self, listener: &ChangeListener<S, T>) -> bool {
        Self::remove_listener(&self.changed_listeners, listener)
    }

    /// The handoff, in order: protect the target, notify before-listeners,
    /// exit the old state (still reported as current), swap, unprotect the
    /// previous state, notify changed-listeners, enter the target.
    fn switch_to(&self, transition: &Transition<S, T>) -> Result<(), FsmError<S, T>> {
        let next = self.states.behavior_of(&transition.target)?;

        self.states.protect(transition.target.clone());
        self.notify(&self.before_listeners, transition);

        let previous = self.current.borrow().clone();
        if let Some((_, behavior)) = &previous {
            behavior.borrow_mut().exit();
        }

        *self.current.borrow_mut() = Some((transition.target.clone(), Rc::clone(&next)));
        if let Some((state, _)) = previous {
            self.states.unprotect(&state);
        }

        self.notify(&self.changed_listeners, transition);
        next.borrow_mut().enter();

        Ok(())
    }

    fn notify(&self, listeners: &RefCell<Vec<ChangeListener<S, T>>>, t: &Transition<S, T>) {
        let snapshot: Vec<_> = listeners.borrow().iter().map(Rc::clone).collect();
        for listener in snapshot {
            listener(&t.source, &t.trigger, &t.target);
        }
    }

    fn remove_listener(
        listeners: &RefCell<Vec<ChangeListener<S, T>>>,
        listener: &ChangeListener<S, T>,
    ) -> bool {
        let mut listeners = listeners.borrow_mut();
        match listeners.iter().position(|l| Rc::ptr_eq(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }
}
