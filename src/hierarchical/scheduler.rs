//! Lifecycle and transition engine for the hierarchical machine.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::collections::{GuardStore, TransitionCollection};
use crate::core::behavior::{ChangeListener, SharedBehavior};
use crate::core::comparer::SharedComparer;
use crate::core::error::FsmError;
use crate::core::phase::{Phase, PhaseCell, PhaseGuard};
use crate::core::transition::Transition;
use crate::hierarchical::hierarchy::StateHierarchy;
use crate::hierarchical::validator::TransitionValidator;

/// Drives the active path: the chain of states from a root down to a leaf
/// that is entered as a unit.
///
/// Enter and update run outermost to innermost, exit runs innermost to
/// outermost. A trigger bubbles from the innermost path member outward; the
/// first level with exactly one valid transition wins, and only the sub-path
/// from that level downward is replaced. Callbacks run with no internal
/// borrow held.
pub(crate) struct HierarchyScheduler<S, T> {
    hierarchy: Rc<StateHierarchy<S, T>>,
    transitions: Rc<TransitionCollection<S, T>>,
    guards: Rc<GuardStore<S, T>>,
    validator: Rc<TransitionValidator<S, T>>,
    phase: PhaseCell,
    path: RefCell<Vec<(S, SharedBehavior)>>,
    before_listeners: RefCell<Vec<ChangeListener<S, T>>>,
    changed_listeners: RefCell<Vec<ChangeListener<S, T>>>,
    states_eq: SharedComparer<S>,
    triggers_eq: SharedComparer<T>,
}

impl<S, T> HierarchyScheduler<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(
        hierarchy: Rc<StateHierarchy<S, T>>,
        transitions: Rc<TransitionCollection<S, T>>,
        guards: Rc<GuardStore<S, T>>,
        validator: Rc<TransitionValidator<S, T>>,
        states_eq: SharedComparer<S>,
        triggers_eq: SharedComparer<T>,
    ) -> Self {
        HierarchyScheduler {
            hierarchy,
            transitions,
            guards,
            validator,
            phase: PhaseCell::new(),
            path: RefCell::new(Vec::new()),
            before_listeners: RefCell::new(Vec::new()),
            changed_listeners: RefCell::new(Vec::new()),
            states_eq,
            triggers_eq,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    /// Ordered ids of the active path, root first. Empty while stopped.
    pub fn active_path(&self) -> Vec<S> {
        self.path.borrow().iter().map(|(s, _)| s.clone()).collect()
    }

    /// The innermost active state, `None` while the machine is stopped.
    pub fn current_leaf(&self) -> Option<S> {
        self.path.borrow().last().map(|(s, _)| s.clone())
    }

    /// Whether `state` occurs anywhere on the active path.
    pub fn is_in_state(&self, state: &S) -> bool {
        self.path
            .borrow()
            .iter()
            .any(|(s, _)| self.states_eq.eq(s, state))
    }

    /// Builds the active path from the initial state down its initial-child
    /// chain, protects every member and enters them outermost first. The
    /// initial state must be a root of the hierarchy.
    pub fn start(&self) -> Result<(), FsmError<S, T>> {
        if self.phase.get() != Phase::Idle {
            return Err(FsmError::AlreadyRunning);
        }
        if self.hierarchy.count() == 0 {
            return Err(FsmError::EmptyMachine);
        }
        let Some(initial) = self.hierarchy.initial() else {
            return Err(FsmError::NoInitialState);
        };
        if self.hierarchy.parent_of(&initial)?.is_some() {
            return Err(FsmError::InitialStateNotRoot(initial));
        }

        let chain = self.hierarchy.initial_chain_from(&initial)?;
        for (state, _) in &chain {
            self.hierarchy.protect(state.clone());
        }
        *self.path.borrow_mut() = chain.clone();

        self.phase.set(Phase::Starting);
        for (_, behavior) in &chain {
            behavior.borrow_mut().enter();
        }
        self.phase.set(Phase::Running);

        Ok(())
    }

    /// Exits the path innermost first. Each member is popped and unprotected
    /// immediately before its own exit callback runs, so an exiting leaf may
    /// remove its own state while its ancestors stay protected.
    pub fn stop(&self) {
        if !self.phase.is_running() {
            return;
        }

        self.phase.set(Phase::Stopping);
        loop {
            let popped = self.path.borrow_mut().pop();
            let Some((state, behavior)) = popped else {
                break;
            };
            self.hierarchy.unprotect(&state);
            behavior.borrow_mut().exit();
        }
        self.phase.set(Phase::Idle);
    }

    pub fn update(&self) {
        if !self.phase.is_running() {
            return;
        }
        let snapshot: Vec<_> = self
            .path
            .borrow()
            .iter()
            .map(|(_, b)| Rc::clone(b))
            .collect();
        for behavior in snapshot {
            behavior.borrow_mut().update();
        }
    }

    /// Evaluates `trigger` against the path, innermost member first. Two
    /// simultaneously valid transitions out of one member surface as
    /// `MultipleValidTransitions`; the first member with exactly one valid
    /// candidate decides the switch.
    pub fn trigger(&self, trigger: &T) -> Result<bool, FsmError<S, T>> {
        if !self.phase.is_running() {
            return Ok(false);
        }

        let chosen = {
            let _states = self.hierarchy.remove_lock();
            let _transitions = self.transitions.lock();
            let _guards = self.guards.lock();
            let _evaluating = self.phase.activity(Phase::Evaluating);

            let path = self.active_path();
            let snapshot = self.transitions.snapshot();
            let mut chosen: Option<Transition<S, T>> = None;

            'levels: for member in path.iter().rev() {
                for candidate in &snapshot {
                    if !self.states_eq.eq(&candidate.source, member) {
                        continue;
                    }
                    if !self.triggers_eq.eq(&candidate.trigger, trigger) {
                        continue;
                    }
                    if !self.validator.is_valid(candidate, &path) {
                        continue;
                    }
                    if let Some(first) = chosen {
                        return Err(FsmError::MultipleValidTransitions {
                            first,
                            second: candidate.clone(),
                        });
                    }
                    chosen = Some(candidate.clone());
                }
                if chosen.is_some() {
                    break 'levels;
                }
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

    /// Marks the machine as dispatching and returns the path the event
    /// bubbles through; `None` when the machine is not running.
    pub fn dispatch_activity(&self) -> Option<(Vec<S>, PhaseGuard<'_>)> {
        if !self.phase.is_running() {
            return None;
        }
        let path = self.active_path();
        if path.is_empty() {
            return None;
        }
        Some((path, self.phase.activity(Phase::Dispatching)))
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

    /// Replaces the sub-path from the transition's source level downward.
    ///
    /// Shared ancestors above the source are neither exited nor re-entered.
    /// The incoming members are protected before any exit runs, so an exit
    /// callback cannot remove a state the machine is about to enter. Doomed
    /// members exit innermost first, each popped and unprotected just before
    /// its own exit; then the new sub-path is pushed, changed-listeners are
    /// notified and the new members enter outermost first.
    fn switch_to(&self, transition: &Transition<S, T>) -> Result<(), FsmError<S, T>> {
        let level = self
            .path
            .borrow()
            .iter()
            .position(|(s, _)| self.states_eq.eq(s, &transition.source))
            .ok_or_else(|| FsmError::UnknownState(transition.source.clone()))?;

        let incoming = self.hierarchy.initial_chain_from(&transition.target)?;
        for (state, _) in &incoming {
            self.hierarchy.protect(state.clone());
        }

        self.notify(&self.before_listeners, transition);

        loop {
            let doomed = {
                let mut path = self.path.borrow_mut();
                if path.len() > level {
                    path.pop()
                } else {
                    None
                }
            };
            let Some((state, behavior)) = doomed else {
                break;
            };
            self.hierarchy.unprotect(&state);
            behavior.borrow_mut().exit();
        }

        self.path.borrow_mut().extend(incoming.iter().cloned());

        self.notify(&self.changed_listeners, transition);

        for (_, behavior) in &incoming {
            behavior.borrow_mut().enter();
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::behavior::{behavior, StateBehavior};
    use crate::core::comparer::TransitionComparer;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl StateBehavior for Recorder {
        fn enter(&mut self) {
            self.log.borrow_mut().push(format!("enter:{}", self.name));
        }
        fn exit(&mut self) {
            self.log.borrow_mut().push(format!("exit:{}", self.name));
        }
        fn update(&mut self) {
            self.log.borrow_mut().push(format!("update:{}", self.name));
        }
    }

    struct Fixture {
        scheduler: Rc<HierarchyScheduler<&'static str, char>>,
        hierarchy: Rc<StateHierarchy<&'static str, char>>,
        transitions: Rc<TransitionCollection<&'static str, char>>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Fixture {
        /// r hosts siblings a and b; a hosts a1 and a2, b hosts b1.
        fn tree() -> Self {
            let states_eq = SharedComparer::<&'static str>::native();
            let triggers_eq = SharedComparer::<char>::native();
            let comparer = TransitionComparer::new(states_eq.clone(), triggers_eq.clone());

            let hierarchy = Rc::new(StateHierarchy::new(states_eq.clone()));
            let transitions = Rc::new(TransitionCollection::new(
                comparer.clone(),
                states_eq.clone(),
                triggers_eq.clone(),
            ));
            let guards = Rc::new(GuardStore::new(comparer));
            let validator = Rc::new(TransitionValidator::new(
                Rc::clone(&hierarchy),
                Rc::clone(&guards),
                states_eq.clone(),
            ));
            let scheduler = Rc::new(HierarchyScheduler::new(
                Rc::clone(&hierarchy),
                Rc::clone(&transitions),
                guards,
                validator,
                states_eq,
                triggers_eq,
            ));

            let log = Rc::new(RefCell::new(Vec::new()));
            for id in ["r", "a", "b", "a1", "a2", "b1"] {
                hierarchy
                    .add(
                        id,
                        behavior(Recorder {
                            name: id,
                            log: Rc::clone(&log),
                        }),
                    )
                    .unwrap();
            }
            hierarchy.add_child(&"r", &"a").unwrap();
            hierarchy.add_child(&"r", &"b").unwrap();
            hierarchy.add_child(&"a", &"a1").unwrap();
            hierarchy.add_child(&"a", &"a2").unwrap();
            hierarchy.add_child(&"b", &"b1").unwrap();

            Fixture {
                scheduler,
                hierarchy,
                transitions,
                log,
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.borrow().clone()
        }

        fn clear_log(&self) {
            self.log.borrow_mut().clear();
        }
    }

    #[test]
    fn start_enters_the_initial_chain_outermost_first() {
        let fixture = Fixture::tree();

        fixture.scheduler.start().unwrap();

        assert_eq!(fixture.scheduler.active_path(), vec!["r", "a", "a1"]);
        assert_eq!(fixture.log(), vec!["enter:r", "enter:a", "enter:a1"]);
        assert!(fixture.hierarchy.is_protected(&"r"));
        assert!(fixture.hierarchy.is_protected(&"a"));
        assert!(fixture.hierarchy.is_protected(&"a1"));
    }

    #[test]
    fn start_requires_a_root_initial_state() {
        let fixture = Fixture::tree();
        fixture.hierarchy.set_initial("a1").unwrap();

        assert_eq!(
            fixture.scheduler.start(),
            Err(FsmError::InitialStateNotRoot("a1"))
        );
        assert!(!fixture.scheduler.is_running());
    }

    #[test]
    fn stop_exits_innermost_first_and_clears_the_path() {
        let fixture = Fixture::tree();
        fixture.scheduler.start().unwrap();
        fixture.clear_log();

        fixture.scheduler.stop();

        assert_eq!(fixture.log(), vec!["exit:a1", "exit:a", "exit:r"]);
        assert!(fixture.scheduler.active_path().is_empty());
        assert!(!fixture.hierarchy.is_protected(&"r"));
        assert!(!fixture.scheduler.is_running());
    }

    #[test]
    fn update_runs_outermost_first() {
        let fixture = Fixture::tree();
        fixture.scheduler.start().unwrap();
        fixture.clear_log();

        fixture.scheduler.update();

        assert_eq!(fixture.log(), vec!["update:r", "update:a", "update:a1"]);
    }

    #[test]
    fn sibling_switch_spares_shared_ancestors() {
        let fixture = Fixture::tree();
        fixture
            .transitions
            .add(Transition::new("a", 't', "b"))
            .unwrap();

        fixture.scheduler.start().unwrap();
        fixture.clear_log();

        assert_eq!(fixture.scheduler.trigger(&'t'), Ok(true));

        assert_eq!(
            fixture.log(),
            vec!["exit:a1", "exit:a", "enter:b", "enter:b1"]
        );
        assert_eq!(fixture.scheduler.active_path(), vec!["r", "b", "b1"]);
        assert!(fixture.hierarchy.is_protected(&"r"));
        assert!(!fixture.hierarchy.is_protected(&"a"));
        assert!(!fixture.hierarchy.is_protected(&"a1"));
        assert!(fixture.hierarchy.is_protected(&"b1"));
    }

    #[test]
    fn triggers_bubble_innermost_first() {
        let fixture = Fixture::tree();
        fixture
            .transitions
            .add(Transition::new("a1", 't', "a2"))
            .unwrap();
        fixture
            .transitions
            .add(Transition::new("a", 't', "b"))
            .unwrap();

        fixture.scheduler.start().unwrap();
        fixture.clear_log();

        assert_eq!(fixture.scheduler.trigger(&'t'), Ok(true));

        assert_eq!(fixture.log(), vec!["exit:a1", "enter:a2"]);
        assert_eq!(fixture.scheduler.active_path(), vec!["r", "a", "a2"]);
    }

    #[test]
    fn ambiguity_at_one_level_is_an_error() {
        let fixture = Fixture::tree();
        fixture
            .transitions
            .add(Transition::new("a1", 't', "a2"))
            .unwrap();
        fixture
            .transitions
            .add(Transition::new("a1", 't', "a1"))
            .unwrap();

        fixture.scheduler.start().unwrap();

        assert!(matches!(
            fixture.scheduler.trigger(&'t'),
            Err(FsmError::MultipleValidTransitions { .. })
        ));
        assert_eq!(fixture.scheduler.active_path(), vec!["r", "a", "a1"]);

        // The evaluation bracket must have released every lock.
        fixture
            .transitions
            .remove(&Transition::new("a1", 't', "a1"))
            .unwrap();
        assert_eq!(fixture.scheduler.trigger(&'t'), Ok(true));
    }

    #[test]
    fn reentry_exits_and_reenters_the_sub_path() {
        let fixture = Fixture::tree();
        fixture
            .transitions
            .add(Transition::new("a", 't', "a"))
            .unwrap();

        fixture.scheduler.start().unwrap();
        fixture.clear_log();

        assert_eq!(fixture.scheduler.trigger(&'t'), Ok(true));

        assert_eq!(
            fixture.log(),
            vec!["exit:a1", "exit:a", "enter:a", "enter:a1"]
        );
        assert_eq!(fixture.scheduler.active_path(), vec!["r", "a", "a1"]);
    }

    #[test]
    fn listeners_fire_around_the_handoff() {
        let fixture = Fixture::tree();
        fixture
            .transitions
            .add(Transition::new("a", 't', "b"))
            .unwrap();

        let before_log = Rc::clone(&fixture.log);
        fixture
            .scheduler
            .add_before_listener(Rc::new(move |s: &&str, t: &char, d: &&str| {
                before_log.borrow_mut().push(format!("before:{s}-{t}-{d}"));
            }));
        let changed_log = Rc::clone(&fixture.log);
        fixture
            .scheduler
            .add_changed_listener(Rc::new(move |s: &&str, t: &char, d: &&str| {
                changed_log.borrow_mut().push(format!("changed:{s}-{t}-{d}"));
            }));

        fixture.scheduler.start().unwrap();
        fixture.clear_log();
        fixture.scheduler.trigger(&'t').unwrap();

        assert_eq!(
            fixture.log(),
            vec![
                "before:a-t-b",
                "exit:a1",
                "exit:a",
                "changed:a-t-b",
                "enter:b",
                "enter:b1"
            ]
        );
    }

    #[test]
    fn is_in_state_covers_the_whole_path() {
        let fixture = Fixture::tree();
        fixture.scheduler.start().unwrap();

        assert!(fixture.scheduler.is_in_state(&"r"));
        assert!(fixture.scheduler.is_in_state(&"a1"));
        assert!(!fixture.scheduler.is_in_state(&"b"));
        assert_eq!(fixture.scheduler.current_leaf(), Some("a1"));
    }
}
