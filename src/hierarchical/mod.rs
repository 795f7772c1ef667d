//! The hierarchical state machine: a path of nested states is active at a
//! time.

mod dispatcher;
mod hierarchy;
mod scheduler;
mod validator;

use std::any::Any;
use std::cell::Cell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::collections::{EventHandlerCollection, GuardStore, TransitionCollection};
use crate::core::behavior::{
    ChangeListener, SharedBehavior, SharedEventHandler, SharedGuard,
};
use crate::core::comparer::{SharedComparer, TransitionComparer};
use crate::core::error::FsmError;
use crate::core::queue::ActionQueue;
use crate::core::transition::Transition;

use dispatcher::EventDispatcher;
use hierarchy::StateHierarchy;
use scheduler::HierarchyScheduler;
use validator::TransitionValidator;

/// A machine whose states nest. Running the machine activates a whole path
/// of states from a root down to a leaf, and transitions move between
/// siblings while shared ancestors stay active.
///
/// States are registered flat and grafted with [`add_child`]; the first
/// child grafted under a parent becomes the parent's initial child, the
/// branch entered when the parent activates. Triggers bubble from the
/// innermost active state outward; events do the same through the handler
/// chains.
///
/// Like [`PlainStateMachine`](crate::PlainStateMachine), the machine is a
/// shared handle (`clone` aliases it) and lifecycle calls issued from inside
/// callbacks are queued, never nested.
///
/// ```rust
/// use statewright::{HierarchicalStateMachine, Transition};
/// use statewright::core::behavior::behavior;
///
/// let machine = HierarchicalStateMachine::new();
/// for id in ["root", "idle", "busy"] {
///     machine.add_state(id, behavior(())).unwrap();
/// }
/// machine.add_child("root", "idle").unwrap();
/// machine.add_child("root", "busy").unwrap();
/// machine
///     .add_transition(Transition::new("idle", "go", "busy"))
///     .unwrap();
///
/// machine.start().unwrap();
/// assert_eq!(machine.active_path(), vec!["root", "idle"]);
/// assert!(machine.trigger("go").unwrap());
/// assert_eq!(machine.active_path(), vec!["root", "busy"]);
/// ```
///
/// [`add_child`]: Self::add_child
pub struct HierarchicalStateMachine<S: Debug, T: Debug> {
    hierarchy: Rc<StateHierarchy<S, T>>,
    transitions: Rc<TransitionCollection<S, T>>,
    guards: Rc<GuardStore<S, T>>,
    handlers: Rc<EventHandlerCollection<S, T>>,
    scheduler: Rc<HierarchyScheduler<S, T>>,
    dispatcher: Rc<EventDispatcher<S, T>>,
    queue: Rc<ActionQueue<FsmError<S, T>>>,
    state_comparer: SharedComparer<S>,
    trigger_comparer: SharedComparer<T>,
}

impl<S: Debug, T: Debug> Clone for HierarchicalStateMachine<S, T> {
    /// A second handle to the same machine, not a copy of its definition.
    fn clone(&self) -> Self {
        HierarchicalStateMachine {
            hierarchy: Rc::clone(&self.hierarchy),
            transitions: Rc::clone(&self.transitions),
            guards: Rc::clone(&self.guards),
            handlers: Rc::clone(&self.handlers),
            scheduler: Rc::clone(&self.scheduler),
            dispatcher: Rc::clone(&self.dispatcher),
            queue: Rc::clone(&self.queue),
            state_comparer: self.state_comparer.clone(),
            trigger_comparer: self.trigger_comparer.clone(),
        }
    }
}

impl<S, T> Default for HierarchicalStateMachine<S, T>
where
    S: Clone + Debug + PartialEq + 'static,
    T: Clone + Debug + PartialEq + 'static,
{
    fn default() -> Self {
        HierarchicalStateMachine::new()
    }
}

impl<S, T> HierarchicalStateMachine<S, T>
where
    S: Clone + Debug + PartialEq + 'static,
    T: Clone + Debug + PartialEq + 'static,
{
    /// Machine comparing ids with their native `PartialEq`.
    pub fn new() -> Self {
        Self::assemble(SharedComparer::native(), SharedComparer::native())
    }
}

impl<S, T> HierarchicalStateMachine<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    /// Machine comparing ids with caller-supplied equality functions.
    pub fn with_comparers(
        state_eq: impl Fn(&S, &S) -> bool + 'static,
        trigger_eq: impl Fn(&T, &T) -> bool + 'static,
    ) -> Self {
        Self::assemble(SharedComparer::new(state_eq), SharedComparer::new(trigger_eq))
    }

    fn assemble(state_comparer: SharedComparer<S>, trigger_comparer: SharedComparer<T>) -> Self {
        let transition_comparer =
            TransitionComparer::new(state_comparer.clone(), trigger_comparer.clone());

        let hierarchy = Rc::new(StateHierarchy::new(state_comparer.clone()));
        let transitions = Rc::new(TransitionCollection::new(
            transition_comparer.clone(),
            state_comparer.clone(),
            trigger_comparer.clone(),
        ));
        let guards = Rc::new(GuardStore::new(transition_comparer));
        let handlers = Rc::new(EventHandlerCollection::new(state_comparer.clone()));
        let validator = Rc::new(TransitionValidator::new(
            Rc::clone(&hierarchy),
            Rc::clone(&guards),
            state_comparer.clone(),
        ));
        let scheduler = Rc::new(HierarchyScheduler::new(
            Rc::clone(&hierarchy),
            Rc::clone(&transitions),
            Rc::clone(&guards),
            validator,
            state_comparer.clone(),
            trigger_comparer.clone(),
        ));
        let dispatcher = Rc::new(EventDispatcher::new(
            Rc::clone(&handlers),
            Rc::clone(&scheduler),
        ));

        HierarchicalStateMachine {
            hierarchy,
            transitions,
            guards,
            handlers,
            scheduler,
            dispatcher,
            queue: Rc::new(ActionQueue::new()),
            state_comparer,
            trigger_comparer,
        }
    }

    /// Swap the state equality function, observed by every collection of
    /// this machine immediately.
    pub fn set_state_comparer(&self, eq: impl Fn(&S, &S) -> bool + 'static) {
        self.state_comparer.replace(eq);
    }

    /// Swap the trigger equality function.
    pub fn set_trigger_comparer(&self, eq: impl Fn(&T, &T) -> bool + 'static) {
        self.trigger_comparer.replace(eq);
    }

    // Definition surface.

    /// Register a state with its behavior. New states are roots until
    /// grafted under a parent; the first state added becomes the machine
    /// initial state.
    pub fn add_state(&self, state: S, behavior: SharedBehavior) -> Result<(), FsmError<S, T>> {
        self.hierarchy.add(state, behavior)
    }

    /// Remove a state and everything attached to it. The state is detached
    /// from its parent, its children become roots, and transitions touching
    /// it, their guards and its event handlers all go with it.
    ///
    /// States on the active path are protected and cannot be removed.
    pub fn remove_state(&self, state: &S) -> Result<bool, FsmError<S, T>> {
        let removed = self.hierarchy.remove(state)?;

        if removed {
            let orphaned = self.transitions.remove_related_to(state);
            self.guards.remove_all_of_each(&orphaned);
            self.handlers.remove_all_from(state);
        }

        Ok(removed)
    }

    pub fn contains_state(&self, state: &S) -> bool {
        self.hierarchy.contains(state)
    }

    /// Snapshot of all registered state ids in insertion order.
    pub fn states(&self) -> Vec<S> {
        self.hierarchy.states()
    }

    pub fn state_count(&self) -> usize {
        self.hierarchy.count()
    }

    pub fn initial_state(&self) -> Option<S> {
        self.hierarchy.initial()
    }

    /// The initial state must be a root when the machine starts.
    pub fn set_initial_state(&self, state: S) -> Result<(), FsmError<S, T>> {
        self.hierarchy.set_initial(state)
    }

    pub fn behavior_of(&self, state: &S) -> Result<SharedBehavior, FsmError<S, T>> {
        self.hierarchy.behavior_of(state)
    }

    // Hierarchy surface.

    /// Graft `child` under `parent`. The first child grafted becomes the
    /// parent's initial child; grafting an existing pair again is a no-op.
    ///
    /// The call goes through the action queue: issued from inside a callback
    /// it is deferred until the operation in flight completes, so a graft
    /// can never interleave with a transition being performed. While the
    /// machine runs, an active state without children cannot gain its first
    /// child (the active path must keep ending at a leaf).
    pub fn add_child(&self, parent: S, child: S) -> Result<(), FsmError<S, T>> {
        let hierarchy = Rc::clone(&self.hierarchy);
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            let first_child = hierarchy
                .children_of(&parent)
                .map(|children| children.is_empty())
                .unwrap_or(false);
            if first_child && scheduler.is_running() && scheduler.is_in_state(&parent) {
                return Err(FsmError::ChildRejected {
                    parent,
                    child,
                    reason: "parent is active and the graft would extend the active path",
                });
            }
            hierarchy.add_child(&parent, &child)
        })
    }

    /// Detach `child` from its parent, making it a root again. `Ok(false)`
    /// when the state already is a root; fails while the child is on the
    /// active path.
    pub fn remove_child_from_parent(&self, child: &S) -> Result<bool, FsmError<S, T>> {
        if self.scheduler.is_running() && self.scheduler.is_in_state(child) {
            return Err(FsmError::ProtectedState(child.clone()));
        }

        self.hierarchy.detach_from_parent(child)
    }

    /// Choose which child activates when `parent` does. The pair must be
    /// immediate parent and child.
    pub fn set_initial_child_of(&self, parent: &S, child: &S) -> Result<(), FsmError<S, T>> {
        self.hierarchy.set_initial_child_of(parent, child)
    }

    /// `None` for roots.
    pub fn parent_of(&self, state: &S) -> Result<Option<S>, FsmError<S, T>> {
        self.hierarchy.parent_of(state)
    }

    /// Immediate children in graft order.
    pub fn children_of(&self, state: &S) -> Result<Vec<S>, FsmError<S, T>> {
        self.hierarchy.children_of(state)
    }

    pub fn initial_child_of(&self, state: &S) -> Result<Option<S>, FsmError<S, T>> {
        self.hierarchy.initial_child_of(state)
    }

    pub fn roots(&self) -> Vec<S> {
        self.hierarchy.roots()
    }

    pub fn is_immediate_parent_of(&self, parent: &S, child: &S) -> bool {
        self.hierarchy.is_immediate_parent_of(parent, child)
    }

    /// Distinct states sharing a parent. Two roots are not siblings.
    pub fn are_siblings(&self, a: &S, b: &S) -> bool {
        self.hierarchy.are_siblings(a, b)
    }

    /// States whose parents are siblings.
    pub fn are_cousins(&self, a: &S, b: &S) -> bool {
        self.hierarchy.are_cousins(a, b)
    }

    pub fn is_ancestor_of(&self, ancestor: &S, descendant: &S) -> bool {
        self.hierarchy.is_ancestor_of(ancestor, descendant)
    }

    /// `descendant` is reached from `ancestor` along initial children only.
    pub fn is_initial_descendant_of(&self, ancestor: &S, descendant: &S) -> bool {
        self.hierarchy.is_initial_descendant_of(ancestor, descendant)
    }

    // Transition, guard and handler surface. Identical rules to the plain
    // machine; targets must be the source or one of its siblings to ever
    // fire, but registration only requires known endpoints.

    /// Register a transition. Both endpoints must be registered states.
    pub fn add_transition(&self, transition: Transition<S, T>) -> Result<(), FsmError<S, T>> {
        if !self.hierarchy.contains(&transition.source) {
            return Err(FsmError::UnknownState(transition.source));
        }
        if !self.hierarchy.contains(&transition.target) {
            return Err(FsmError::UnknownState(transition.target));
        }

        self.transitions.add(transition)
    }

    /// Remove a transition and its guard conditions.
    pub fn remove_transition(&self, transition: &Transition<S, T>) -> Result<bool, FsmError<S, T>> {
        let removed = self.transitions.remove(transition)?;

        if removed {
            self.guards.remove_all_of(transition);
        }

        Ok(removed)
    }

    pub fn contains_transition(&self, transition: &Transition<S, T>) -> bool {
        self.transitions.contains(transition)
    }

    pub fn transitions(&self) -> Vec<Transition<S, T>> {
        self.transitions.snapshot()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.count()
    }

    pub fn transitions_with_source(&self, state: &S) -> Vec<Transition<S, T>> {
        self.transitions.with_source(state)
    }

    pub fn transitions_with_target(&self, state: &S) -> Vec<Transition<S, T>> {
        self.transitions.with_target(state)
    }

    pub fn transitions_with_trigger(&self, trigger: &T) -> Vec<Transition<S, T>> {
        self.transitions.with_trigger(trigger)
    }

    pub fn transitions_related_to(&self, state: &S) -> Vec<Transition<S, T>> {
        self.transitions.related_to(state)
    }

    /// Attach a guard condition to a registered transition.
    pub fn add_guard(
        &self,
        transition: Transition<S, T>,
        guard: SharedGuard,
    ) -> Result<(), FsmError<S, T>> {
        if !self.transitions.contains(&transition) {
            return Err(FsmError::UnknownTransition(transition));
        }

        self.guards.add(transition, guard)
    }

    /// Detach a guard, identified by pointer identity.
    pub fn remove_guard(
        &self,
        transition: &Transition<S, T>,
        guard: &SharedGuard,
    ) -> Result<bool, FsmError<S, T>> {
        if !self.transitions.contains(transition) {
            return Err(FsmError::UnknownTransition(transition.clone()));
        }

        self.guards.remove(transition, guard)
    }

    pub fn contains_guard(&self, transition: &Transition<S, T>, guard: &SharedGuard) -> bool {
        self.guards.contains(transition, guard)
    }

    /// Guard chain of a registered transition; empty when it has none.
    pub fn guards_of(
        &self,
        transition: &Transition<S, T>,
    ) -> Result<Vec<SharedGuard>, FsmError<S, T>> {
        if !self.transitions.contains(transition) {
            return Err(FsmError::UnknownTransition(transition.clone()));
        }

        Ok(self.guards.guards_of(transition))
    }

    /// Append an event handler to a registered state's chain.
    pub fn add_event_handler(
        &self,
        state: S,
        handler: SharedEventHandler,
    ) -> Result<(), FsmError<S, T>> {
        if !self.hierarchy.contains(&state) {
            return Err(FsmError::UnknownState(state));
        }

        self.handlers.add(state, handler)
    }

    /// Detach an event handler, identified by pointer identity.
    pub fn remove_event_handler(
        &self,
        state: &S,
        handler: &SharedEventHandler,
    ) -> Result<bool, FsmError<S, T>> {
        if !self.hierarchy.contains(state) {
            return Err(FsmError::UnknownState(state.clone()));
        }

        self.handlers.remove(state, handler)
    }

    pub fn contains_event_handler(&self, state: &S, handler: &SharedEventHandler) -> bool {
        self.handlers.contains(state, handler)
    }

    /// Handler chain of a registered state in registration order.
    pub fn event_handlers_of(&self, state: &S) -> Result<Vec<SharedEventHandler>, FsmError<S, T>> {
        if !self.hierarchy.contains(state) {
            return Err(FsmError::UnknownState(state.clone()));
        }

        Ok(self.handlers.handlers_of(state))
    }

    /// Subscribe to notifications fired before a transition's exit/enter
    /// callbacks run; invoked with `(source, trigger, target)`.
    pub fn add_before_change_listener(&self, listener: ChangeListener<S, T>) {
        self.scheduler.add_before_listener(listener);
    }

    pub fn remove_before_change_listener(&self, listener: &ChangeListener<S, T>) -> bool {
        self.scheduler.remove_before_listener(listener)
    }

    /// Subscribe to notifications fired after the active path swapped but
    /// before the incoming states enter.
    pub fn add_change_listener(&self, listener: ChangeListener<S, T>) {
        self.scheduler.add_changed_listener(listener);
    }

    pub fn remove_change_listener(&self, listener: &ChangeListener<S, T>) -> bool {
        self.scheduler.remove_changed_listener(listener)
    }

    // Lifecycle surface, routed through the action queue.

    /// Start the machine: build the active path from the initial state down
    /// its initial-child chain and enter it outermost first.
    pub fn start(&self) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || scheduler.start())
    }

    /// Like [`start`](Self::start), but `done` runs once the call actually
    /// executes, even if it was deferred from inside a callback.
    pub fn start_with(&self, done: impl FnOnce() + 'static) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            scheduler.start()?;
            done();
            Ok(())
        })
    }

    /// Stop the machine: exit the active path innermost first. A no-op when
    /// not running.
    pub fn stop(&self) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            scheduler.stop();
            Ok(())
        })
    }

    /// Like [`stop`](Self::stop), but `done` runs once the call actually
    /// executes.
    pub fn stop_with(&self, done: impl FnOnce() + 'static) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            scheduler.stop();
            done();
            Ok(())
        })
    }

    /// Forward an update tick along the path, outermost first. A no-op when
    /// not running.
    pub fn update(&self) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            scheduler.update();
            Ok(())
        })
    }

    /// Like [`update`](Self::update), but `done` runs once the call actually
    /// executes.
    pub fn update_with(&self, done: impl FnOnce() + 'static) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            scheduler.update();
            done();
            Ok(())
        })
    }

    /// Fire `trigger` against the active path, innermost state first.
    /// `Ok(true)` when a transition was performed; `Ok(false)` when none was
    /// valid, when the machine is not running, or when the call was deferred
    /// from inside a callback. Use [`trigger_with`](Self::trigger_with) to
    /// observe a deferred result.
    pub fn trigger(&self, trigger: T) -> Result<bool, FsmError<S, T>> {
        let fired = Rc::new(Cell::new(false));

        let scheduler = Rc::clone(&self.scheduler);
        let seen = Rc::clone(&fired);
        self.queue.run(move || {
            seen.set(scheduler.trigger(&trigger)?);
            Ok(())
        })?;

        Ok(fired.get())
    }

    /// Like [`trigger`](Self::trigger), but `done` receives the outcome when
    /// the call actually executes, even if it was deferred.
    pub fn trigger_with(
        &self,
        trigger: T,
        done: impl FnOnce(bool) + 'static,
    ) -> Result<(), FsmError<S, T>> {
        let scheduler = Rc::clone(&self.scheduler);
        self.queue.run(move || {
            done(scheduler.trigger(&trigger)?);
            Ok(())
        })
    }

    /// Offer `event` to the handler chains along the active path, innermost
    /// state first. `Ok(true)` when a handler consumed it.
    pub fn send_event(&self, event: impl Any) -> Result<bool, FsmError<S, T>> {
        let consumed = Rc::new(Cell::new(false));

        let dispatcher = Rc::clone(&self.dispatcher);
        let seen = Rc::clone(&consumed);
        self.queue.run(move || {
            seen.set(dispatcher.send_event(&event));
            Ok(())
        })?;

        Ok(consumed.get())
    }

    /// Like [`send_event`](Self::send_event), with a completion callback for
    /// deferred calls.
    pub fn send_event_with(
        &self,
        event: impl Any,
        done: impl FnOnce(bool) + 'static,
    ) -> Result<(), FsmError<S, T>> {
        let dispatcher = Rc::clone(&self.dispatcher);
        self.queue.run(move || {
            done(dispatcher.send_event(&event));
            Ok(())
        })
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Ordered ids of the active path, root first. Empty while stopped.
    pub fn active_path(&self) -> Vec<S> {
        self.scheduler.active_path()
    }

    /// The innermost active state, `None` while stopped.
    pub fn current_leaf(&self) -> Option<S> {
        self.scheduler.current_leaf()
    }

    /// Whether `state` occurs anywhere on the active path.
    pub fn is_in_state(&self, state: &S) -> bool {
        self.scheduler.is_in_state(state)
    }
}
