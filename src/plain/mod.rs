//! The flat state machine: one active state at a time.

mod dispatcher;
mod scheduler;
mod states;

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
use scheduler::BehaviourScheduler;
use states::StateCollection;

/// A flat machine over caller-chosen state and trigger id types.
///
/// Exactly one state is active while the machine runs. Triggers move the
/// machine along registered transitions whose guard conditions all pass;
/// events walk the active state's handler chain.
///
/// The machine is a shared handle: `clone` produces a second handle to the
/// same machine, which is how behaviors, guards and handlers call back into
/// the machine they live in. Lifecycle calls (`start`, `stop`, `update`,
/// `trigger`, `send_event`) issued from inside a callback are queued and run
/// in submission order after the operation in flight completes; they never
/// nest.
///
/// ```rust
/// use statewright::{PlainStateMachine, Transition};
/// use statewright::core::behavior::behavior;
///
/// let machine = PlainStateMachine::new();
/// machine.add_state("idle", behavior(())).unwrap();
/// machine.add_state("busy", behavior(())).unwrap();
/// machine
///     .add_transition(Transition::new("idle", "go", "busy"))
///     .unwrap();
///
/// machine.start().unwrap();
/// assert!(machine.trigger("go").unwrap());
/// assert!(machine.is_in_state(&"busy"));
/// ```
pub struct PlainStateMachine<S: Debug, T: Debug> {
    states: Rc<StateCollection<S, T>>,
    transitions: Rc<TransitionCollection<S, T>>,
    guards: Rc<GuardStore<S, T>>,
    handlers: Rc<EventHandlerCollection<S, T>>,
    scheduler: Rc<BehaviourScheduler<S, T>>,
    dispatcher: Rc<EventDispatcher<S, T>>,
    queue: Rc<ActionQueue<FsmError<S, T>>>,
    state_comparer: SharedComparer<S>,
    trigger_comparer: SharedComparer<T>,
}

impl<S: Debug, T: Debug> Clone for PlainStateMachine<S, T> {
    /// A second handle to the same machine, not a copy of its definition.
    fn clone(&self) -> Self {
        PlainStateMachine {
            states: Rc::clone(&self.states),
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

impl<S, T> Default for PlainStateMachine<S, T>
where
    S: Clone + Debug + PartialEq + 'static,
    T: Clone + Debug + PartialEq + 'static,
{
    fn default() -> Self {
        PlainStateMachine::new()
    }
}

impl<S, T> PlainStateMachine<S, T>
where
    S: Clone + Debug + PartialEq + 'static,
    T: Clone + Debug + PartialEq + 'static,
{
    /// Machine comparing ids with their native `PartialEq`.
    pub fn new() -> Self {
        Self::assemble(SharedComparer::native(), SharedComparer::native())
    }
}

impl<S, T> PlainStateMachine<S, T>
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

        let states = Rc::new(StateCollection::new(state_comparer.clone()));
        let transitions = Rc::new(TransitionCollection::new(
            transition_comparer.clone(),
            state_comparer.clone(),
            trigger_comparer.clone(),
        ));
        let guards = Rc::new(GuardStore::new(transition_comparer));
        let handlers = Rc::new(EventHandlerCollection::new(state_comparer.clone()));
        let scheduler = Rc::new(BehaviourScheduler::new(
            Rc::clone(&states),
            Rc::clone(&transitions),
            Rc::clone(&guards),
            state_comparer.clone(),
            trigger_comparer.clone(),
        ));
        let dispatcher = Rc::new(EventDispatcher::new(
            Rc::clone(&handlers),
            Rc::clone(&scheduler),
        ));

        PlainStateMachine {
            states,
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

    /// Swap the state equality function. Every collection of this machine
    /// observes the new comparer immediately.
    pub fn set_state_comparer(&self, eq: impl Fn(&S, &S) -> bool + 'static) {
        self.state_comparer.replace(eq);
    }

    /// Swap the trigger equality function.
    pub fn set_trigger_comparer(&self, eq: impl Fn(&T, &T) -> bool + 'static) {
        self.trigger_comparer.replace(eq);
    }

    // Definition surface. These run synchronously, under the lock discipline
    // of the collections they touch.

    /// Register a state with its behavior. The first state added becomes the
    /// initial state.
    pub fn add_state(&self, state: S, behavior: SharedBehavior) -> Result<(), FsmError<S, T>> {
        self.states.add(state, behavior)
    }

    /// Remove a state and everything attached to it: transitions touching
    /// the state, their guard conditions and the state's event handlers.
    ///
    /// Fails while the state is active, mid-handoff, or a transition is
    /// being evaluated. Removing an absent state is `Ok(false)`.
    pub fn remove_state(&self, state: &S) -> Result<bool, FsmError<S, T>> {
        let removed = self.states.remove(state)?;

        if removed {
            let orphaned = self.transitions.remove_related_to(state);
            self.guards.remove_all_of_each(&orphaned);
            self.handlers.remove_all_from(state);
        }

        Ok(removed)
    }

    pub fn contains_state(&self, state: &S) -> bool {
        self.states.contains(state)
    }

    /// Snapshot of the registered state ids in insertion order.
    pub fn states(&self) -> Vec<S> {
        self.states.states()
    }

    pub fn state_count(&self) -> usize {
        self.states.count()
    }

    pub fn initial_state(&self) -> Option<S> {
        self.states.initial()
    }

    pub fn set_initial_state(&self, state: S) -> Result<(), FsmError<S, T>> {
        self.states.set_initial(state)
    }

    /// The behavior object registered for `state`.
    pub fn behavior_of(&self, state: &S) -> Result<SharedBehavior, FsmError<S, T>> {
        self.states.behavior_of(state)
    }

    /// Register a transition. Both endpoints must be registered states.
    /// Adding a transition twice is accepted and changes nothing.
    pub fn add_transition(&self, transition: Transition<S, T>) -> Result<(), FsmError<S, T>> {
        if !self.states.contains(&transition.source) {
            return Err(FsmError::UnknownState(transition.source));
        }
        if !self.states.contains(&transition.target) {
            return Err(FsmError::UnknownState(transition.target));
        }

        self.transitions.add(transition)
    }

    /// Remove a transition and its guard conditions. Removing an absent
    /// transition is `Ok(false)`.
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

    /// Attach a guard condition to a registered transition. All guards of a
    /// transition must pass for it to fire.
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
        if !self.states.contains(&state) {
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
        if !self.states.contains(state) {
            return Err(FsmError::UnknownState(state.clone()));
        }

        self.handlers.remove(state, handler)
    }

    pub fn contains_event_handler(&self, state: &S, handler: &SharedEventHandler) -> bool {
        self.handlers.contains(state, handler)
    }

    /// Handler chain of a registered state in registration order.
    pub fn event_handlers_of(&self, state: &S) -> Result<Vec<SharedEventHandler>, FsmError<S, T>> {
        if !self.states.contains(state) {
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

    /// Subscribe to notifications fired after the current state swapped but
    /// before the target's enter callback runs.
    pub fn add_change_listener(&self, listener: ChangeListener<S, T>) {
        self.scheduler.add_changed_listener(listener);
    }

    pub fn remove_change_listener(&self, listener: &ChangeListener<S, T>) -> bool {
        self.scheduler.remove_changed_listener(listener)
    }

    // Lifecycle surface. Every call goes through the action queue; a call
    // arriving from inside a callback is deferred and runs after the
    // operation in flight.

    /// Start the machine: protect and enter the initial state.
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

    /// Stop the machine: exit the current state. A no-op when not running.
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

    /// Forward an update tick to the current state's behavior. A no-op when
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

    /// Fire `trigger` against the current state. `Ok(true)` when a
    /// transition was performed, `Ok(false)` when no registered transition
    /// was valid, when the machine is not running, or when the call was
    /// issued from inside a callback and therefore deferred. Use
    /// [`trigger_with`](Self::trigger_with) to observe a deferred result.
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

    /// Offer `event` to the current state's handler chain. `Ok(true)` when a
    /// handler consumed it; `Ok(false)` when none did, when the machine is
    /// not running, or when the call was deferred.
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

    /// The active state, `None` while the machine is stopped.
    pub fn current_state(&self) -> Option<S> {
        self.scheduler.current_state()
    }

    pub fn is_in_state(&self, state: &S) -> bool {
        self.scheduler.is_in_state(state)
    }
}
