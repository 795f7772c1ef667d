//! Capability traits implemented by caller-supplied behavior objects.
//!
//! The machine never owns concrete behavior types. States, guard conditions
//! and event handlers are all stored as shared trait objects so that the
//! caller keeps a handle to the same object it registered, and so that
//! behaviors can safely call back into the machine from their callbacks.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Behavior bound to exactly one state id for the lifetime of that state's
/// membership in the machine.
///
/// All three callbacks default to no-ops, so implementors only override what
/// they need. `()` implements the trait as the canonical empty behavior.
///
/// Callbacks may call back into the owning machine: lifecycle calls issued
/// from inside a callback are queued and run in FIFO order after the current
/// operation completes, never nested.
pub trait StateBehavior {
    /// Called when the state becomes active.
    fn enter(&mut self) {}

    /// Called when the state stops being active.
    ///
    /// An exiting state is allowed to remove itself from the machine during
    /// a stop; states that are still active stay protected.
    fn exit(&mut self) {}

    /// Called on every machine update while the state is active.
    fn update(&mut self) {}
}

/// The empty behavior: a state that does nothing on enter, exit or update.
impl StateBehavior for () {}

/// Predicate gating whether a transition may fire.
///
/// Every guard attached to a transition must return `true` for the
/// transition to be usable; a transition with no guards is always usable.
/// Closures of type `Fn() -> bool` implement this trait directly.
pub trait GuardCondition {
    fn is_valid(&self) -> bool;
}

impl<F> GuardCondition for F
where
    F: Fn() -> bool,
{
    fn is_valid(&self) -> bool {
        self()
    }
}

/// Handler in a state's event chain.
///
/// Handlers are tried in registration order; the first one returning `true`
/// consumes the event and stops the dispatch. Closures of type
/// `FnMut(&dyn Any) -> bool` implement this trait directly.
pub trait EventHandler {
    fn handle_event(&mut self, event: &dyn Any) -> bool;
}

impl<F> EventHandler for F
where
    F: FnMut(&dyn Any) -> bool,
{
    fn handle_event(&mut self, event: &dyn Any) -> bool {
        self(event)
    }
}

/// Shared handle to a state behavior. The machine holds one of these; the
/// caller may keep a clone to inspect or drive the same object.
pub type SharedBehavior = Rc<RefCell<dyn StateBehavior>>;

/// Shared handle to a guard condition. Identity (for removal and containment
/// queries) is pointer identity, `Rc::ptr_eq`.
pub type SharedGuard = Rc<dyn GuardCondition>;

/// Shared handle to an event handler. Identity is pointer identity.
pub type SharedEventHandler = Rc<RefCell<dyn EventHandler>>;

/// Subscriber to before/after state-change notifications, invoked with
/// `(source, trigger, target)`.
pub type ChangeListener<S, T> = Rc<dyn Fn(&S, &T, &S)>;

/// Wrap a behavior object into a shared handle.
pub fn behavior(behavior: impl StateBehavior + 'static) -> SharedBehavior {
    Rc::new(RefCell::new(behavior))
}

/// Wrap a predicate closure into a shared guard condition.
///
/// ```rust
/// use statewright::core::behavior::guard;
/// use statewright::GuardCondition;
///
/// let always = guard(|| true);
/// assert!(always.is_valid());
/// ```
pub fn guard(predicate: impl Fn() -> bool + 'static) -> SharedGuard {
    Rc::new(predicate)
}

/// Wrap a handler closure into a shared event handler.
pub fn event_handler(handler: impl FnMut(&dyn Any) -> bool + 'static) -> SharedEventHandler {
    Rc::new(RefCell::new(handler))
}
