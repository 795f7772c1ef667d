//! Event delivery to the current state's handler chain.

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use crate::collections::EventHandlerCollection;
use crate::plain::scheduler::BehaviourScheduler;

/// Hands events to the handlers registered for the current state.
///
/// Handlers run in registration order against a snapshot of the chain; the
/// first one returning `true` consumes the event. The chain is locked for
/// the duration of the dispatch, so handlers of the dispatched-to state
/// cannot be added or removed from inside a handler.
pub(crate) struct EventDispatcher<S, T> {
    handlers: Rc<EventHandlerCollection<S, T>>,
    scheduler: Rc<BehaviourScheduler<S, T>>,
}

impl<S, T> EventDispatcher<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(
        handlers: Rc<EventHandlerCollection<S, T>>,
        scheduler: Rc<BehaviourScheduler<S, T>>,
    ) -> Self {
        EventDispatcher {
            handlers,
            scheduler,
        }
    }

    /// Returns whether some handler consumed the event. Always `false` on a
    /// machine that is not running.
    pub fn send_event(&self, event: &dyn Any) -> bool {
        let Some((state, _dispatching)) = self.scheduler.dispatch_activity() else {
            return false;
        };
        let _chain = self.handlers.lock_chain(state.clone());

        for handler in self.handlers.handlers_of(&state) {
            if handler.borrow_mut().handle_event(event) {
                return true;
            }
        }

        false
    }
}
