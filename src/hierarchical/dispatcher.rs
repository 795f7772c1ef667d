//! Event delivery along the active path.

use std::any::Any;
use std::fmt::Debug;
use std::rc::Rc;

use crate::collections::EventHandlerCollection;
use crate::hierarchical::scheduler::HierarchyScheduler;

/// Bubbles events from the innermost active state outward.
///
/// Each state's chain is fully exhausted in registration order before the
/// next level is tried; the first handler returning `true` consumes the
/// event and stops the bubbling at every level. A chain is locked only
/// while its own state is being iterated.
pub(crate) struct EventDispatcher<S, T> {
    handlers: Rc<EventHandlerCollection<S, T>>,
    scheduler: Rc<HierarchyScheduler<S, T>>,
}

impl<S, T> EventDispatcher<S, T>
where
    S: Clone + Debug + 'static,
    T: Clone + Debug + 'static,
{
    pub fn new(
        handlers: Rc<EventHandlerCollection<S, T>>,
        scheduler: Rc<HierarchyScheduler<S, T>>,
    ) -> Self {
        EventDispatcher {
            handlers,
            scheduler,
        }
    }

    /// Returns whether some handler consumed the event. Always `false` on a
    /// machine that is not running.
    pub fn send_event(&self, event: &dyn Any) -> bool {
        let Some((path, _dispatching)) = self.scheduler.dispatch_activity() else {
            return false;
        };

        for state in path.iter().rev() {
            let _chain = self.handlers.lock_chain(state.clone());
            for handler in self.handlers.handlers_of(state) {
                if handler.borrow_mut().handle_event(event) {
                    return true;
                }
            }
        }

        false
    }
}
