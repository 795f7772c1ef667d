//! The action queue that serializes reentrant lifecycle calls.
//!
//! Every public lifecycle operation is wrapped into a closure and appended
//! here. The first call on an idle queue drains it synchronously; a call
//! arriving while the queue is already draining (a callback invoking the
//! machine it runs inside of) only enqueues and returns, and its closure
//! executes after the current one completes, in submission order. No call
//! ever nests synchronously inside another.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

type Action<E> = Box<dyn FnOnce() -> Result<(), E>>;

pub(crate) struct ActionQueue<E> {
    actions: RefCell<VecDeque<Action<E>>>,
    draining: Cell<bool>,
}

impl<E> ActionQueue<E> {
    pub fn new() -> Self {
        ActionQueue {
            actions: RefCell::new(VecDeque::new()),
            draining: Cell::new(false),
        }
    }

    /// Enqueue `action` and drain the queue unless a drain is already in
    /// progress higher up the call stack.
    ///
    /// An error from any drained action propagates to the caller that owns
    /// the drain; actions queued behind it stay queued for the next call.
    pub fn run(&self, action: impl FnOnce() -> Result<(), E> + 'static) -> Result<(), E> {
        self.actions.borrow_mut().push_back(Box::new(action));

        if self.draining.get() {
            return Ok(());
        }

        self.draining.set(true);
        let _reset = DrainReset(&self.draining);

        loop {
            let next = self.actions.borrow_mut().pop_front();
            match next {
                Some(action) => action()?,
                None => return Ok(()),
            }
        }
    }
}

struct DrainReset<'a>(&'a Cell<bool>);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
