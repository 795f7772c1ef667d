//! Vocabulary types shared by both machine flavors.
//!
//! This module holds everything that is not specific to one engine:
//! - the `Transition` triple and the pluggable equality comparers
//! - the capability traits for behaviors, guards and event handlers
//! - the error taxonomy
//! - the reentrancy plumbing (locks, scheduler phase, action queue)

pub mod behavior;
pub mod comparer;
pub mod error;
pub mod transition;

pub(crate) mod lock;
pub(crate) mod phase;
pub(crate) mod queue;

pub use behavior::{
    ChangeListener, EventHandler, GuardCondition, SharedBehavior, SharedEventHandler, SharedGuard,
    StateBehavior,
};
pub use comparer::{SharedComparer, TransitionComparer};
pub use error::FsmError;
pub use transition::Transition;
