//! Error taxonomy shared by the plain and hierarchical machines.

use std::fmt::Debug;

use thiserror::Error;

use super::transition::Transition;

/// Everything that can go wrong while defining or driving a state machine.
///
/// Errors carry the offending element so callers can diagnose which state,
/// transition or relation blocked the operation. Calling `update`, `trigger`,
/// `send_event` or `stop` on a machine that is not running is deliberately
/// not an error: those are documented no-ops with a neutral result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FsmError<S: Debug, T: Debug> {
    #[error("state {0:?} is already added")]
    DuplicateState(S),

    #[error("state {0:?} was never added")]
    UnknownState(S),

    #[error("transition {0:?} was never added")]
    UnknownTransition(Transition<S, T>),

    #[error("cannot remove state {0:?} while a transition is being evaluated")]
    StateLocked(S),

    #[error("cannot add or remove transition {0:?} while a transition is being evaluated")]
    TransitionLocked(Transition<S, T>),

    #[error("cannot change guard conditions of {0:?} while a transition is being evaluated")]
    GuardsLocked(Transition<S, T>),

    #[error("cannot change event handlers of state {0:?} while an event is dispatched to it")]
    HandlersLocked(S),

    #[error("state {0:?} is protected: it is active or involved in the transition in flight")]
    ProtectedState(S),

    #[error("cannot start a machine with no states")]
    EmptyMachine,

    #[error("cannot start a machine without an initial state")]
    NoInitialState,

    #[error("machine is already running")]
    AlreadyRunning,

    #[error("initial state {0:?} is not a root of the hierarchy")]
    InitialStateNotRoot(S),

    /// The machine definition is ambiguous: two transitions from the same
    /// source were simultaneously valid for one trigger. This signals a
    /// missing guard condition, not a transient fault.
    #[error("trigger selects multiple valid transitions: {first:?} and {second:?}")]
    MultipleValidTransitions {
        first: Transition<S, T>,
        second: Transition<S, T>,
    },

    #[error("cannot make {child:?} a child of {parent:?}: {reason}")]
    ChildRejected {
        parent: S,
        child: S,
        reason: &'static str,
    },

    #[error("{parent:?} and {child:?} are not immediate parent and child")]
    InvalidHierarchy { parent: S, child: S },
}
