//! Collections shared by the plain and hierarchical engines.
//!
//! Both flavors keep transitions, guard conditions and event handlers with
//! the same storage and the same add/remove lock discipline; only the
//! state-side bookkeeping differs between them.

pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod transitions;

pub(crate) use guards::GuardStore;
pub(crate) use handlers::EventHandlerCollection;
pub(crate) use transitions::TransitionCollection;
